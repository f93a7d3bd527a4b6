use crate::common::DEFAULT_K;
use crate::{Error, Result};

/// Number of FIND_NODE requests sent in parallel during a lookup.
pub const DEFAULT_ALPHA: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Node Configurations
pub struct Config {
    /// Maximum size of each k-bucket, and of lookup shortlists.
    ///
    /// Defaults to [DEFAULT_K]
    pub k: usize,
    /// Lookup fan-out.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1"));
        }

        if self.alpha == 0 {
            return Err(Error::InvalidConfig("alpha must be at least 1"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
        }
    }
}
