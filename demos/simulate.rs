//! Build a Kademlia network in memory, and export every node's routing table.

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use clap::Parser;
use kadroute::{Config, Testnet, DEFAULT_K};
use tracing::{info, Level};

#[derive(Parser)]
struct Cli {
    /// Number of bits of the identifiers
    #[arg(short = 'm', long)]
    bit_length: u16,
    /// Number of nodes joining the network
    #[arg(short, long)]
    nodes: usize,
    /// Maximum size of each k-bucket
    #[arg(short, default_value_t = DEFAULT_K)]
    k: usize,
    /// Number of FIND_NODE requests sent in parallel during lookups
    #[arg(short, long, default_value_t = kadroute::node::DEFAULT_ALPHA)]
    alpha: usize,
    /// Number of random lookups per bucket after each join
    #[arg(short, long, default_value_t = 0)]
    lookups: usize,
    /// CSV file to write, generated from the parameters otherwise
    #[arg(short, long)]
    output: Option<String>,
    /// Maximum log level
    #[arg(long, default_value_t = Level::INFO)]
    log: Level,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log).init();

    if cli.nodes == 0 {
        return Err("The number of nodes must be greater than 0".into());
    }

    let output = cli.output.clone().unwrap_or_else(|| {
        format!(
            "routing_table-m{}-n{}-k{}-l{}.csv",
            cli.bit_length, cli.nodes, cli.k, cli.lookups
        )
    });

    let config = Config {
        k: cli.k,
        alpha: cli.alpha,
    };

    let mut testnet = Testnet::new(cli.bit_length, config)?.with_lookups(cli.lookups);

    let start = Instant::now();
    testnet.populate(cli.nodes)?;

    info!(
        nodes = testnet.len(),
        delivered = testnet.transport().delivered(),
        elapsed = ?start.elapsed(),
        "Network built"
    );

    let mut writer = BufWriter::new(File::create(&output)?);
    writeln!(writer, "SOURCE,TARGET,JOIN_NUMBER,RECEIVED_FINDNODE")?;

    let edges = testnet.edges();
    for edge in &edges {
        writeln!(
            writer,
            "{},{},{},{}",
            edge.source, edge.target, edge.join_number, edge.received_find_node
        )?;
    }
    writer.flush()?;

    info!(edges = edges.len(), %output, "Exported routing tables");

    Ok(())
}
