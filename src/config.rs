//! Command line configuration of a ring node.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration.
///
/// A founding node starts with just an id and a bind address; every later
/// node additionally names any live ring member as its seed and joins
/// through it.
#[derive(Parser, Debug, Clone)]
#[command(name = "ringchat", version, about = "Chord-style distributed chat node")]
pub struct Config {
    /// Ring id of this node, its position on the 2^32 key space.
    #[arg(long)]
    pub id: u32,

    /// Address to listen on, e.g. 127.0.0.1:5000. Peers are told the same
    /// address, so it must be reachable by them.
    #[arg(long)]
    pub bind: SocketAddr,

    /// Any live ring member to join through. Omit to found a new ring.
    #[arg(long)]
    pub seed: Option<SocketAddr>,

    /// Upper bound on concurrently handled requests.
    #[arg(long, default_value_t = 64)]
    pub max_workers: usize,

    /// Root directory under which this node keeps its data folder.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Seconds between periodic ring status log lines.
    #[arg(long, default_value_t = 30)]
    pub stats_interval_secs: u64,
}
