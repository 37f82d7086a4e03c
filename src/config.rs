//! CLI argument surface for the broker server binary.

use clap::Parser;

use crate::log::segment::{DEFAULT_BASE_NAME, DEFAULT_SEGMENT_SIZE};

const DEFAULT_BIND: &str = "0.0.0.0:12345";

#[derive(Parser, Debug)]
#[command(name = "broker-server", about = "Topic-based message broker")]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Base name for the segmented log's files.
    #[arg(long = "log-base", default_value = DEFAULT_BASE_NAME)]
    pub log_base: String,

    /// Size in bytes of each log segment.
    #[arg(long = "segment-size", default_value_t = DEFAULT_SEGMENT_SIZE)]
    pub segment_size: usize,

    /// Number of worker threads draining the shared poller; defaults to the CPU count.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Raise log verbosity (stackable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ServerArgs {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }
}
