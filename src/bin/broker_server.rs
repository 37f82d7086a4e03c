//! Broker server bootstrap: parse CLI args, init logging, wire up collaborators, run until
//! SIGINT.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use linebroker::buffer_pool::BufferPool;
use linebroker::config::ServerArgs;
use linebroker::log::SegmentedLog;
use linebroker::protocol::CommandHandler;
use linebroker::server::ConnectionServer;
use linebroker::topic::TopicRegistry;

const RECEIVE_BUFFER_SIZE: usize = 4096;
const RECEIVE_BUFFER_COUNT: usize = 64;

fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_logging(args.verbose);

    let bind_addr = args.bind.parse().with_context(|| format!("parsing bind address {}", args.bind))?;
    let workers = args.worker_count();

    let log = SegmentedLog::open(args.log_base.clone(), args.segment_size)
        .with_context(|| format!("opening segmented log at {}", args.log_base))?;
    let topics = Arc::new(TopicRegistry::new(log.clone()));
    let handler = Arc::new(CommandHandler::new(topics, log.clone()));
    let buffer_pool = Arc::new(BufferPool::new(RECEIVE_BUFFER_SIZE, RECEIVE_BUFFER_COUNT));

    let server = ConnectionServer::start(bind_addr, workers, handler, buffer_pool)
        .with_context(|| format!("binding listener on {bind_addr}"))?;
    log::info!("broker listening on {} with {} workers", server.local_addr(), workers);

    let shutting_down = Arc::new(AtomicBool::new(false));
    let signal_flag = shutting_down.clone();
    ctrlc::set_handler(move || {
        log::info!("received interrupt, shutting down");
        signal_flag.store(true, Ordering::SeqCst);
    })
    .context("installing SIGINT handler")?;

    while !shutting_down.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    server.shutdown();
    log.shutdown().context("shutting down segmented log")?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}
