//! Topic-based message broker with a segmented, memory-mapped append-only log.
//!
//! Three subsystems do the real work: [`log::SegmentedLog`] durably records every publish
//! and pull, [`topic::TopicRegistry`] routes messages between publishers and subscribers, and
//! [`server::ConnectionServer`] drives each client connection through its own state machine
//! over a shared `mio` readiness poller. [`protocol::CommandHandler`] ties the wire format to
//! the registry; [`buffer_pool::BufferPool`] recycles per-connection receive buffers.

pub mod buffer_pool;
pub mod config;
pub mod error;
pub mod log;
pub mod mmap;
pub mod protocol;
pub mod server;
pub mod session;
pub mod topic;

pub use error::{Error, Result};
