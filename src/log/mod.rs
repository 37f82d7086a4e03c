//! Segmented, memory-mapped, append-only log with resumable cursor reads.
//!
//! Records never span segments. A single [`Mutex`] serializes every mutation so that
//! concurrent appenders observe one linear order; reads of already-sealed segments happen
//! through independent read-only mappings and need no lock.

pub mod record;
pub mod segment;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};
use crate::mmap::MmapFile;

pub use record::Level;
pub use segment::Position as LogCursor;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

struct State {
    root: PathBuf,
    base_name: String,
    segment_size: usize,
    current_segment_index: u64,
    current_offset: usize,
    current: MmapFile,
}

impl State {
    fn persist_metadata(&self) -> Result<()> {
        segment::store_metadata(&self.root, &self.base_name, segment::Position {
            segment_index: self.current_segment_index,
            offset: self.current_offset as u64,
        })
    }

    fn rotate(&mut self) -> Result<()> {
        self.current.flush()?;
        let next_index = self.current_segment_index + 1;
        match segment::create_segment(&self.root, &self.base_name, next_index, self.segment_size) {
            Ok(mapped) => {
                self.current = mapped;
                self.current_segment_index = next_index;
                self.current_offset = 0;
                self.persist_metadata()?;
                Ok(())
            }
            Err(first_err) => {
                log::error!(
                    "failed to open segment {next_index} for base {}: {first_err}, retrying at segment 0",
                    self.base_name
                );
                match segment::create_segment(&self.root, &self.base_name, 0, self.segment_size) {
                    Ok(mapped) => {
                        self.current = mapped;
                        self.current_segment_index = 0;
                        self.current_offset = 0;
                        self.persist_metadata()?;
                        Ok(())
                    }
                    Err(second_err) => {
                        log::error!("failed to fall back to segment 0: {second_err}");
                        Err(second_err)
                    }
                }
            }
        }
    }
}

/// Durable append-only store for broker activity records.
pub struct SegmentedLog {
    state: Mutex<State>,
    shutdown: Arc<AtomicBool>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SegmentedLog {
    /// Opens (or creates) the log rooted at `base_name` inside the current working directory,
    /// each segment exactly `segment_size` bytes, and starts the background flush thread.
    pub fn open(base_name: impl Into<String>, segment_size: usize) -> Result<Arc<Self>> {
        Self::open_in(".", base_name, segment_size)
    }

    /// Opens (or creates) the log rooted at `base_name` under `root`, each segment exactly
    /// `segment_size` bytes, and starts the background flush thread.
    pub fn open_in(root: impl Into<PathBuf>, base_name: impl Into<String>, segment_size: usize) -> Result<Arc<Self>> {
        let root = root.into();
        let base_name = base_name.into();
        let position = segment::load_metadata(&root, &base_name);
        let current = segment::open_or_create_segment(&root, &base_name, position.segment_index, segment_size)?;

        let state = State {
            root,
            base_name,
            segment_size,
            current_segment_index: position.segment_index,
            current_offset: position.offset as usize,
            current,
        };
        state.persist_metadata()?;

        let log = Arc::new(Self {
            state: Mutex::new(state),
            shutdown: Arc::new(AtomicBool::new(false)),
            flush_handle: Mutex::new(None),
        });
        log.clone().spawn_flush_thread();
        Ok(log)
    }

    fn spawn_flush_thread(self: Arc<Self>) {
        let shutdown = self.shutdown.clone();
        let handle = thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(FLUSH_INTERVAL);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(err) = self.flush() {
                    log::error!("periodic flush failed: {err}");
                }
            }
        });
        *self.flush_handle.lock().expect("flush handle lock poisoned") = Some(handle);
    }

    /// Appends a formatted record, rotating segments as needed. Oversized records are rejected
    /// without disturbing existing state.
    pub fn append(&self, level: Level, message: &str) -> Result<()> {
        let record = record::format_record(level, message, SystemTime::now());
        let len = record.len();
        let mut state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;

        if len >= state.segment_size {
            log::error!("record of {len} bytes does not fit in a {}-byte segment, dropping", state.segment_size);
            return Err(Error::RecordTooLarge);
        }
        if state.current_offset + len >= state.segment_size {
            state.rotate()?;
        }

        let offset = state.current_offset;
        state.current.as_mut_slice()[offset..offset + len].copy_from_slice(record.as_bytes());
        state.current_offset += len;
        Ok(())
    }

    /// Reads the next record starting at `cursor`, advancing it past the record on success.
    /// Returns `None` without mutating `cursor` if no complete record is available yet.
    pub fn read_next(&self, cursor: &mut LogCursor) -> Result<Option<Vec<u8>>> {
        let (root, base_name, current_segment_index, segment_size) = {
            let state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;
            (state.root.clone(), state.base_name.clone(), state.current_segment_index, state.segment_size)
        };
        if cursor.segment_index > current_segment_index {
            return Ok(None);
        }

        let mapped = segment::open_segment(&root, &base_name, cursor.segment_index)?;
        let bytes = mapped.as_slice();
        let start = cursor.offset as usize;
        let search_end = segment_size.min(bytes.len());
        let Some(relative_newline) = bytes[start..search_end].iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let newline_at = start + relative_newline;
        let record = bytes[start..newline_at].to_vec();

        let mut next_offset = newline_at + 1;
        let mut next_segment = cursor.segment_index;
        if next_offset == segment_size {
            next_segment += 1;
            next_offset = 0;
        }
        cursor.segment_index = next_segment;
        cursor.offset = next_offset as u64;
        Ok(Some(record))
    }

    /// Returns every complete record in `segment_index`, stopping at the first record lacking a
    /// trailing newline within the segment.
    pub fn read_all(&self, segment_index: u64) -> Result<Vec<Vec<u8>>> {
        let (root, base_name) = {
            let state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;
            (state.root.clone(), state.base_name.clone())
        };
        let mapped = segment::open_segment(&root, &base_name, segment_index)?;
        let bytes = mapped.as_slice();
        let mut records = Vec::new();
        let mut start = 0usize;
        while let Some(relative_newline) = bytes[start..].iter().position(|&b| b == b'\n') {
            let newline_at = start + relative_newline;
            records.push(bytes[start..newline_at].to_vec());
            start = newline_at + 1;
        }
        Ok(records)
    }

    /// Flushes the mapped view of the current segment to disk.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;
        state.current.flush()
    }

    /// Stops the flush thread, flushes, and persists metadata. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            if let Some(handle) = self.flush_handle.lock().expect("flush handle lock poisoned").take() {
                let _ = handle.join();
            }
        }
        let state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;
        state.current.flush()?;
        state.persist_metadata()
    }

    /// Directory the log's segment and metadata files live under.
    pub fn root(&self) -> Result<PathBuf> {
        let state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;
        Ok(state.root.clone())
    }

    /// Base name shared by this log's segment and metadata files.
    pub fn base_name(&self) -> Result<String> {
        let state = self.state.lock().map_err(|_| Error::Corrupt("log state lock poisoned"))?;
        Ok(state.base_name.clone())
    }
}

impl Drop for SegmentedLog {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("error during segmented log shutdown: {err}");
        }
    }
}
