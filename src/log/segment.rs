//! Segment file naming, creation, and metadata persistence.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::mmap::MmapFile;

pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;
pub const DEFAULT_BASE_NAME: &str = "broker_log";

pub fn segment_filename(base_name: &str, index: u64) -> String {
    format!("{base_name}_{index:05}.log")
}

pub fn segment_path(root: &Path, base_name: &str, index: u64) -> PathBuf {
    root.join(segment_filename(base_name, index))
}

pub fn meta_path(root: &Path, base_name: &str) -> PathBuf {
    root.join(format!("{base_name}.meta"))
}

/// Creates segment `index`, growing it to exactly `segment_size` bytes, and maps it read/write.
pub fn create_segment(root: &Path, base_name: &str, index: u64, segment_size: usize) -> Result<MmapFile> {
    MmapFile::create(&segment_path(root, base_name, index), segment_size)
}

/// Opens an existing segment read/write without resizing it.
pub fn open_segment(root: &Path, base_name: &str, index: u64) -> Result<MmapFile> {
    MmapFile::open(&segment_path(root, base_name, index))
}

/// Opens segment `index` if it already has the expected size; recreates it otherwise.
pub fn open_or_create_segment(root: &Path, base_name: &str, index: u64, segment_size: usize) -> Result<MmapFile> {
    let path = segment_path(root, base_name, index);
    match path.metadata() {
        Ok(meta) if meta.len() == segment_size as u64 => MmapFile::open(&path),
        _ => MmapFile::create(&path, segment_size),
    }
}

/// Position persisted across restarts: `(current_segment_index, current_offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub segment_index: u64,
    pub offset: u64,
}

impl Position {
    pub fn zero() -> Self {
        Self {
            segment_index: 0,
            offset: 0,
        }
    }
}

/// Loads `<base_name>.meta` under `root`, returning `Position::zero()` if it is absent,
/// unreadable, or references a segment that no longer exists on disk.
pub fn load_metadata(root: &Path, base_name: &str) -> Position {
    let path = meta_path(root, base_name);
    let fallback = Position::zero();
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(_) => return fallback,
    };
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_err() {
        return fallback;
    }
    let mut parts = contents.split_whitespace();
    let (Some(segment_index), Some(offset)) = (parts.next(), parts.next()) else {
        return fallback;
    };
    let (Ok(segment_index), Ok(offset)) = (segment_index.parse::<u64>(), offset.parse::<u64>()) else {
        return fallback;
    };
    if !segment_path(root, base_name, segment_index).exists() {
        return fallback;
    }
    Position {
        segment_index,
        offset,
    }
}

/// Writes `<base_name>.meta` under `root`, retrying once on failure.
pub fn store_metadata(root: &Path, base_name: &str, position: Position) -> Result<()> {
    let path = meta_path(root, base_name);
    let contents = format!("{} {}", position.segment_index, position.offset);
    match write_metadata_file(&path, &contents) {
        Ok(()) => Ok(()),
        Err(_) => write_metadata_file(&path, &contents),
    }
}

fn write_metadata_file(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_metadata_resets_to_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(load_metadata(dir.path(), "test_base"), Position::zero());
    }

    #[test]
    fn metadata_round_trips() {
        let dir = tempdir().unwrap();
        create_segment(dir.path(), "test_base", 3, 4096).unwrap();
        store_metadata(dir.path(), "test_base", Position {
            segment_index: 3,
            offset: 128,
        })
        .unwrap();
        let loaded = load_metadata(dir.path(), "test_base");
        assert_eq!(loaded.segment_index, 3);
        assert_eq!(loaded.offset, 128);
    }

    #[test]
    fn metadata_referencing_missing_segment_resets() {
        let dir = tempdir().unwrap();
        store_metadata(dir.path(), "test_base", Position {
            segment_index: 7,
            offset: 64,
        })
        .unwrap();
        assert_eq!(load_metadata(dir.path(), "test_base"), Position::zero());
    }
}
