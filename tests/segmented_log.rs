use linebroker::log::{Level, LogCursor, SegmentedLog};
use tempfile::tempdir;

#[test]
fn read_all_concatenated_matches_append_order() {
    let dir = tempdir().unwrap();
    let log = SegmentedLog::open_in(dir.path(), "it_log", 256).unwrap();
    let messages: Vec<String> = (0..30).map(|i| format!("record-{i}")).collect();
    for message in &messages {
        log.append(Level::Info, message).unwrap();
    }

    let mut collected = Vec::new();
    for segment_index in 0.. {
        if !linebroker::log::segment::segment_path(dir.path(), "it_log", segment_index).exists() {
            break;
        }
        let records = log.read_all(segment_index).unwrap();
        if records.is_empty() && segment_index > 0 {
            break;
        }
        for record in records {
            let text = String::from_utf8(record).unwrap();
            let message = text.split("message: ").nth(1).unwrap().to_string();
            collected.push(message);
        }
    }
    assert_eq!(collected, messages);
}

#[test]
fn cursor_reads_are_idempotent_once_exhausted() {
    let dir = tempdir().unwrap();
    let log = SegmentedLog::open_in(dir.path(), "cursor_log", 4096).unwrap();
    log.append(Level::Info, "only one record").unwrap();

    let mut cursor = LogCursor::zero();
    let record = log.read_next(&mut cursor).unwrap();
    assert!(record.is_some());
    assert!(log.read_next(&mut cursor).unwrap().is_none());
    assert!(log.read_next(&mut cursor).unwrap().is_none());
}

#[test]
fn metadata_survives_process_restart() {
    let dir = tempdir().unwrap();
    {
        let log = SegmentedLog::open_in(dir.path(), "restart_it_log", 4096).unwrap();
        for i in 0..5 {
            log.append(Level::Info, &format!("entry-{i}")).unwrap();
        }
        log.shutdown().unwrap();
    }

    let reopened = SegmentedLog::open_in(dir.path(), "restart_it_log", 4096).unwrap();
    let mut cursor = LogCursor::zero();
    for i in 0..5 {
        let record = reopened.read_next(&mut cursor).unwrap().unwrap();
        let text = String::from_utf8(record).unwrap();
        assert!(text.contains(&format!("entry-{i}")));
    }
    assert!(reopened.read_next(&mut cursor).unwrap().is_none());
}
