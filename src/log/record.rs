//! On-disk record envelope: `[<level>] timestamp: <YYYY-MM-DD HH:MM:SS>, message: <payload>\n`.

use std::time::{SystemTime, UNIX_EPOCH};

use time::OffsetDateTime;

/// Severity of a logged record. Distinct from the `log` crate's `Level`: this one is
/// serialized into the on-disk envelope, not the process's stderr stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Error => "error",
        }
    }
}

/// Formats a single record line, including the trailing `\n`.
pub fn format_record(level: Level, message: &str, now: SystemTime) -> String {
    format!(
        "[{}] timestamp: {}, message: {}\n",
        level.as_str(),
        format_timestamp(now),
        message
    )
}

fn format_timestamp(now: SystemTime) -> String {
    let dt = now
        .duration_since(UNIX_EPOCH)
        .map(|d| OffsetDateTime::from_unix_timestamp(d.as_secs() as i64))
        .unwrap_or(Ok(OffsetDateTime::UNIX_EPOCH))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let date = dt.date();
    let time = dt.time();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        date.year(),
        date.month() as u8,
        date.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_envelope_with_level_and_message() {
        let now = UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let record = format_record(Level::Info, "hello world", now);
        assert!(record.starts_with("[info] timestamp: "));
        assert!(record.contains(", message: hello world"));
        assert!(record.ends_with('\n'));
    }

    #[test]
    fn error_level_is_labeled() {
        let record = format_record(Level::Error, "boom", SystemTime::now());
        assert!(record.starts_with("[error] timestamp: "));
    }
}
