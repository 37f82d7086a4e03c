//! Per-connection state owned exclusively by the worker handling its current readiness event.

use std::collections::HashSet;

use mio::net::TcpStream;
use mio::Token;

use crate::log::LogCursor;

/// Where a connection sits in its receive/dispatch/send cycle.
pub enum ConnState {
    Receiving,
    Sending { pending: Vec<u8>, written: usize },
    Closed,
}

/// Per-connection state: owned by the server's connection table, looked up by `Token`.
pub struct ClientSession {
    pub token: Token,
    pub stream: TcpStream,
    pub buffer: Vec<u8>,
    pub subscribed_topics: HashSet<String>,
    /// Reserved for future replay; not exercised by the wire protocol.
    pub cursor: LogCursor,
    /// Bytes received after the last `\n`, retained until more data completes the line.
    pub accumulator: Vec<u8>,
    pub state: ConnState,
}

impl ClientSession {
    pub fn new(token: Token, stream: TcpStream, buffer: Vec<u8>) -> Self {
        Self {
            token,
            stream,
            buffer,
            subscribed_topics: HashSet::new(),
            cursor: LogCursor::zero(),
            accumulator: Vec::new(),
            state: ConnState::Receiving,
        }
    }

    /// Appends freshly received bytes and drains every complete (`\n`-terminated) line,
    /// retaining any trailing partial line in the accumulator.
    pub fn drain_complete_lines(&mut self, received: &[u8]) -> Vec<String> {
        self.accumulator.extend_from_slice(received);
        let mut lines = Vec::new();
        while let Some(pos) = self.accumulator.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.accumulator.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
            lines.push(line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpListener;

    fn dummy_session() -> ClientSession {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        ClientSession::new(Token(1), stream, vec![0u8; 64])
    }

    #[test]
    fn drains_only_complete_lines() {
        let mut session = dummy_session();
        let lines = session.drain_complete_lines(b"SUBSCRIBE a\nPUL");
        assert_eq!(lines, vec!["SUBSCRIBE a".to_string()]);
        assert_eq!(session.accumulator, b"PUL");
    }

    #[test]
    fn completes_partial_line_on_next_chunk() {
        let mut session = dummy_session();
        session.drain_complete_lines(b"PUL");
        let lines = session.drain_complete_lines(b"L\n");
        assert_eq!(lines, vec!["PULL".to_string()]);
        assert!(session.accumulator.is_empty());
    }
}
