//! Byte transport underneath the adapter
//!
//! The ELM327 is a half-duplex, line-oriented shell: a request is a line
//! terminated by `\r`, and every reply ends with the `>` prompt.

pub mod mock;
mod serial;

pub use mock::MockAdapter;
pub use serial::{SerialTransport, ELM_BAUD_RATES};

use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Prompt printed by the adapter when it is ready for the next request
pub const PROMPT: u8 = b'>';

/// Bytes collected by one read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes: Vec<u8>,
    /// `false` when the read stopped on the timeout
    pub prompt_seen: bool,
}

#[async_trait]
pub trait Transport: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read until the prompt arrives or `timeout` elapses.
    ///
    /// A timeout is not an error; whatever arrived is returned.
    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<ReadOutcome, TransportError>;

    /// Drop anything already received but not yet read
    async fn discard_input(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Split a raw reply into trimmed, non-empty lines
pub fn response_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != '\0' && *c != char::from(PROMPT))
        .collect::<String>()
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_lines() {
        let raw = b"7E8 03 41 0D 3C\r7E9 03 41 0D 3C\r\r>";
        assert_eq!(response_lines(raw), vec!["7E8 03 41 0D 3C", "7E9 03 41 0D 3C"]);
        assert_eq!(response_lines(b"\0\r\n  OK \r\r>"), vec!["OK"]);
        assert!(response_lines(b">").is_empty());
    }
}
