//! Scripted ELM327 emulator for tests and dry runs
//!
//! Replies are formatted like a real adapter: the request is echoed until
//! `ATE0`, lines end in `\r`, and each reply ends with `\r\r>`. Requests
//! with no scripted reply answer `NO DATA` (OBD) or `?` (AT). An empty
//! line repeats the previous request.

use super::{ReadOutcome, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct MockState {
    script: HashMap<String, VecDeque<Vec<String>>>,
    echo: bool,
    silent: bool,
    broken: bool,
    open: bool,
    delay: Duration,
    pending: Vec<u8>,
    ready_at: Option<Instant>,
    writes: Vec<String>,
    last_request: Option<String>,
}

/// Cloneable handle; clones share the same emulated adapter
#[derive(Debug, Clone)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Adapter that identifies itself and accepts the usual setup commands
    pub fn new() -> Self {
        let adapter = Self {
            state: Arc::new(Mutex::new(MockState {
                script: HashMap::new(),
                echo: true,
                silent: false,
                broken: false,
                open: true,
                delay: Duration::ZERO,
                pending: Vec::new(),
                ready_at: None,
                writes: Vec::new(),
                last_request: None,
            })),
        };
        adapter
            .with_response("ATZ", &["", "ELM327 v1.5"])
            .with_response("ATRV", &["12.6V"])
    }

    /// CAN 11/500 vehicle with one engine ECU
    pub fn can_vehicle() -> Self {
        Self::new()
            .with_response("ATDPN", &["A6"])
            .with_response("0100", &["7E8 06 41 00 BE 3F B8 13"])
            .with_response("0120", &["7E8 06 41 20 80 01 A0 01"])
            .with_response("0140", &["7E8 06 41 40 40 00 00 00"])
            .with_response("0600", &["7E8 06 46 00 C0 00 00 01"])
            .with_response("0900", &["7E8 06 49 00 55 40 00 00"])
            .with_response("010C", &["7E8 04 41 0C 1A F8"])
            .with_response("010D", &["7E8 03 41 0D 3C"])
            .with_response("0105", &["7E8 03 41 05 7B"])
            .with_response(
                "0902",
                &[
                    "7E8 10 14 49 02 01 31 44 34",
                    "7E8 21 47 50 30 30 52 35 35",
                    "7E8 22 42 31 32 33 34 35 36",
                ],
            )
            .with_response("03", &["7E8 04 43 01 01 33"])
            .with_response("04", &["7E8 01 44"])
    }

    /// Adapter that never answers anything
    pub fn silent() -> Self {
        let adapter = Self::new();
        adapter.set_silent(true);
        adapter
    }

    /// Reply to `request` with `lines`
    pub fn with_response(self, request: &str, lines: &[&str]) -> Self {
        self.respond(request, lines);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = delay;
        self
    }

    /// Replace every reply scripted for `request`
    pub fn respond(&self, request: &str, lines: &[&str]) {
        let reply: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        let mut state = self.state.lock();
        state.script.insert(normalize(request), VecDeque::from([reply]));
    }

    /// Queue a further reply for `request`.
    ///
    /// Queued replies are consumed in order; the last one is repeated.
    pub fn respond_then(&self, request: &str, lines: &[&str]) {
        let reply: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        let mut state = self.state.lock();
        state.script.entry(normalize(request)).or_default().push_back(reply);
    }

    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Make every subsequent write fail with an I/O error
    pub fn set_broken(&self, broken: bool) {
        self.state.lock().broken = broken;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    /// Every request written so far, terminator stripped
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Bytes produced but not yet read
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

fn normalize(request: &str) -> String {
    request
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

impl MockState {
    fn reply_for(&mut self, request: &str) -> Option<Vec<String>> {
        if let Some(queue) = self.script.get_mut(request) {
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if reply.is_some() {
                return reply;
            }
        }
        if request.is_empty() {
            return None;
        }
        if request.starts_with("AT") {
            return Some(vec![match request {
                "ATE0" | "ATE1" | "ATH0" | "ATH1" | "ATL0" | "ATL1" | "ATLP" | "ATS0" | "ATS1" => {
                    "OK".to_string()
                }
                _ if ["ATSP", "ATTP", "ATSH"].iter().any(|at| request.starts_with(at)) => {
                    "OK".to_string()
                }
                _ => "?".to_string(),
            }]);
        }
        Some(vec!["NO DATA".to_string()])
    }

    fn handle(&mut self, request: &str) {
        if self.silent {
            return;
        }
        let Some(lines) = self.reply_for(request) else {
            return;
        };
        let mut out = String::new();
        if self.echo {
            out.push_str(request);
            out.push('\r');
        }
        for line in &lines {
            out.push_str(line);
            out.push('\r');
        }
        out.push_str("\r>");
        match request {
            "ATE0" => self.echo = false,
            "ATE1" | "ATZ" => self.echo = true,
            _ => {}
        }
        self.pending.extend_from_slice(out.as_bytes());
        self.ready_at = Some(Instant::now() + self.delay);
    }
}

#[async_trait]
impl Transport for MockAdapter {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::Closed);
        }
        if state.broken {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock adapter unplugged",
            )));
        }
        let text = String::from_utf8_lossy(bytes).to_string();
        let mut lines: Vec<&str> = text.split('\r').collect();
        // Bytes after the last `\r`, such as a wake-up space
        let tail = lines.pop().filter(|t| !t.is_empty());
        for line in lines {
            state.writes.push(line.to_string());
            let request = normalize(line);
            let request = if request.is_empty() {
                match state.last_request.clone() {
                    Some(last) => last,
                    None => continue,
                }
            } else {
                state.last_request = Some(request.clone());
                request
            };
            state.handle(&request);
        }
        if let Some(tail) = tail {
            state.writes.push(tail.to_string());
            state.handle(&normalize(tail));
        }
        Ok(())
    }

    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<ReadOutcome, TransportError> {
        let deadline = Instant::now() + timeout;
        let ready_at = {
            let state = self.state.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            state.ready_at.filter(|_| !state.pending.is_empty())
        };
        match ready_at {
            Some(at) if at <= deadline => tokio::time::sleep_until(at).await,
            _ => {
                tokio::time::sleep_until(deadline).await;
                return Ok(ReadOutcome::default());
            }
        }
        let mut state = self.state.lock();
        let bytes = std::mem::take(&mut state.pending);
        state.ready_at = None;
        Ok(ReadOutcome {
            prompt_seen: bytes.contains(&super::PROMPT),
            bytes,
        })
    }

    async fn discard_input(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let arrived = state.ready_at.map_or(true, |at| at <= Instant::now());
        if arrived {
            state.pending.clear();
            state.ready_at = None;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().open = false;
        Ok(())
    }
}
