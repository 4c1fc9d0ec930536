//! Serial port transport (USB, Bluetooth SPP and serial bridges)

use super::{response_lines, ReadOutcome, Transport, PROMPT};
use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info};

/// Baud rates tried by [`SerialTransport::open_auto_baud`], most common first
pub const ELM_BAUD_RATES: [u32; 8] = [38400, 9600, 115200, 57600, 19200, 14400, 230400, 500000];

const BAUD_CHECK: &[u8] = b"\x7F\x7F\r";
const BAUD_CHECK_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 256;

pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
    baud_rate: u32,
}

impl SerialTransport {
    /// Open `port_name` at 8N1
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = tokio_serial::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| TransportError::Open {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
            baud_rate,
        })
    }

    /// Open `port_name` at the first baud rate the adapter answers on
    pub async fn open_auto_baud(port_name: &str) -> Result<Self, TransportError> {
        for baud_rate in ELM_BAUD_RATES {
            let mut transport = match Self::open(port_name, baud_rate) {
                Ok(t) => t,
                Err(e) => {
                    debug!("{}", e);
                    continue;
                }
            };
            transport.discard_input().await?;
            transport.write(BAUD_CHECK).await?;
            let outcome = transport.read_until_prompt(BAUD_CHECK_TIMEOUT).await?;
            if adapter_answered(&outcome) {
                info!("Adapter answered on {} at {} baud", port_name, baud_rate);
                return Ok(transport);
            }
            debug!("No adapter reply at {} baud", baud_rate);
            transport.close().await?;
        }
        Err(TransportError::Open {
            port: port_name.to_string(),
            reason: "no ELM327 reply at any standard baud rate".to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn port(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

/// An adapter either identifies itself or echoes the check bytes and prompts
fn adapter_answered(outcome: &ReadOutcome) -> bool {
    let echoed = outcome.bytes.windows(2).any(|w| w == b"\x7F\x7F");
    let identified = response_lines(&outcome.bytes).iter().any(|l| l.contains("ELM"));
    identified || (echoed && outcome.prompt_seen)
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<ReadOutcome, TransportError> {
        let deadline = Instant::now() + timeout;
        let port = self.port()?;
        let mut outcome = ReadOutcome::default();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = match tokio::time::timeout_at(deadline, port.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            outcome.bytes.extend_from_slice(&chunk[..n]);
            if chunk[..n].contains(&PROMPT) {
                outcome.prompt_seen = true;
                break;
            }
        }
        Ok(outcome)
    }

    async fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            info!("Closed {}", self.port_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_answered() {
        let identified = ReadOutcome {
            bytes: b"\x7F\x7F\rELM327 v1.5\r\r>".to_vec(),
            prompt_seen: true,
        };
        assert!(adapter_answered(&identified));

        let echoed = ReadOutcome {
            bytes: b"\x7F\x7F\r?\r\r>".to_vec(),
            prompt_seen: true,
        };
        assert!(adapter_answered(&echoed));

        let garbage = ReadOutcome {
            bytes: vec![0xFF, 0x00, 0x13],
            prompt_seen: false,
        };
        assert!(!adapter_answered(&garbage));
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = SerialTransport::open("/dev/does-not-exist-obd", 38400);
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }
}
