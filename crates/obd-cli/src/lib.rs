//! Command-line front end for ELM327 OBD-II adapters
//!
//! Loads the layered configuration, installs logging, opens the adapter and
//! maps library errors onto process exit codes.

pub mod config;
pub mod output;

pub use config::{AppConfig, ArgOverrides, LogFormat, MOCK_PORT};

use anyhow::{bail, Context, Result};
use obd_protocol::{Connection, MockAdapter, ObdError, SerialTransport, Transport, TransportError};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Pause between whole connect attempts
pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Initialize the logging subsystem on stderr.
///
/// `RUST_LOG` wins over `verbosity` when set.
pub fn init_logging(format: LogFormat, verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    installed.context("setting default subscriber failed")
}

/// Process exit code for a failed run
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<ObdError>() {
            return obd_exit_code(err);
        }
        if cause.downcast_ref::<TransportError>().is_some() {
            return 8;
        }
    }
    1
}

fn obd_exit_code(err: &ObdError) -> u8 {
    match err {
        ObdError::AdapterUnresponsive(_) => 2,
        ObdError::ProtocolDetectionFailed(_) => 3,
        ObdError::NotConnected => 4,
        ObdError::ProtocolError { .. } => 5,
        ObdError::MalformedData(_) => 6,
        ObdError::IndexOutOfRange { .. } => 7,
        ObdError::Transport(_) => 8,
        ObdError::VoltageOutOfRange(_) => 9,
        ObdError::UnknownCommand(_) | ObdError::InvalidProtocol(_) => 10,
    }
}

/// Open the configured port, detecting the baud rate when none is set
pub async fn open_transport(config: &AppConfig) -> Result<Box<dyn Transport>> {
    if config.is_mock() {
        info!("Using the emulated CAN vehicle");
        return Ok(Box::new(MockAdapter::can_vehicle()));
    }
    let Some(port) = config.port.as_deref() else {
        bail!("No serial port given; pass --port or set OBD_PORT");
    };
    let transport = match config.baud_rate {
        Some(baud_rate) => SerialTransport::open(port, baud_rate)?,
        None => SerialTransport::open_auto_baud(port).await?,
    };
    Ok(Box::new(transport))
}

/// Run the whole connect sequence up to `config.attempts` times
pub async fn connect(config: &AppConfig) -> Result<Connection> {
    connect_with(config, || open_transport(config)).await
}

/// [`connect`] with a caller-supplied transport factory
pub async fn connect_with<F, Fut>(config: &AppConfig, mut open: F) -> Result<Connection>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Box<dyn Transport>>>,
{
    let attempts = config.attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match open().await {
            Ok(transport) => Connection::open(transport, config.connect.clone())
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(connection) => return Ok(connection),
            Err(e) if attempt < attempts => {
                warn!("Connect attempt {}/{} failed: {:#}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(RETRY_PAUSE).await;
            }
            Err(e) => return Err(e.context(format!("giving up after {attempts} attempt(s)"))),
        }
    }
}
