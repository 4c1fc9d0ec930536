//! Layered configuration for the `obd` tool
//!
//! Built-in defaults are overlaid by an optional TOML file and then by
//! `OBD_*` environment variables. Nested keys use a double underscore, so
//! `OBD_CONNECT__TIMEOUT_MS=500` sets `connect.timeout_ms`. Command-line
//! flags are applied last with [`AppConfig::merge_with_args`].

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use obd_protocol::{ConnectOptions, ObdProtocol, UnitsPreference};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Port value that selects the built-in emulated vehicle
pub const MOCK_PORT: &str = "mock";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial device, or `mock` for the emulated vehicle
    pub port: Option<String>,
    /// Fixed baud rate; detected when unset
    pub baud_rate: Option<u32>,
    pub connect: ConnectOptions,
    /// Whole connect sequences tried before giving up
    pub attempts: u32,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: None,
            connect: ConnectOptions::default(),
            attempts: 1,
            log_format: LogFormat::Text,
        }
    }
}

/// Values given on the command line; `None` and `false` leave the layered
/// configuration untouched
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub protocol: Option<ObdProtocol>,
    pub timeout_ms: Option<u64>,
    pub attempts: Option<u32>,
    pub fast: bool,
    pub imperial: bool,
    pub check_voltage: bool,
    pub log_format: Option<LogFormat>,
}

impl AppConfig {
    /// Load defaults, the optional file at `path`, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let builder = builder.add_source(
            Environment::with_prefix("OBD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::build(builder).with_context(|| match path {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration from the environment".to_string(),
        })
    }

    /// Parse a TOML document over the defaults, ignoring the environment
    pub fn from_toml(text: &str) -> Result<Self> {
        let builder = config::Config::builder().add_source(File::from_str(text, FileFormat::Toml));
        Self::build(builder).context("Failed to parse configuration")
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Apply command-line values over the layered configuration
    pub fn merge_with_args(mut self, args: &ArgOverrides) -> Self {
        if let Some(port) = &args.port {
            self.port = Some(port.clone());
        }
        self.baud_rate = args.baud_rate.or(self.baud_rate);
        if let Some(protocol) = args.protocol {
            self.connect.protocol = protocol;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            self.connect.timeout_ms = timeout_ms;
        }
        self.attempts = args.attempts.unwrap_or(self.attempts).max(1);
        self.connect.fast |= args.fast;
        self.connect.check_voltage |= args.check_voltage;
        if args.imperial {
            self.connect.units = UnitsPreference::Imperial;
        }
        self.log_format = args.log_format.unwrap_or(self.log_format);
        self
    }

    pub fn is_mock(&self) -> bool {
        self.port.as_deref() == Some(MOCK_PORT)
    }
}
