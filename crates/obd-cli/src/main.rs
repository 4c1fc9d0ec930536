//! obd - query vehicles through an ELM327 OBD-II adapter

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use obd_cli::output::{render_command, render_report, render_response, SessionReport};
use obd_cli::{connect, exit_code, init_logging, AppConfig, ArgOverrides, LogFormat};
use obd_protocol::{registry, Command, Connection, DecodedResponse, ObdProtocol};
use obd_scheduler::{CommandScheduler, SchedulerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "obd")]
#[command(author, version, about = "Query vehicles through an ELM327 OBD-II adapter", long_about = None)]
struct Cli {
    /// Serial device of the adapter, or `mock` for an emulated vehicle
    #[arg(short, long, global = true, env = "OBD_PORT")]
    port: Option<String>,

    /// Fixed baud rate (detected when omitted)
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "OBD_CONFIG")]
    config: Option<PathBuf>,

    /// Protocol id 1-9/A, or `auto`
    #[arg(long, global = true)]
    protocol: Option<ObdProtocol>,

    /// Per-query timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Connect attempts before giving up
    #[arg(long, global = true)]
    attempts: Option<u32>,

    /// Append expected frame counts to repeated requests
    #[arg(long, global = true)]
    fast: bool,

    /// Report values in imperial units
    #[arg(long, global = true)]
    imperial: bool,

    /// Refuse to connect outside 6-16 V supply voltage
    #[arg(long, global = true)]
    check_voltage: bool,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show adapter, protocol and ECU details
    Info,

    /// Query one or more commands by name or request (e.g. RPM, 010D)
    Query {
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// List the commands the vehicle supports
    Supported,

    /// Read stored trouble codes
    Dtc {
        /// Codes from the current drive cycle instead
        #[arg(long)]
        pending: bool,
    },

    /// Clear trouble codes and turn off the MIL
    ClearDtc {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Poll commands continuously until interrupted
    Watch {
        #[arg(required = true)]
        commands: Vec<String>,

        /// Polling rate per command in Hz
        #[arg(short, long, default_value_t = 5.0)]
        rate: f64,

        /// Stop after this many responses
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// List every known command
    Commands {
        /// Only commands of this mode (hex, e.g. 01)
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u8>,
    },
}

fn parse_mode(text: &str) -> Result<u8, String> {
    u8::from_str_radix(text.trim_start_matches("0x"), 16).map_err(|e| format!("{text}: {e}"))
}

impl Cli {
    fn overrides(&self) -> ArgOverrides {
        ArgOverrides {
            port: self.port.clone(),
            baud_rate: self.baud,
            protocol: self.protocol,
            timeout_ms: self.timeout_ms,
            attempts: self.attempts,
            fast: self.fast,
            imperial: self.imperial,
            check_voltage: self.check_voltage,
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config.merge_with_args(&cli.overrides()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = init_logging(config.log_format, cli.verbose) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(1);
    }

    info!("=== obd v{} ===", env!("CARGO_PKG_VERSION"));

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    if let Commands::Commands { mode } = &cli.command {
        list_commands(*mode);
        return Ok(());
    }

    let connection = connect(&config).await?;
    let result = dispatch(&cli, &connection).await;
    if let Err(e) = connection.close().await {
        warn!("Closing the adapter failed: {}", e);
    }
    result
}

async fn dispatch(cli: &Cli, connection: &Connection) -> Result<()> {
    match &cli.command {
        Commands::Info => {
            let voltage = match connection.adapter_voltage().await {
                Ok(volts) => Some(volts),
                Err(e) => {
                    warn!("Could not read adapter voltage: {}", e);
                    None
                }
            };
            let report = SessionReport::collect(connection, voltage);
            println!("{}", render_report(&report, cli.json));
        }
        Commands::Query { commands } => {
            for name in commands {
                let responses = connection
                    .query_named(name)
                    .await
                    .with_context(|| format!("querying {name}"))?;
                print_responses(&responses, cli.json);
            }
        }
        Commands::Supported => {
            for command in connection.supported_commands() {
                println!("{}", render_command(command));
            }
        }
        Commands::Dtc { pending } => {
            let name = if *pending { "GET_CURRENT_DTC" } else { "GET_DTC" };
            let responses = connection.query_named(name).await?;
            print_responses(&responses, cli.json);
        }
        Commands::ClearDtc { yes } => {
            if !yes {
                bail!("Clearing trouble codes also resets readiness monitors; pass --yes to confirm");
            }
            let responses = connection.query_named("CLEAR_DTC").await?;
            print_responses(&responses, cli.json);
        }
        Commands::Watch {
            commands,
            rate,
            count,
        } => watch(connection, resolve_all(commands)?, *rate, *count, cli.json).await?,
        Commands::Commands { .. } => {}
    }
    Ok(())
}

fn resolve_all(names: &[String]) -> Result<Vec<Command>> {
    names
        .iter()
        .map(|name| registry().resolve(name).cloned().map_err(anyhow::Error::from))
        .collect()
}

fn print_responses(responses: &[DecodedResponse], json: bool) {
    for response in responses {
        println!("{}", render_response(response, json));
    }
}

fn list_commands(mode: Option<u8>) {
    for command in registry().iter() {
        if mode.map_or(true, |m| command.mode == m) {
            println!("{}", render_command(command));
        }
    }
}

async fn watch(
    connection: &Connection,
    commands: Vec<Command>,
    rate_hz: f64,
    count: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut scheduler = CommandScheduler::new(SchedulerConfig {
        base_rate_hz: rate_hz,
        ..Default::default()
    });
    for command in commands {
        scheduler.watch(command);
    }

    let stop = scheduler.stop_handle();
    let interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.stop();
        }
    });

    let (tx, mut rx) = mpsc::channel(64);
    let printer = async move {
        let mut printed = 0;
        while let Some(response) = rx.recv().await {
            println!("{}", render_response(&response, json));
            printed += 1;
            if count.is_some_and(|limit| printed >= limit) {
                stop.stop();
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(scheduler.run(connection, tx), printer);
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from(["obd", "--port", "mock", "query", "RPM", "010D"]).unwrap();
        assert_eq!(cli.port.as_deref(), Some("mock"));
        match cli.command {
            Commands::Query { commands } => assert_eq!(commands, vec!["RPM", "010D"]),
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "obd", "watch", "SPEED", "--rate", "2", "-n", "10", "--protocol", "6", "--fast", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.protocol, Some(ObdProtocol::Iso15765_4Can11bit500));
        assert!(cli.fast);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Watch { rate, count, .. } => {
                assert_eq!(rate, 2.0);
                assert_eq!(count, Some(10));
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_protocol() {
        assert!(Cli::try_parse_from(["obd", "--protocol", "Z", "info"]).is_err());
        assert!(Cli::try_parse_from(["obd", "query"]).is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("01"), Ok(1));
        assert_eq!(parse_mode("0x09"), Ok(9));
        assert!(parse_mode("zz").is_err());
    }

    #[test]
    fn test_resolve_all() {
        let commands = resolve_all(&["RPM".to_string(), "010D".to_string()]).unwrap();
        assert_eq!(commands[0].name, "RPM");
        assert_eq!(commands[1].name, "SPEED");
        let err = resolve_all(&["NOPE".to_string()]).unwrap_err();
        assert_eq!(exit_code(&err), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_after_count() {
        let config = AppConfig {
            port: Some(obd_cli::MOCK_PORT.to_string()),
            ..Default::default()
        };
        let connection = connect(&config).await.unwrap();
        let commands = resolve_all(&["RPM".to_string()]).unwrap();
        watch(&connection, commands, 10.0, Some(3), false).await.unwrap();
    }
}
