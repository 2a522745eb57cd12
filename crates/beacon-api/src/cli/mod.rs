//! CLI command definitions for the `beacon` binary.
//!
//! Uses clap derive macros for argument parsing. Settings resolve in order:
//! built-in defaults, the config file, then flags and `BEACON_*` variables.

pub mod config;
pub mod run;

use std::path::PathBuf;

use beacon_types::config::{BotConfig, Framing};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Run a status bot against a ZeroMQ broker and distribution proxy.
#[derive(Parser)]
#[command(name = "beacon", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true, env = "BEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    /// Not combinable with --json, whose lines would interleave with spans.
    #[arg(long, global = true, conflicts_with = "json")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the broker and distributor and run until interrupted.
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration and exit.
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Per-run settings that take precedence over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Bot name shown in reports and logs.
    #[arg(long, env = "BEACON_NAME")]
    pub name: Option<String>,

    /// Broker endpoint for commands (e.g. tcp://127.0.0.1:5555).
    #[arg(long, env = "BEACON_BROKER")]
    pub broker: Option<String>,

    /// Distribution proxy endpoint for broadcasts (e.g. tcp://127.0.0.1:5558).
    #[arg(long, env = "BEACON_DISTRIBUTOR")]
    pub distributor: Option<String>,

    /// Seconds to wait after each completed command cycle.
    #[arg(long, env = "BEACON_INTERVAL")]
    pub interval: Option<u64>,

    /// Subscription prefix; empty receives every topic.
    #[arg(long, env = "BEACON_TOPIC")]
    pub topic: Option<String>,

    /// Topic reported as an alert.
    #[arg(long, env = "BEACON_ALERT_TOPIC")]
    pub alert_topic: Option<String>,

    /// Request framing: bare or delimited.
    #[arg(long, env = "BEACON_FRAMING")]
    pub framing: Option<Framing>,
}

impl Overrides {
    /// Apply every override that was given.
    pub fn apply(&self, config: &mut BotConfig) {
        if let Some(name) = &self.name {
            config.bot_name = name.clone();
        }
        if let Some(broker) = &self.broker {
            config.broker_address = broker.clone();
        }
        if let Some(distributor) = &self.distributor {
            config.distributor_address = distributor.clone();
        }
        if let Some(interval) = self.interval {
            config.command_interval_secs = interval;
        }
        if let Some(topic) = &self.topic {
            config.subscribe_topic = topic.clone();
        }
        if let Some(alert_topic) = &self.alert_topic {
            config.alert_topic = alert_topic.clone();
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "beacon",
            "-v",
            "run",
            "--broker",
            "tcp://10.0.0.1:5555",
            "--interval",
            "3",
            "--framing",
            "delimited",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Run { overrides } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(overrides.broker.as_deref(), Some("tcp://10.0.0.1:5555"));
        assert_eq!(overrides.interval, Some(3));
        assert_eq!(overrides.framing, Some(Framing::Delimited));
    }

    #[test]
    fn otel_and_json_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["beacon", "--otel", "--json", "run"]).is_err());
        assert!(Cli::try_parse_from(["beacon", "--otel", "run"]).is_ok());
    }

    #[test]
    fn unknown_framing_is_rejected() {
        assert!(Cli::try_parse_from(["beacon", "run", "--framing", "zmtp"]).is_err());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut config = BotConfig::default();
        Overrides {
            name: Some("Night".to_string()),
            interval: Some(2),
            topic: Some("ALERTA".to_string()),
            ..Overrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.bot_name, "Night");
        assert_eq!(config.command_interval_secs, 2);
        assert_eq!(config.subscribe_topic, "ALERTA");
        assert_eq!(config.broker_address, BotConfig::default().broker_address);
        assert_eq!(config.framing, Framing::Bare);
    }
}
