//! Startup configuration for the bot.
//!
//! `BotConfig` is built once at startup (defaults, then a TOML file, then CLI
//! overrides) and handed to the supervisor. Nothing here is global or
//! mutable after startup.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration. All fields have defaults matching the reference
/// deployment (broker on 5555, distribution proxy on 5558, 10s cadence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Endpoint of the broker's command socket.
    #[serde(default = "default_broker_address")]
    pub broker_address: String,

    /// Endpoint of the distribution proxy's fan-out socket.
    #[serde(default = "default_distributor_address")]
    pub distributor_address: String,

    /// Minimum spacing between the end of one command cycle and the next send.
    #[serde(default = "default_command_interval_secs")]
    pub command_interval_secs: u64,

    /// Wait after subscribing before the first broadcast receive.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Upper bound on how long shutdown waits for each loop to hand back
    /// its connection.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// How long a connect (or reconnect) may keep retrying before it fails.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Subscription prefix. Empty subscribes to every topic.
    #[serde(default)]
    pub subscribe_topic: String,

    /// Topic reported as an alert.
    #[serde(default = "default_alert_topic")]
    pub alert_topic: String,

    #[serde(default)]
    pub framing: Framing,

    #[serde(default)]
    pub envelope: EnvelopeKind,
}

fn default_bot_name() -> String {
    "StatusBot".to_string()
}

fn default_broker_address() -> String {
    "tcp://127.0.0.1:5555".to_string()
}

fn default_distributor_address() -> String {
    "tcp://127.0.0.1:5558".to_string()
}

fn default_command_interval_secs() -> u64 {
    10
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_alert_topic() -> String {
    "ALERTA".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: default_bot_name(),
            broker_address: default_broker_address(),
            distributor_address: default_distributor_address(),
            command_interval_secs: default_command_interval_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            subscribe_topic: String::new(),
            alert_topic: default_alert_topic(),
            framing: Framing::default(),
            envelope: EnvelopeKind::default(),
        }
    }
}

impl BotConfig {
    pub fn command_interval(&self) -> Duration {
        Duration::from_secs(self.command_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check the values that would otherwise fail late or spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, address) in [
            ("broker_address", &self.broker_address),
            ("distributor_address", &self.distributor_address),
        ] {
            if address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
            if !address.contains("://") {
                return Err(ConfigError::Invalid(format!(
                    "{name} '{address}' is missing a transport prefix (e.g. tcp://)"
                )));
            }
        }
        if self.command_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "command_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::Invalid(
                "shutdown_grace_ms must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let EnvelopeKind::Command { name, .. } = &self.envelope {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("command name must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// How a request is laid out in frames on the command connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// The encoded envelope is the only frame.
    #[default]
    Bare,
    /// An empty delimiter frame precedes the envelope (REQ/REP-compatible).
    Delimited,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare => write!(f, "bare"),
            Self::Delimited => write!(f, "delimited"),
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bare" => Ok(Self::Bare),
            "delimited" => Ok(Self::Delimited),
            other => Err(format!("invalid framing: '{other}' (expected bare or delimited)")),
        }
    }
}

/// Which request shape the command loop sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// `{cmd, args}` with a fixed command name.
    Command {
        #[serde(default = "default_command_name")]
        name: String,
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
    /// `{service, data, timestamp, clock}`.
    Service {
        #[serde(default = "default_service_name")]
        service: String,
    },
}

fn default_command_name() -> String {
    "LIST".to_string()
}

fn default_service_name() -> String {
    "publish".to_string()
}

impl Default for EnvelopeKind {
    fn default() -> Self {
        Self::Command {
            name: default_command_name(),
            args: BTreeMap::new(),
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { name, .. } => write!(f, "command ({name})"),
            Self::Service { service } => write!(f, "service ({service})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
