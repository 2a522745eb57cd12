//! Command loop: one request, one reply, then the cadence wait.
//!
//! The loop alternates between two states. In *Idle* it waits out the
//! cadence interval; in *Pending* it has sent a request and waits for the
//! reply. It never pipelines: the next request is only built after the
//! previous reply, receive error or send error has been handled. The
//! interval is inserted after each cycle, so it is a minimum spacing between
//! cycles rather than a wall-clock tick.
//!
//! Failures are retried forever at the same interval. There is no backoff
//! and no per-request timeout; a broker that never answers stalls the loop
//! until shutdown cancels it.

use std::sync::Arc;
use std::time::Duration;

use beacon_types::config::{BotConfig, EnvelopeKind};
use beacon_types::envelope::{CommandRequest, CommandResponse, OutboundRequest, ServiceRequest};
use beacon_types::error::{CodecError, TransportError};
use beacon_types::report::Report;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::sink::OutputSink;
use crate::transport::CommandChannel;

/// What the command loop needs from the configuration.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    pub bot_name: String,
    pub envelope: EnvelopeKind,
    pub interval: Duration,
}

impl From<&BotConfig> for CommandSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            bot_name: config.bot_name.clone(),
            envelope: config.envelope.clone(),
            interval: config.command_interval(),
        }
    }
}

/// Result of one Idle -> Pending -> Idle cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Replied(CommandResponse),
    /// Reply bytes that did not decode.
    Unparsed { raw: Vec<u8>, error: CodecError },
    EncodeFailed(CodecError),
    SendFailed(TransportError),
    ReceiveFailed(TransportError),
    /// The connection was torn down on purpose.
    Terminated,
}

pub struct CommandLoop<C> {
    channel: C,
    settings: CommandSettings,
    sink: Arc<dyn OutputSink>,
    clock: u64,
}

impl<C: CommandChannel> CommandLoop<C> {
    pub fn new(channel: C, settings: CommandSettings, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            channel,
            settings,
            sink,
            clock: 0,
        }
    }

    /// Build the request for the next cycle.
    ///
    /// Advances the logical clock, so each call produces a new request.
    pub fn next_request(&mut self) -> OutboundRequest {
        self.clock += 1;
        match &self.settings.envelope {
            EnvelopeKind::Command { name, args } => OutboundRequest::Command(
                args.iter()
                    .fold(CommandRequest::new(name.as_str()), |request, (key, value)| {
                        request.with_arg(key.as_str(), value.as_str())
                    }),
            ),
            EnvelopeKind::Service { service } => {
                let mut data = Map::new();
                data.insert("user".to_string(), Value::String(self.settings.bot_name.clone()));
                data.insert(
                    "content".to_string(),
                    Value::String(format!("Ping {}", self.clock)),
                );
                OutboundRequest::Service(ServiceRequest {
                    service: service.clone(),
                    data,
                    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    clock: self.clock,
                })
            }
        }
    }

    /// Run a single send/receive cycle.
    pub async fn cycle(&mut self, request: &OutboundRequest) -> CycleOutcome {
        let payload = match codec::encode(request) {
            Ok(payload) => payload,
            Err(e) => return CycleOutcome::EncodeFailed(e),
        };

        if let Err(e) = self.channel.send(payload).await {
            return if e.is_terminated() {
                CycleOutcome::Terminated
            } else {
                CycleOutcome::SendFailed(e)
            };
        }

        let raw = match self.channel.recv().await {
            Ok(raw) => raw,
            Err(e) if e.is_terminated() => return CycleOutcome::Terminated,
            Err(e) => return CycleOutcome::ReceiveFailed(e),
        };

        match codec::decode_reply(&self.settings.envelope, &raw) {
            Ok(reply) => CycleOutcome::Replied(reply),
            Err(error) => CycleOutcome::Unparsed { raw, error },
        }
    }

    /// Run until `stop` is cancelled or the connection is terminated, then
    /// hand the connection back to the caller for release.
    pub async fn run(mut self, stop: CancellationToken) -> C {
        let interval = self.settings.interval;
        info!(interval_secs = interval.as_secs(), "command loop started");
        self.sink.report(Report::CommandLoopStarted {
            interval_secs: interval.as_secs(),
        });

        loop {
            let request = self.next_request();
            let label = request.label().to_string();

            let outcome = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                outcome = self.cycle(&request) => outcome,
            };

            if !self.record(&label, outcome) {
                break;
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!("command loop stopped");
        self.channel
    }

    /// Log and report a cycle outcome. Returns `false` when the loop must exit.
    fn record(&self, command: &str, outcome: CycleOutcome) -> bool {
        let report = match outcome {
            CycleOutcome::Replied(reply) => {
                debug!(command, status = %reply.status, "reply received");
                Report::Reply {
                    command: command.to_string(),
                    status: reply.status,
                    message: reply.message,
                }
            }
            CycleOutcome::Unparsed { raw, error } => {
                let raw = String::from_utf8_lossy(&raw).into_owned();
                warn!(command, %error, raw = %raw, "reply did not decode");
                Report::UnparsedReply {
                    command: command.to_string(),
                    raw,
                }
            }
            CycleOutcome::EncodeFailed(error) => {
                warn!(command, %error, "failed to encode request");
                Report::SendFailed {
                    command: command.to_string(),
                    error: error.to_string(),
                }
            }
            CycleOutcome::SendFailed(error) => {
                warn!(command, %error, "failed to send command");
                Report::SendFailed {
                    command: command.to_string(),
                    error: error.to_string(),
                }
            }
            CycleOutcome::ReceiveFailed(error) => {
                warn!(command, %error, "failed to receive reply");
                Report::ReceiveFailed {
                    command: command.to_string(),
                    error: error.to_string(),
                }
            }
            CycleOutcome::Terminated => {
                debug!(command, "command connection terminated");
                return false;
            }
        };
        self.sink.report(report);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
