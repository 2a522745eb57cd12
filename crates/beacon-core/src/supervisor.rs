//! Lifecycle supervisor.
//!
//! Connects both channels, spawns the command and broadcast loops as
//! independent tasks, then parks until the [`TerminationSignal`] fires. On
//! termination it cancels both loops, gives each a bounded window to hand
//! its connection back, releases the connections (command first, then
//! broadcast) and aborts any loop that missed the window. In-flight requests
//! are abandoned, not drained.
//!
//! Termination is also honoured while the connections are still being
//! established, so a broker that never answers cannot pin the process.
//!
//! The loops share nothing but the cancellation signal and the output sink.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use beacon_types::config::BotConfig;
use beacon_types::error::SupervisorError;
use beacon_types::report::Report;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::broadcast::{BroadcastLoop, BroadcastSettings};
use crate::command::{CommandLoop, CommandSettings};
use crate::lifecycle::TerminationSignal;
use crate::sink::OutputSink;
use crate::transport::{BroadcastChannel, CommandChannel, Connector};

/// How a loop ended during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The loop stopped and its connection was closed.
    Drained,
    /// The loop missed the shutdown window and was aborted.
    Aborted,
    /// The loop task panicked.
    Panicked,
    /// Termination arrived before the loop was spawned.
    NotStarted,
}

/// Outcome of one supervisor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub session_id: Uuid,
    pub command: LoopExit,
    pub broadcast: LoopExit,
}

pub struct Supervisor<K> {
    config: BotConfig,
    connector: K,
    sink: Arc<dyn OutputSink>,
    termination: TerminationSignal,
}

impl<K: Connector> Supervisor<K> {
    pub fn new(config: BotConfig, connector: K, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            config,
            connector,
            sink,
            termination: TerminationSignal::new(),
        }
    }

    /// Handle used to request shutdown. Clone it into the signal listener.
    pub fn termination(&self) -> TerminationSignal {
        self.termination.clone()
    }

    /// Run the bot until the termination signal fires.
    ///
    /// # Errors
    ///
    /// Returns a [`SupervisorError`] if either connection cannot be
    /// established. This is the only error that leaves the supervisor.
    pub async fn run(self) -> Result<ShutdownSummary, SupervisorError> {
        let session_id = Uuid::now_v7();
        let span = info_span!("session", %session_id, bot = %self.config.bot_name);
        self.run_session(session_id).instrument(span).await
    }

    async fn run_session(self, session_id: Uuid) -> Result<ShutdownSummary, SupervisorError> {
        let config = &self.config;

        let command = tokio::select! {
            biased;
            _ = self.termination.fired() => return Ok(self.abandon_startup(session_id)),
            connected = self.connector.connect_command(&config.broker_address) => {
                connected.map_err(SupervisorError::CommandConnect)?
            }
        };
        info!(endpoint = %config.broker_address, "command channel connected");

        let connected = tokio::select! {
            biased;
            _ = self.termination.fired() => None,
            connected = self
                .connector
                .connect_broadcast(&config.distributor_address, &config.subscribe_topic) => {
                Some(connected)
            }
        };
        let broadcast = match connected {
            Some(Ok(broadcast)) => broadcast,
            Some(Err(e)) => {
                command.close().await;
                return Err(SupervisorError::BroadcastConnect(e));
            }
            None => {
                command.close().await;
                return Ok(self.abandon_startup(session_id));
            }
        };
        info!(
            endpoint = %config.distributor_address,
            topic = %config.subscribe_topic,
            "broadcast channel subscribed"
        );

        self.sink.report(Report::Started {
            bot_name: config.bot_name.clone(),
            broker_address: config.broker_address.clone(),
            distributor_address: config.distributor_address.clone(),
        });

        let command_task = tokio::spawn(
            CommandLoop::new(command, CommandSettings::from(config), Arc::clone(&self.sink))
                .run(self.termination.child_token())
                .in_current_span(),
        );
        let broadcast_task = tokio::spawn(
            BroadcastLoop::new(
                broadcast,
                BroadcastSettings::from(config),
                Arc::clone(&self.sink),
            )
            .run(self.termination.child_token())
            .in_current_span(),
        );

        self.termination.fired().await;
        info!("termination requested");
        self.sink.report(Report::ShutdownRequested);

        let grace = config.shutdown_grace();
        let command_exit = release(command_task, grace, "command", |c| c.close()).await;
        let broadcast_exit = release(broadcast_task, grace, "broadcast", |b| b.close()).await;

        self.sink.report(Report::ShutdownComplete);
        info!(?command_exit, ?broadcast_exit, "shutdown complete");

        Ok(ShutdownSummary {
            session_id,
            command: command_exit,
            broadcast: broadcast_exit,
        })
    }

    /// Shutdown requested before both loops were running.
    fn abandon_startup(&self, session_id: Uuid) -> ShutdownSummary {
        info!("termination requested while connecting");
        self.sink.report(Report::ShutdownRequested);
        self.sink.report(Report::ShutdownComplete);
        ShutdownSummary {
            session_id,
            command: LoopExit::NotStarted,
            broadcast: LoopExit::NotStarted,
        }
    }
}

/// Wait up to `grace` for a loop to return its connection, then close it.
async fn release<T, F, Fut>(
    mut task: JoinHandle<T>,
    grace: Duration,
    name: &'static str,
    close: F,
) -> LoopExit
where
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = ()>,
{
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(channel)) => {
            close(channel).await;
            LoopExit::Drained
        }
        Ok(Err(e)) => {
            warn!(loop_name = name, error = %e, "loop task failed");
            LoopExit::Panicked
        }
        Err(_) => {
            warn!(
                loop_name = name,
                grace_ms = grace.as_millis() as u64,
                "loop missed shutdown window, aborting"
            );
            task.abort();
            LoopExit::Aborted
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
