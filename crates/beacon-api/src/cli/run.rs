//! `beacon run`: start the bot and run until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_core::{Connector, LoopExit, ShutdownSummary, Supervisor, TerminationSignal};
use beacon_infra::zmq::ZmqConnector;
use beacon_types::config::BotConfig;
use tracing::{debug, info, warn};

use crate::output::ConsoleSink;

pub async fn run_bot(config: BotConfig, json: bool) -> Result<()> {
    let connector = ZmqConnector::from(&config);
    let sink = Arc::new(ConsoleSink::stdout(json));
    let summary = supervise(Supervisor::new(config, connector, sink)).await?;

    for (name, exit) in [("command", summary.command), ("broadcast", summary.broadcast)] {
        if matches!(exit, LoopExit::Aborted | LoopExit::Panicked) {
            warn!(loop_name = name, ?exit, "loop did not stop cleanly");
        }
    }
    Ok(())
}

/// Run `supervisor` with OS signals wired to its termination handle.
async fn supervise<K: Connector>(supervisor: Supervisor<K>) -> Result<ShutdownSummary> {
    let listener = tokio::spawn(listen_for_shutdown(supervisor.termination()));
    let result = supervisor.run().await;
    listener.abort();
    result.context("failed to start bot")
}

/// Trigger termination on every Ctrl+C or SIGTERM; only the first counts.
async fn listen_for_shutdown(termination: TerminationSignal) {
    loop {
        if !shutdown_signal().await {
            return;
        }
        if termination.trigger() {
            info!("termination signal received");
        } else {
            debug!("termination already in progress, ignoring signal");
        }
    }
}

/// Wait for Ctrl+C or SIGTERM. Returns false if no handler could be
/// installed.
async fn shutdown_signal() -> bool {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl+C handler");
                false
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await.is_some(),
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<bool>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<bool>();

    tokio::select! {
        received = ctrl_c => received,
        received = terminate => received,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::MemorySink;
    use beacon_core::memory::MemoryConnector;
    use beacon_types::report::Report;
    use std::time::Duration;

    fn fast_config() -> BotConfig {
        BotConfig {
            command_interval_secs: 1,
            settle_delay_ms: 0,
            shutdown_grace_ms: 500,
            ..BotConfig::default()
        }
    }

    #[tokio::test]
    async fn supervise_returns_summary_after_termination() {
        let (connector, mut broker, publisher) = MemoryConnector::with_handles();
        let sink = Arc::new(MemorySink::new());
        let supervisor = Supervisor::new(fast_config(), connector, sink.clone());
        let termination = supervisor.termination();
        let handle = tokio::spawn(supervise(supervisor));

        broker.next_request().await.unwrap();
        publisher.publish(&["ALERTA", "disk full"]);
        assert!(
            sink.wait_for(Duration::from_secs(1), |r| r.iter().any(Report::is_alert))
                .await
        );

        termination.trigger();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.command, LoopExit::Drained);
        assert_eq!(summary.broadcast, LoopExit::Drained);
    }

    /// A loopback endpoint with nothing listening on it.
    fn closed_endpoint() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("tcp://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn termination_while_broker_is_unreachable_exits_promptly() {
        let config = BotConfig {
            broker_address: closed_endpoint(),
            connect_timeout_ms: 60_000,
            ..fast_config()
        };
        let connector = ZmqConnector::from(&config);
        let supervisor = Supervisor::new(config, connector, Arc::new(MemorySink::new()));
        let termination = supervisor.termination();
        let handle = tokio::spawn(supervise(supervisor));

        tokio::time::sleep(Duration::from_millis(200)).await;
        termination.trigger();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown must not wait for the connect")
            .unwrap()
            .unwrap();
        assert_eq!(summary.command, LoopExit::NotStarted);
    }

    #[tokio::test]
    async fn unreachable_broker_is_a_startup_error() {
        let config = BotConfig {
            broker_address: closed_endpoint(),
            connect_timeout_ms: 200,
            ..fast_config()
        };
        let connector = ZmqConnector::from(&config);
        let supervisor = Supervisor::new(config, connector, Arc::new(MemorySink::new()));

        let err = tokio::time::timeout(Duration::from_secs(5), supervise(supervisor))
            .await
            .expect("connect must be bounded")
            .unwrap_err();
        assert!(format!("{err:#}").contains("command connection failed"));
    }

    #[tokio::test]
    async fn connect_failure_surfaces_as_error() {
        let (connector, _broker, _publisher) = MemoryConnector::with_handles();
        connector.refuse_command();
        let supervisor = Supervisor::new(fast_config(), connector, Arc::new(MemorySink::new()));

        let err = supervise(supervisor).await.unwrap_err();
        assert!(err.to_string().contains("failed to start bot"));
    }
}
