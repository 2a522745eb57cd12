//! ZeroMQ transport.
//!
//! - `command` -- DEALER socket talking to the broker's ROUTER
//! - `broadcast` -- SUB socket connected to the distribution proxy's XPUB
//!
//! [`ZmqConnector`] opens both and is what the supervisor runs against.
//!
//! `zeromq` sockets retry a refused connect forever and never reconnect once
//! the peer goes away. Every connect here is therefore bounded by the
//! configured connect timeout, and each channel watches its socket monitor
//! for a dropped peer and rebuilds the socket on the next operation.

pub mod broadcast;
pub mod command;

use std::time::Duration;

use beacon_core::transport::Connector;
use beacon_types::config::{BotConfig, Framing};
use beacon_types::error::TransportError;
use futures::StreamExt;
use futures::channel::mpsc::Receiver;
use tracing::debug;
use zeromq::{Socket, SocketEvent, ZmqError};

pub use broadcast::ZmqBroadcastChannel;
pub use command::ZmqCommandChannel;

/// Monitor stream of one socket.
pub(crate) type SocketEvents = Receiver<SocketEvent>;

/// Opens ZeroMQ connections for the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct ZmqConnector {
    framing: Framing,
    connect_timeout: Duration,
}

impl ZmqConnector {
    pub fn new(framing: Framing, connect_timeout: Duration) -> Self {
        Self {
            framing,
            connect_timeout,
        }
    }
}

impl From<&BotConfig> for ZmqConnector {
    fn from(config: &BotConfig) -> Self {
        Self::new(config.framing, config.connect_timeout())
    }
}

impl Connector for ZmqConnector {
    type Command = ZmqCommandChannel;
    type Broadcast = ZmqBroadcastChannel;

    async fn connect_command(&self, endpoint: &str) -> Result<ZmqCommandChannel, TransportError> {
        ZmqCommandChannel::connect(endpoint, self.framing, self.connect_timeout).await
    }

    async fn connect_broadcast(
        &self,
        endpoint: &str,
        topic: &str,
    ) -> Result<ZmqBroadcastChannel, TransportError> {
        ZmqBroadcastChannel::connect(endpoint, topic, self.connect_timeout).await
    }
}

/// Connect `socket`, giving up after `timeout`.
pub(crate) async fn connect_socket<S: Socket>(
    socket: &mut S,
    endpoint: &str,
    timeout: Duration,
) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, socket.connect(endpoint)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(connect_error(endpoint, e)),
        Err(_) => Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: format!("no peer answered within {} ms", timeout.as_millis()),
        }),
    }
}

pub(crate) fn connect_error(endpoint: &str, err: ZmqError) -> TransportError {
    TransportError::Connect {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

/// Drain queued monitor events without waiting. Returns whether any of
/// them reported a dropped peer.
pub(crate) fn peer_dropped(events: &mut SocketEvents) -> bool {
    let mut dropped = false;
    while let Ok(Some(event)) = events.try_next() {
        dropped |= matches!(event, SocketEvent::Disconnected(..));
    }
    dropped
}

/// Resolve when the monitor reports a dropped peer. Never resolves once the
/// monitor stream has ended.
pub(crate) async fn peer_disconnected(events: &mut SocketEvents) {
    while let Some(event) = events.next().await {
        if matches!(event, SocketEvent::Disconnected(..)) {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Log errors reported while closing a socket. Nothing else can be done
/// with them at shutdown.
pub(crate) fn log_close_errors(endpoint: &str, errors: Vec<ZmqError>) {
    for error in errors {
        debug!(endpoint, %error, "error while closing socket");
    }
}
