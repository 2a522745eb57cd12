//! SUB-backed broadcast channel.
//!
//! ZeroMQ gives a SUB socket no acknowledgement that its subscription has
//! reached the publisher, so early messages may be lost. The broadcast
//! loop's settle delay covers that window.
//!
//! When the distribution proxy goes away the pending receive fails and the
//! next one rebuilds the socket and subscribes again.

use std::time::Duration;

use beacon_core::transport::BroadcastChannel;
use beacon_types::error::TransportError;
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

use super::{SocketEvents, connect_socket, log_close_errors, peer_disconnected};

/// Receive-only subscription to the distribution proxy.
pub struct ZmqBroadcastChannel {
    socket: SubSocket,
    events: SocketEvents,
    endpoint: String,
    topic: String,
    connect_timeout: Duration,
    /// The proxy went away; rebuild before the next receive.
    stale: bool,
}

impl ZmqBroadcastChannel {
    /// Connect and subscribe to `topic`. An empty topic receives everything.
    pub async fn connect(
        endpoint: &str,
        topic: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (socket, events) = open(endpoint, topic, connect_timeout).await?;
        debug!(endpoint, topic, "sub socket subscribed");
        Ok(Self {
            socket,
            events,
            endpoint: endpoint.to_string(),
            topic: topic.to_string(),
            connect_timeout,
            stale: false,
        })
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        let (socket, events) = open(&self.endpoint, &self.topic, self.connect_timeout).await?;
        let old = std::mem::replace(&mut self.socket, socket);
        self.events = events;
        self.stale = false;
        info!(endpoint = %self.endpoint, topic = %self.topic, "resubscribed to distributor");
        log_close_errors(&self.endpoint, old.close().await);
        Ok(())
    }
}

async fn open(
    endpoint: &str,
    topic: &str,
    connect_timeout: Duration,
) -> Result<(SubSocket, SocketEvents), TransportError> {
    let mut socket = SubSocket::new();
    let events = socket.monitor();
    connect_socket(&mut socket, endpoint, connect_timeout).await?;
    socket
        .subscribe(topic)
        .await
        .map_err(|e| TransportError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
    Ok((socket, events))
}

impl BroadcastChannel for ZmqBroadcastChannel {
    async fn recv(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        if self.stale {
            self.reconnect()
                .await
                .map_err(|e| TransportError::Receive(format!("distributor unavailable: {e}")))?;
        }

        let received = tokio::select! {
            received = self.socket.recv() => received,
            _ = peer_disconnected(&mut self.events) => {
                warn!(endpoint = %self.endpoint, "distributor connection lost");
                self.stale = true;
                return Err(TransportError::Receive("distributor disconnected".to_string()));
            }
        };
        let message = received.map_err(|e| TransportError::Receive(e.to_string()))?;
        Ok(message
            .into_vec()
            .into_iter()
            .map(|frame| frame.to_vec())
            .collect())
    }

    async fn close(self) {
        let errors = self.socket.close().await;
        log_close_errors(&self.endpoint, errors);
        debug!(endpoint = %self.endpoint, "sub socket closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
