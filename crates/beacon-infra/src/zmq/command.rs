//! DEALER-backed command channel.
//!
//! A DEALER with no connected peer accepts sends that go nowhere and blocks
//! receives forever. The channel watches its monitor instead: a dropped
//! broker fails the pending receive, and the next send rebuilds the socket.

use std::time::Duration;

use beacon_core::transport::CommandChannel;
use beacon_types::config::Framing;
use beacon_types::error::TransportError;
use bytes::Bytes;
use tracing::{debug, info, warn};
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use super::{SocketEvents, connect_socket, log_close_errors, peer_disconnected, peer_dropped};

/// Request/reply connection to the broker over a DEALER socket.
pub struct ZmqCommandChannel {
    socket: DealerSocket,
    events: SocketEvents,
    framing: Framing,
    endpoint: String,
    connect_timeout: Duration,
    /// The broker went away; rebuild before the next send.
    stale: bool,
}

impl ZmqCommandChannel {
    pub async fn connect(
        endpoint: &str,
        framing: Framing,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (socket, events) = open(endpoint, connect_timeout).await?;
        debug!(endpoint, %framing, "dealer socket connected");
        Ok(Self {
            socket,
            events,
            framing,
            endpoint: endpoint.to_string(),
            connect_timeout,
            stale: false,
        })
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        let (socket, events) = open(&self.endpoint, self.connect_timeout).await?;
        let old = std::mem::replace(&mut self.socket, socket);
        self.events = events;
        self.stale = false;
        info!(endpoint = %self.endpoint, "reconnected to broker");
        log_close_errors(&self.endpoint, old.close().await);
        Ok(())
    }
}

async fn open(
    endpoint: &str,
    connect_timeout: Duration,
) -> Result<(DealerSocket, SocketEvents), TransportError> {
    let mut socket = DealerSocket::new();
    let events = socket.monitor();
    connect_socket(&mut socket, endpoint, connect_timeout).await?;
    Ok((socket, events))
}

/// Lay out one request as frames.
pub(crate) fn request_message(payload: Vec<u8>, framing: Framing) -> ZmqMessage {
    let mut message = ZmqMessage::from(payload);
    if framing == Framing::Delimited {
        message.push_front(Bytes::new());
    }
    message
}

/// Pick the reply payload out of the received frames.
///
/// Leading empty delimiter frames are skipped and the last remaining frame
/// is the payload. A reply without any non-delimiter frame yields an empty
/// payload, which fails to decode downstream.
pub(crate) fn reply_payload(frames: Vec<Bytes>) -> Vec<u8> {
    frames
        .into_iter()
        .skip_while(|frame| frame.is_empty())
        .last()
        .map(|frame| frame.to_vec())
        .unwrap_or_default()
}

impl CommandChannel for ZmqCommandChannel {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if peer_dropped(&mut self.events) {
            warn!(endpoint = %self.endpoint, "broker connection lost");
            self.stale = true;
        }
        if self.stale {
            self.reconnect()
                .await
                .map_err(|e| TransportError::Send(format!("broker unavailable: {e}")))?;
        }

        if let Err(e) = self
            .socket
            .send(request_message(payload, self.framing))
            .await
        {
            self.stale = true;
            return Err(TransportError::Send(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let received = tokio::select! {
            received = self.socket.recv() => received,
            _ = peer_disconnected(&mut self.events) => {
                self.stale = true;
                return Err(TransportError::Receive(
                    "broker disconnected before replying".to_string(),
                ));
            }
        };
        let message = received.map_err(|e| TransportError::Receive(e.to_string()))?;
        Ok(reply_payload(message.into_vec()))
    }

    async fn close(self) {
        let errors = self.socket.close().await;
        log_close_errors(&self.endpoint, errors);
        debug!(endpoint = %self.endpoint, "dealer socket closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
