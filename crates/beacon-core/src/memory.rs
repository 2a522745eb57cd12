//! In-memory transport backed by tokio channels.
//!
//! Each channel comes paired with a handle that plays the remote side: a
//! [`BrokerHandle`] that sees requests and scripts replies, and a
//! [`PublisherHandle`] that pushes frames. Dropping a handle tears the
//! connection down, which the channel reports as
//! [`TransportError::Terminated`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use beacon_types::error::TransportError;
use tokio::sync::mpsc;

use crate::transport::{BroadcastChannel, CommandChannel, Connector};

type ReplyResult = Result<Vec<u8>, TransportError>;
type FrameResult = Result<Vec<Vec<u8>>, TransportError>;

/// Create a connected command channel and its broker-side handle.
pub fn command_pair() -> (MemoryCommandChannel, BrokerHandle) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let send_failures = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));

    let channel = MemoryCommandChannel {
        requests: request_tx,
        replies: reply_rx,
        send_failures: Arc::clone(&send_failures),
        closed: Arc::clone(&closed),
    };
    let broker = BrokerHandle {
        requests: request_rx,
        replies: reply_tx,
        send_failures,
        closed,
    };
    (channel, broker)
}

/// Create a connected broadcast channel and its publisher-side handle.
pub fn broadcast_pair() -> (MemoryBroadcastChannel, PublisherHandle) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let topic = Arc::new(Mutex::new(None));

    let channel = MemoryBroadcastChannel {
        frames: frame_rx,
        closed: Arc::clone(&closed),
    };
    let publisher = PublisherHandle {
        frames: frame_tx,
        closed,
        topic,
    };
    (channel, publisher)
}

// ---------------------------------------------------------------------------
// Command side
// ---------------------------------------------------------------------------

/// Client end of an in-memory command connection.
#[derive(Debug)]
pub struct MemoryCommandChannel {
    requests: mpsc::UnboundedSender<Vec<u8>>,
    replies: mpsc::UnboundedReceiver<ReplyResult>,
    send_failures: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl CommandChannel for MemoryCommandChannel {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        let injected = self
            .send_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransportError::Send("injected send failure".to_string()));
        }
        self.requests
            .send(payload)
            .map_err(|_| TransportError::Terminated)
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.replies
            .recv()
            .await
            .unwrap_or(Err(TransportError::Terminated))
    }

    async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Broker end of an in-memory command connection.
#[derive(Debug)]
pub struct BrokerHandle {
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
    replies: mpsc::UnboundedSender<ReplyResult>,
    send_failures: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl BrokerHandle {
    /// Wait for the next request. `None` once the client side is gone.
    pub async fn next_request(&mut self) -> Option<Vec<u8>> {
        self.requests.recv().await
    }

    /// A request that already arrived, without waiting.
    pub fn try_next_request(&mut self) -> Option<Vec<u8>> {
        self.requests.try_recv().ok()
    }

    /// Queue a reply payload.
    pub fn reply(&self, payload: impl Into<Vec<u8>>) {
        let _ = self.replies.send(Ok(payload.into()));
    }

    /// Queue a JSON reply.
    pub fn reply_json(&self, value: &serde_json::Value) {
        self.reply(value.to_string());
    }

    /// Make the client's next `recv` fail with `error`.
    pub fn fail_receive(&self, error: TransportError) {
        let _ = self.replies.send(Err(error));
    }

    /// Make the client's next `n` sends fail before reaching the broker.
    pub fn fail_next_sends(&self, n: usize) {
        self.send_failures.store(n, Ordering::SeqCst);
    }

    /// Whether the client released the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Broadcast side
// ---------------------------------------------------------------------------

/// Subscriber end of an in-memory broadcast connection.
#[derive(Debug)]
pub struct MemoryBroadcastChannel {
    frames: mpsc::UnboundedReceiver<FrameResult>,
    closed: Arc<AtomicBool>,
}

impl BroadcastChannel for MemoryBroadcastChannel {
    async fn recv(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        self.frames
            .recv()
            .await
            .unwrap_or(Err(TransportError::Terminated))
    }

    async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Publisher end of an in-memory broadcast connection.
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    frames: mpsc::UnboundedSender<FrameResult>,
    closed: Arc<AtomicBool>,
    topic: Arc<Mutex<Option<String>>>,
}

impl PublisherHandle {
    /// Publish a frame made of text parts.
    pub fn publish(&self, parts: &[&str]) {
        self.publish_raw(parts.iter().map(|p| p.as_bytes().to_vec()).collect());
    }

    pub fn publish_raw(&self, parts: Vec<Vec<u8>>) {
        let _ = self.frames.send(Ok(parts));
    }

    /// Make the subscriber's next `recv` fail with `error`.
    pub fn fail(&self, error: TransportError) {
        let _ = self.frames.send(Err(error));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Topic the subscriber registered through [`MemoryConnector`], if any.
    pub fn subscribed_topic(&self) -> Option<String> {
        self.topic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Hands out one pre-built command and broadcast channel each.
///
/// A second connect (or a connect after [`MemoryConnector::refuse_command`] /
/// [`MemoryConnector::refuse_broadcast`]) fails with
/// [`TransportError::Connect`]. After [`MemoryConnector::stall_command`] /
/// [`MemoryConnector::stall_broadcast`] the connect never completes, like a
/// peer that is not listening yet.
#[derive(Debug)]
pub struct MemoryConnector {
    command: Mutex<Option<MemoryCommandChannel>>,
    broadcast: Mutex<Option<MemoryBroadcastChannel>>,
    topic: Arc<Mutex<Option<String>>>,
    stall_command: AtomicBool,
    stall_broadcast: AtomicBool,
}

impl MemoryConnector {
    pub fn with_handles() -> (Self, BrokerHandle, PublisherHandle) {
        let (command, broker) = command_pair();
        let (broadcast, publisher) = broadcast_pair();
        let connector = Self {
            command: Mutex::new(Some(command)),
            broadcast: Mutex::new(Some(broadcast)),
            topic: Arc::clone(&publisher.topic),
            stall_command: AtomicBool::new(false),
            stall_broadcast: AtomicBool::new(false),
        };
        (connector, broker, publisher)
    }

    pub fn refuse_command(&self) {
        self.command
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub fn refuse_broadcast(&self) {
        self.broadcast
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub fn stall_command(&self) {
        self.stall_command.store(true, Ordering::SeqCst);
    }

    pub fn stall_broadcast(&self) {
        self.stall_broadcast.store(true, Ordering::SeqCst);
    }
}

fn refused(endpoint: &str) -> TransportError {
    TransportError::Connect {
        endpoint: endpoint.to_string(),
        reason: "connection refused".to_string(),
    }
}

impl Connector for MemoryConnector {
    type Command = MemoryCommandChannel;
    type Broadcast = MemoryBroadcastChannel;

    async fn connect_command(&self, endpoint: &str) -> Result<MemoryCommandChannel, TransportError> {
        if self.stall_command.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.command
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| refused(endpoint))
    }

    async fn connect_broadcast(
        &self,
        endpoint: &str,
        topic: &str,
    ) -> Result<MemoryBroadcastChannel, TransportError> {
        if self.stall_broadcast.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let channel = self
            .broadcast
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| refused(endpoint))?;
        *self
            .topic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(topic.to_string());
        Ok(channel)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_reply_roundtrip() {
        let (mut channel, mut broker) = command_pair();
        channel.send(b"ping".to_vec()).await.unwrap();
        assert_eq!(broker.next_request().await.unwrap(), b"ping");
        broker.reply("pong");
        assert_eq!(channel.recv().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn injected_send_failures_are_consumed() {
        let (mut channel, mut broker) = command_pair();
        broker.fail_next_sends(1);
        assert!(matches!(
            channel.send(b"a".to_vec()).await,
            Err(TransportError::Send(_))
        ));
        channel.send(b"b".to_vec()).await.unwrap();
        assert_eq!(broker.next_request().await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn dropped_broker_means_terminated() {
        let (mut channel, broker) = command_pair();
        drop(broker);
        assert_eq!(channel.recv().await, Err(TransportError::Terminated));
        assert_eq!(
            channel.send(b"x".to_vec()).await,
            Err(TransportError::Terminated)
        );
    }

    #[tokio::test]
    async fn close_is_visible_to_both_handles() {
        let (channel, broker) = command_pair();
        let (sub, publisher) = broadcast_pair();
        channel.close().await;
        sub.close().await;
        assert!(broker.is_closed());
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn connector_hands_out_channels_once() {
        let (connector, _broker, publisher) = MemoryConnector::with_handles();
        connector.connect_command("mem://broker").await.unwrap();
        connector.connect_broadcast("mem://proxy", "ALERTA").await.unwrap();
        assert_eq!(publisher.subscribed_topic().as_deref(), Some("ALERTA"));

        let err = connector.connect_command("mem://broker").await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
