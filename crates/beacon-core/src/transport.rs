//! Transport ports for the two channels.
//!
//! The loops only see these traits. `beacon-infra` implements them over
//! ZeroMQ; [`crate::memory`] implements them over tokio channels for tests.
//!
//! A channel that was torn down on purpose must fail pending and future
//! operations with [`TransportError::Terminated`] so the loops can exit
//! cleanly instead of retrying.

use std::future::Future;

use beacon_types::error::TransportError;

/// A long-lived request/reply connection to the broker.
///
/// Callers keep at most one request outstanding: `send` is always followed
/// by `recv` before the next `send`.
pub trait CommandChannel: Send {
    /// Send one encoded request.
    fn send(&mut self, payload: Vec<u8>) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the reply payload to the last request.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// A long-lived, receive-only subscription to the distribution proxy.
pub trait BroadcastChannel: Send {
    /// Wait for the next multi-part frame.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<Vec<u8>>, TransportError>> + Send;

    /// Release the subscription.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Establishes both connections at startup.
pub trait Connector: Send + Sync {
    type Command: CommandChannel + 'static;
    type Broadcast: BroadcastChannel + 'static;

    fn connect_command(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Command, TransportError>> + Send;

    /// Connect and subscribe to `topic` (empty = every topic).
    fn connect_broadcast(
        &self,
        endpoint: &str,
        topic: &str,
    ) -> impl Future<Output = Result<Self::Broadcast, TransportError>> + Send;
}
