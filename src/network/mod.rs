//! Messaging endpoints for the telemetry and control channels.
//!
//! This module contains:
//! - `Envelope`: one receive unit (optional topic + payload)
//! - `SubscriberEndpoint`: receive-only publish/subscribe endpoint
//! - `RequestEndpoint` / `RequestConnector`: dealer-style request endpoint
//! - `RequestChannel`: one-in-flight serialization around a request endpoint
//! - Implementations: ZeroMQ (`zmq`), in-process channels (`channel`)

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

mod envelope;
mod request_channel;

pub mod channel;
pub mod zmq;

pub use envelope::Envelope;
pub use request_channel::RequestChannel;

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur on the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Connection to {address} failed: {message}")]
    Connect { address: String, message: String },

    #[error("Invalid address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Endpoint closed")]
    Closed,

    #[error("Malformed message: {0}")]
    Malformed(String),
}

// ============================================================================
// Traits
// ============================================================================

/// Receive-only endpoint connected to a publisher and filtered by topic.
///
/// Owned by the bridge service for its whole lifetime. Never replies.
#[async_trait]
pub trait SubscriberEndpoint: Send {
    /// Wait for the next envelope.
    ///
    /// Transport errors are logged and reported as the empty sentinel, so
    /// callers treat them as "no message this cycle".
    async fn receive(&mut self) -> Envelope;

    /// Release the underlying socket.
    async fn close(self: Box<Self>);
}

/// Request endpoint supporting exactly one in-flight exchange.
///
/// Every `send` must be followed by one `receive` before the endpoint is
/// reused. Routing of replies back to this endpoint is done by the transport,
/// so no request identifier is carried.
#[async_trait]
pub trait RequestEndpoint: Send {
    /// Write one request. Does not wait for any acknowledgement.
    async fn send(&mut self, request: Envelope) -> Result<()>;

    /// Wait for the reply to the most recent `send`.
    async fn receive(&mut self) -> Result<Envelope>;

    /// Release the underlying socket.
    async fn close(self: Box<Self>);
}

/// Opens request endpoints. Used for the initial connection and for
/// reconnecting after an endpoint had to be discarded.
#[async_trait]
pub trait RequestConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RequestEndpoint>>;

    /// Endpoint address, for errors and logs.
    fn address(&self) -> &str;
}

/// Backend side of the control channel: turns one request into one reply.
///
/// Returning `None` sends no reply.
pub trait ReplyHandler: Send + Sync {
    fn handle(&self, request: Envelope) -> BoxFuture<'static, Option<Bytes>>;
}

impl<F, Fut> ReplyHandler for F
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Option<Bytes>> + Send + 'static,
{
    fn handle(&self, request: Envelope) -> BoxFuture<'static, Option<Bytes>> {
        Box::pin(self(request))
    }
}
