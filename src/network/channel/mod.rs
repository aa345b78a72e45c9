//! In-process channel endpoints.
//!
//! Same semantics as the ZeroMQ endpoints without sockets: topic prefix
//! filtering on the subscriber side, reply-to-sender routing on the request
//! side. Used for embedded deployments and tests.

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    Envelope, NetworkError, ReplyHandler, RequestConnector, RequestEndpoint, Result,
    SubscriberEndpoint,
};

/// Address reported in errors for in-process endpoints.
pub const INPROC_ADDRESS: &str = "inproc://channel";

enum Delivery {
    Envelope(Envelope),
    Failure(String),
}

/// Create a connected publisher/subscriber pair.
///
/// An empty `topics` list subscribes to everything.
pub fn channel_pubsub(topics: Vec<String>) -> (ChannelPublisher, ChannelSubscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    let topics = topics.into_iter().map(Bytes::from).collect();
    (ChannelPublisher { tx }, ChannelSubscriber { rx, topics })
}

/// Producer half of an in-process publish channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelPublisher {
    /// Publish a two-part (topic, payload) message.
    pub fn publish(&self, topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Result<()> {
        self.publish_envelope(Envelope::new(topic, payload))
    }

    pub fn publish_envelope(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(Delivery::Envelope(envelope))
            .map_err(|_| NetworkError::Closed)
    }

    /// Make the subscriber's next receive fail with a transport error.
    pub fn inject_failure(&self, message: impl Into<String>) -> Result<()> {
        self.tx
            .send(Delivery::Failure(message.into()))
            .map_err(|_| NetworkError::Closed)
    }
}

/// Subscriber half of an in-process publish channel.
pub struct ChannelSubscriber {
    rx: mpsc::UnboundedReceiver<Delivery>,
    topics: Vec<Bytes>,
}

impl ChannelSubscriber {
    fn accepts(&self, envelope: &Envelope) -> bool {
        let first_frame = envelope.topic().unwrap_or(envelope.payload());
        self.topics.is_empty()
            || self
                .topics
                .iter()
                .any(|topic| first_frame.starts_with(topic))
    }
}

#[async_trait]
impl SubscriberEndpoint for ChannelSubscriber {
    async fn receive(&mut self) -> Envelope {
        loop {
            match self.rx.recv().await {
                Some(Delivery::Envelope(envelope)) => {
                    if self.accepts(&envelope) {
                        return envelope;
                    }
                }
                Some(Delivery::Failure(message)) => {
                    warn!(error = %message, "Failed to receive message");
                    return Envelope::empty();
                }
                // No publisher left: like a socket with no peers, nothing ever arrives.
                None => pending::<()>().await,
            }
        }
    }

    async fn close(mut self: Box<Self>) {
        self.rx.close();
        debug!("Channel subscriber closed");
    }
}

/// In-process backend for the control channel.
///
/// Every `connect` yields a dealer with its own reply queue, so replies are
/// routed back to the endpoint that sent the request.
pub struct ChannelRouter {
    handler: Arc<dyn ReplyHandler>,
    reachable: AtomicBool,
    connections: AtomicUsize,
}

impl ChannelRouter {
    pub fn new(handler: impl ReplyHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            reachable: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of endpoints opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestConnector for ChannelRouter {
    async fn connect(&self) -> Result<Box<dyn RequestEndpoint>> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(NetworkError::Connect {
                address: INPROC_ADDRESS.to_string(),
                message: "backend unreachable".to_string(),
            });
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChannelDealer::spawn(self.handler.clone())))
    }

    fn address(&self) -> &str {
        INPROC_ADDRESS
    }
}

/// Request endpoint paired with a `ChannelRouter` worker.
pub struct ChannelDealer {
    requests: mpsc::UnboundedSender<Envelope>,
    replies: mpsc::UnboundedReceiver<Bytes>,
    worker: JoinHandle<()>,
}

impl ChannelDealer {
    fn spawn(handler: Arc<dyn ReplyHandler>) -> Self {
        let (requests, mut request_rx) = mpsc::unbounded_channel::<Envelope>();
        let (reply_tx, replies) = mpsc::unbounded_channel();

        let worker = tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                if let Some(reply) = handler.handle(request).await {
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            requests,
            replies,
            worker,
        }
    }
}

#[async_trait]
impl RequestEndpoint for ChannelDealer {
    async fn send(&mut self, request: Envelope) -> Result<()> {
        self.requests.send(request).map_err(|_| NetworkError::Closed)
    }

    async fn receive(&mut self) -> Result<Envelope> {
        self.replies
            .recv()
            .await
            .map(Envelope::single)
            .ok_or(NetworkError::Closed)
    }

    async fn close(self: Box<Self>) {
        self.worker.abort();
        debug!("Channel dealer closed");
    }
}
