//! ZeroMQ endpoints over the pure-Rust `zeromq` crate.
//!
//! - `ZmqSubscriber`: SUB socket (telemetry ingress)
//! - `ZmqDealer` / `ZmqDealerConnector`: DEALER socket (control channel)
//! - `ZmqPublisher`: PUB socket used by producers
//! - `ZmqReplier`: ROUTER socket serving a `ReplyHandler` (backend side)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info, warn};
use zeromq::{
    DealerSocket, PubSocket, RouterSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage,
};

use super::{
    Envelope, NetworkError, ReplyHandler, RequestConnector, RequestEndpoint, Result,
    SubscriberEndpoint,
};

fn connect_error(address: &str, e: zeromq::ZmqError) -> NetworkError {
    let address = address.to_string();
    let message = e.to_string();
    match e {
        zeromq::ZmqError::Endpoint(_) => NetworkError::InvalidAddress { address, message },
        _ => NetworkError::Connect { address, message },
    }
}

/// Bound a socket connect. `zeromq` keeps retrying a refused endpoint
/// internally, so an unreachable peer only surfaces here as elapsed time.
async fn connect_within<F>(address: &str, timeout: Duration, connect: F) -> Result<()>
where
    F: Future<Output = std::result::Result<(), zeromq::ZmqError>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result.map_err(|e| connect_error(address, e)),
        Err(_) => Err(NetworkError::Connect {
            address: address.to_string(),
            message: format!("no peer accepted within {timeout:?}"),
        }),
    }
}

fn transport_error(e: zeromq::ZmqError) -> NetworkError {
    NetworkError::Transport(e.to_string())
}

fn to_message(frames: Vec<Bytes>) -> Result<ZmqMessage> {
    let mut frames = frames.into_iter();
    let first = frames
        .next()
        .ok_or_else(|| NetworkError::Malformed("message without frames".to_string()))?;
    let mut message = ZmqMessage::from(first);
    for frame in frames {
        message.push_back(frame);
    }
    Ok(message)
}

fn log_close_errors(kind: &str, errors: Vec<zeromq::ZmqError>) {
    for e in errors {
        warn!(socket = kind, error = %e, "Error while closing socket");
    }
}

// ============================================================================
// Subscriber
// ============================================================================

/// SUB socket connected to a telemetry publisher.
pub struct ZmqSubscriber {
    socket: SubSocket,
    address: String,
}

impl ZmqSubscriber {
    /// Connect to `address` and subscribe to each topic prefix.
    ///
    /// An empty topic list subscribes to everything.
    pub async fn connect(address: &str, topics: &[String], timeout: Duration) -> Result<Self> {
        let mut socket = SubSocket::new();
        connect_within(address, timeout, socket.connect(address)).await?;

        if topics.is_empty() {
            socket
                .subscribe("")
                .await
                .map_err(|e| connect_error(address, e))?;
        }
        for topic in topics {
            socket
                .subscribe(topic)
                .await
                .map_err(|e| connect_error(address, e))?;
        }

        info!(address = %address, topics = ?topics, "Subscriber connected");
        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }
}

#[async_trait]
impl SubscriberEndpoint for ZmqSubscriber {
    async fn receive(&mut self) -> Envelope {
        match self.socket.recv().await {
            Ok(message) => Envelope::from_frames(message.into_vec()),
            Err(e) => {
                warn!(address = %self.address, error = %e, "Failed to receive message");
                Envelope::empty()
            }
        }
    }

    async fn close(self: Box<Self>) {
        let address = self.address;
        log_close_errors("sub", self.socket.close().await);
        info!(address = %address, "Subscriber closed");
    }
}

// ============================================================================
// Dealer
// ============================================================================

/// DEALER socket on the control channel.
pub struct ZmqDealer {
    socket: DealerSocket,
    address: String,
}

impl ZmqDealer {
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let mut socket = DealerSocket::new();
        connect_within(address, timeout, socket.connect(address)).await?;

        info!(address = %address, "Dealer connected");
        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }
}

#[async_trait]
impl RequestEndpoint for ZmqDealer {
    async fn send(&mut self, request: Envelope) -> Result<()> {
        let message = to_message(request.into_frames())?;
        self.socket.send(message).await.map_err(transport_error)
    }

    async fn receive(&mut self) -> Result<Envelope> {
        let message = self.socket.recv().await.map_err(transport_error)?;
        Ok(Envelope::from_frames(message.into_vec()))
    }

    async fn close(self: Box<Self>) {
        let address = self.address;
        log_close_errors("dealer", self.socket.close().await);
        info!(address = %address, "Dealer closed");
    }
}

/// Opens a fresh `ZmqDealer` for every connect.
#[derive(Debug, Clone)]
pub struct ZmqDealerConnector {
    address: String,
    connect_timeout: Duration,
}

impl ZmqDealerConnector {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl RequestConnector for ZmqDealerConnector {
    async fn connect(&self) -> Result<Box<dyn RequestEndpoint>> {
        let dealer = ZmqDealer::connect(&self.address, self.connect_timeout).await?;
        Ok(Box::new(dealer))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

// ============================================================================
// Peer roles (producers and backends)
// ============================================================================

/// PUB socket for telemetry producers.
pub struct ZmqPublisher {
    socket: PubSocket,
    endpoint: String,
}

impl ZmqPublisher {
    /// Bind to `address`. The resolved endpoint (e.g. the actual TCP port)
    /// is available from [`ZmqPublisher::endpoint`].
    pub async fn bind(address: &str) -> Result<Self> {
        let mut socket = PubSocket::new();
        let endpoint = socket
            .bind(address)
            .await
            .map_err(|e| connect_error(address, e))?;
        info!(endpoint = %endpoint, "Publisher bound");
        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn publish(&mut self, topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Result<()> {
        let message = to_message(Envelope::new(topic, payload).into_frames())?;
        self.socket.send(message).await.map_err(transport_error)
    }

    pub async fn close(self) {
        log_close_errors("pub", self.socket.close().await);
    }
}

/// ROUTER socket answering dealer requests with a `ReplyHandler`.
pub struct ZmqReplier {
    socket: RouterSocket,
    endpoint: String,
}

impl ZmqReplier {
    pub async fn bind(address: &str) -> Result<Self> {
        let mut socket = RouterSocket::new();
        let endpoint = socket
            .bind(address)
            .await
            .map_err(|e| connect_error(address, e))?;
        info!(endpoint = %endpoint, "Replier bound");
        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Answer requests until the socket fails.
    ///
    /// Requests are handled one at a time; the routing identity frame is
    /// stripped before the handler sees the request and restored on reply.
    pub async fn serve(mut self, handler: Arc<dyn ReplyHandler>) -> Result<()> {
        loop {
            let message = self.socket.recv().await.map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, "Replier receive failed");
                transport_error(e)
            })?;

            let mut frames = message.into_vec();
            if frames.len() < 2 {
                warn!(frames = frames.len(), "Dropping request without routing identity");
                continue;
            }
            let identity = frames.remove(0);
            let request = Envelope::from_frames(frames);

            let Some(reply) = handler.handle(request).await else {
                debug!("Handler produced no reply");
                continue;
            };

            let message = to_message(vec![identity, reply])?;
            if let Err(e) = self.socket.send(message).await {
                warn!(error = %e, "Failed to send reply");
            }
        }
    }
}
