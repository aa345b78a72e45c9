//! Serialized request/reply exchanges over a single request endpoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Envelope, NetworkError, RequestConnector, RequestEndpoint, Result};

/// Owns one request endpoint and enforces one exchange in flight.
///
/// Send and receive run as a single unit behind an async mutex, on a task of
/// their own: a caller that stops waiting does not abort the exchange, so the
/// reply is still consumed here and never handed to the next caller.
///
/// An endpoint that timed out or failed is closed and dropped. The next
/// exchange opens a fresh one through the connector, which discards any late
/// reply still addressed to the old socket. That reconnect is bounded by the
/// reply timeout as well, so an unreachable backend fails the call instead of
/// holding the channel.
#[derive(Clone)]
pub struct RequestChannel {
    endpoint: Arc<Mutex<Option<Box<dyn RequestEndpoint>>>>,
    connector: Arc<dyn RequestConnector>,
    reply_timeout: Duration,
}

impl RequestChannel {
    /// Connect through `connector`. Connection failure is returned to the caller.
    pub async fn connect(
        connector: Arc<dyn RequestConnector>,
        reply_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = connector.connect().await?;
        Ok(Self {
            endpoint: Arc::new(Mutex::new(Some(endpoint))),
            connector,
            reply_timeout,
        })
    }

    /// Create without connecting; the first exchange connects.
    pub fn lazy(connector: Arc<dyn RequestConnector>, reply_timeout: Duration) -> Self {
        Self {
            endpoint: Arc::new(Mutex::new(None)),
            connector,
            reply_timeout,
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Send `request` and wait for its reply.
    pub async fn exchange(&self, request: Envelope) -> Result<Envelope> {
        let slot = self.endpoint.clone();
        let connector = self.connector.clone();
        let reply_timeout = self.reply_timeout;

        tokio::spawn(async move {
            let mut slot = slot.lock().await;
            exchange_locked(&mut slot, connector.as_ref(), request, reply_timeout).await
        })
        .await
        .map_err(|e| NetworkError::Transport(format!("exchange task failed: {e}")))?
    }

    /// Release the endpoint. A later exchange reconnects.
    pub async fn close(&self) {
        let endpoint = self.endpoint.lock().await.take();
        if let Some(endpoint) = endpoint {
            endpoint.close().await;
            info!("Request endpoint closed");
        }
    }
}

async fn exchange_locked(
    slot: &mut Option<Box<dyn RequestEndpoint>>,
    connector: &dyn RequestConnector,
    request: Envelope,
    reply_timeout: Duration,
) -> Result<Envelope> {
    if slot.is_none() {
        debug!(address = %connector.address(), "Opening request endpoint");
        let endpoint = tokio::time::timeout(reply_timeout, connector.connect())
            .await
            .map_err(|_| NetworkError::Connect {
                address: connector.address().to_string(),
                message: format!("not connected within {reply_timeout:?}"),
            })??;
        *slot = Some(endpoint);
    }
    let Some(endpoint) = slot.as_mut() else {
        return Err(NetworkError::Closed);
    };

    let outcome = tokio::time::timeout(reply_timeout, async {
        endpoint.send(request).await?;
        endpoint.receive().await
    })
    .await
    .unwrap_or_else(|_| Err(NetworkError::Timeout(reply_timeout)));

    if let Err(e) = &outcome {
        warn!(error = %e, "Request exchange failed, discarding endpoint");
        if let Some(endpoint) = slot.take() {
            endpoint.close().await;
        }
    }

    outcome
}
