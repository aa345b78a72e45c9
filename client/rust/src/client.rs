//! Gateway client wrapping the tonic gRPC client.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::convert::parse_timestamp;
use crate::entity::{Chunk, Event, Frame};
use crate::error::{ClientError, Result};
use crate::notify::{NotificationEvent, Notifier};
use crate::proto::gateway::gateway_service_client::GatewayServiceClient as TonicGatewayClient;
use crate::proto::gateway::{GetGameEventsRequest, GetReplayChunkRequest, ReceiveLivestreamRequest};
use crate::traits;

/// Consecutive stream receive errors absorbed before giving up.
pub const DEFAULT_MAX_STREAM_ERRORS: u32 = 5;

/// Create a gRPC channel from an endpoint string.
///
/// Supports both TCP (host:port or http://host:port) and Unix Domain Sockets.
/// UDS paths are detected by leading '/' or './' and use a custom connector.
async fn create_channel(endpoint: &str) -> Result<Channel> {
    let uds_path = if endpoint.starts_with('/') || endpoint.starts_with("./") {
        Some(endpoint.to_string())
    } else {
        endpoint.strip_prefix("unix://").map(str::to_string)
    };

    if let Some(path) = uds_path {
        // The URI doesn't matter for UDS, but tonic requires a valid one
        let channel = Endpoint::try_from("http://[::]:50051")
            .map_err(|e| ClientError::Connection(e.to_string()))?
            .connect_with_connector(tower::service_fn(move |_: Uri| {
                let path = path.clone();
                async move {
                    tokio::net::UnixStream::connect(path)
                        .await
                        .map(hyper_util::rt::TokioIo::new)
                }
            }))
            .await?;
        Ok(channel)
    } else {
        let uri = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        let channel = Channel::from_shared(uri)
            .map_err(|e| ClientError::Connection(e.to_string()))?
            .connect()
            .await?;
        Ok(channel)
    }
}

/// Consumer-side client of the telemetry gateway.
#[derive(Clone)]
pub struct GatewayClient {
    inner: TonicGatewayClient<Channel>,
    max_stream_errors: u32,
}

impl GatewayClient {
    /// Connect to a gateway at the given endpoint.
    ///
    /// Supports both TCP (host:port) and Unix Domain Sockets (file paths).
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let channel = create_channel(endpoint).await?;
        info!(endpoint, "Connected to gateway");
        Ok(Self::from_channel(channel))
    }

    /// Connect using an endpoint from environment variable with fallback.
    pub async fn from_env(env_var: &str, default: &str) -> Result<Self> {
        let endpoint = std::env::var(env_var).unwrap_or_else(|_| default.to_string());
        Self::connect(&endpoint).await
    }

    /// Create a client from an existing channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            inner: TonicGatewayClient::new(channel),
            max_stream_errors: DEFAULT_MAX_STREAM_ERRORS,
        }
    }

    pub fn with_max_stream_errors(mut self, max_stream_errors: u32) -> Self {
        self.max_stream_errors = max_stream_errors;
        self
    }

    /// Release this handle's connection.
    ///
    /// Clones share the connection; it closes once the last one is gone.
    pub fn close(self) {
        debug!("Gateway client closed");
    }

    /// Receive the live stream and dispatch each frame to `notifier`
    /// as a `"sample"` event.
    ///
    /// Returns `Ok(())` when the gateway ends the stream. Receive errors are
    /// logged and skipped until `max_stream_errors` arrive in a row, or until
    /// the gateway ends the stream right after one; that error is returned.
    pub async fn start_live_stream(&self, notifier: &Notifier) -> Result<()> {
        let (tx, rx) = mpsc::channel(1);
        tx.send(ReceiveLivestreamRequest {})
            .await
            .map_err(|_| ClientError::Connection("livestream request closed".to_string()))?;

        let mut stream = self
            .inner
            .clone()
            .receive_livestream(ReceiverStream::new(rx))
            .await?
            .into_inner();
        info!("Livestream started");

        let mut consecutive_errors = 0u32;
        let mut last_error = None;
        let mut delivered = 0u64;

        loop {
            match stream.message().await {
                Ok(Some(response)) => {
                    consecutive_errors = 0;
                    last_error = None;

                    let Some(sample) = response.sample else {
                        debug!("Skipping response without sample");
                        continue;
                    };
                    let frame = Frame::from(sample);
                    if frame.is_empty() {
                        debug!("Skipping empty sample");
                        continue;
                    }
                    notifier.notify(&NotificationEvent::sample(frame));
                    delivered += 1;
                }
                Ok(None) => break,
                Err(status) => {
                    consecutive_errors += 1;
                    warn!(
                        code = ?status.code(),
                        error = %status.message(),
                        consecutive_errors,
                        "Livestream receive failed"
                    );
                    if consecutive_errors >= self.max_stream_errors {
                        return Err(status.into());
                    }
                    last_error = Some(status);
                }
            }
        }

        drop(tx);
        info!(delivered, "Livestream ended");
        match last_error {
            Some(status) => Err(status.into()),
            None => Ok(()),
        }
    }

    /// Fetch the recorded chunk starting at an RFC 3339 `timestamp`.
    pub async fn get_replay_chunk(&self, timestamp: &str) -> Result<Chunk> {
        self.get_replay_chunk_with_context(timestamp, &CallContext::new())
            .await
    }

    pub async fn get_replay_chunk_with_context(
        &self,
        timestamp: &str,
        ctx: &CallContext,
    ) -> Result<Chunk> {
        let request = GetReplayChunkRequest {
            start_timestamp: Some(parse_timestamp(timestamp)?),
        };
        let mut client = self.inner.clone();
        let response = ctx
            .run(async move {
                let response = client.get_replay_chunk(ctx.request(request)).await?;
                Ok::<_, ClientError>(response.into_inner())
            })
            .await?;

        Ok(response.replay_chunk.map(Chunk::from).unwrap_or_default())
    }

    /// Fetch the game events known to the replay backend.
    pub async fn get_game_events(&self) -> Result<Vec<Event>> {
        self.get_game_events_with_context(&CallContext::new()).await
    }

    pub async fn get_game_events_with_context(&self, ctx: &CallContext) -> Result<Vec<Event>> {
        let mut client = self.inner.clone();
        let response = ctx
            .run(async move {
                let response = client
                    .get_game_events(ctx.request(GetGameEventsRequest {}))
                    .await?;
                Ok::<_, ClientError>(response.into_inner())
            })
            .await?;

        Ok(response.game_events.into_iter().map(Event::from).collect())
    }
}

#[async_trait]
impl traits::GatewayApi for GatewayClient {
    async fn get_replay_chunk(&self, timestamp: &str, ctx: &CallContext) -> Result<Chunk> {
        self.get_replay_chunk_with_context(timestamp, ctx).await
    }

    async fn get_game_events(&self, ctx: &CallContext) -> Result<Vec<Event>> {
        self.get_game_events_with_context(ctx).await
    }
}
