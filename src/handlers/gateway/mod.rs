//! Gateway service: bridges gRPC consumers to the telemetry and control channels.
//!
//! `ReceiveLivestream` forwards samples from a shared subscriber endpoint.
//! The unary calls are forwarded over a dealer-style request channel, one
//! exchange at a time.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use bytes::Bytes;
use futures::Stream;
use prost::Message;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use crate::config::{Config, LivestreamConfig, RequestFraming};
use crate::network::zmq::{ZmqDealerConnector, ZmqSubscriber};
use crate::network::{Envelope, NetworkError, RequestChannel, SubscriberEndpoint};
use crate::proto::gateway::gateway_service_server::GatewayService;
use crate::proto::gateway::{
    GetGameEventsRequest, GetGameEventsResponse, GetReplayChunkRequest, GetReplayChunkResponse,
    ReceiveLivestreamRequest, ReceiveLivestreamResponse,
};
use crate::utils::retry::{connection_backoff, is_retryable_connect};

pub mod errmsg;
mod session;

pub use session::{InboundEvent, SessionSettings, SessionState};

use session::{run_session, SessionGuard, SharedSubscriber};

/// Method name sent with `RequestFraming::Tagged` replay chunk requests.
pub const GET_REPLAY_CHUNK: &str = "GetReplayChunk";
/// Method name sent with `RequestFraming::Tagged` game event requests.
pub const GET_GAME_EVENTS: &str = "GetGameEvents";

/// Buffered samples per session before the subscriber is back-pressured.
const SESSION_BUFFER: usize = 16;

type LivestreamStream =
    Pin<Box<dyn Stream<Item = Result<ReceiveLivestreamResponse, Status>> + Send + 'static>>;

/// Bridge between gRPC consumers and the messaging backends.
///
/// Owns one subscriber endpoint for the whole service lifetime and one
/// request channel shared by all unary calls.
pub struct BridgeService {
    subscriber: SharedSubscriber,
    control: RequestChannel,
    framing: RequestFraming,
    settings: SessionSettings,
    stop: watch::Sender<bool>,
    sessions: Arc<AtomicUsize>,
    next_session: AtomicU64,
}

impl BridgeService {
    /// Create from already connected endpoints.
    pub fn new(subscriber: Box<dyn SubscriberEndpoint>, control: RequestChannel) -> Self {
        Self {
            subscriber: Arc::new(Mutex::new(Some(subscriber))),
            control,
            framing: RequestFraming::default(),
            settings: SessionSettings::default(),
            stop: watch::Sender::new(false),
            sessions: Arc::new(AtomicUsize::new(0)),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn with_livestream_config(mut self, config: &LivestreamConfig) -> Self {
        self.settings = SessionSettings::from(config);
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_framing(mut self, framing: RequestFraming) -> Self {
        self.framing = framing;
        self
    }

    /// Connect both ZeroMQ endpoints described by `config`.
    ///
    /// Each attempt is bounded by the endpoint's connect timeout. Failed
    /// attempts are retried with backoff until the configured retries run
    /// out; an invalid address fails immediately.
    pub async fn connect(config: &Config) -> Result<Self, NetworkError> {
        let livestream = &config.livestream;
        let subscriber = (move || {
            ZmqSubscriber::connect(
                &livestream.address,
                &livestream.topics,
                livestream.connect_timeout(),
            )
        })
            .retry(connection_backoff(livestream.connect_retries))
            .when(is_retryable_connect)
            .notify(|err: &NetworkError, dur: Duration| {
                warn!(
                    address = %livestream.address,
                    error = %err,
                    retry_after = ?dur,
                    "Subscriber connect failed, retrying"
                );
            })
            .await?;

        let connector = Arc::new(ZmqDealerConnector::new(
            config.control.address.clone(),
            config.control.connect_timeout(),
        ));
        let control = (move || {
            RequestChannel::connect(connector.clone(), config.control.reply_timeout())
        })
            .retry(connection_backoff(config.control.connect_retries))
            .when(is_retryable_connect)
            .notify(|err: &NetworkError, dur: Duration| {
                warn!(
                    address = %config.control.address,
                    error = %err,
                    retry_after = ?dur,
                    "Control channel connect failed, retrying"
                );
            })
            .await?;

        info!(
            livestream = %livestream.address,
            topics = ?livestream.topics,
            control = %config.control.address,
            "Gateway endpoints connected"
        );

        Ok(Self::new(Box::new(subscriber), control)
            .with_livestream_config(livestream)
            .with_framing(config.control.framing))
    }

    /// Number of streaming sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !*self.stop.borrow()
    }

    /// Release both endpoints. Running sessions end with UNAVAILABLE and
    /// later calls are rejected.
    pub async fn shutdown(&self) {
        if self.stop.send_replace(true) {
            return;
        }
        let subscriber = self.subscriber.lock().await.take();
        if let Some(subscriber) = subscriber {
            subscriber.close().await;
        }
        self.control.close().await;
        info!("Gateway endpoints released");
    }

    fn encode_request<Req: Message>(&self, method: &'static str, request: &Req) -> Envelope {
        let payload = Bytes::from(request.encode_to_vec());
        match self.framing {
            RequestFraming::Raw => Envelope::single(payload),
            RequestFraming::Tagged => Envelope::new(method, payload),
        }
    }

    /// Forward one request over the control channel and decode the reply.
    async fn forward_unary<Req, Resp>(
        &self,
        method: &'static str,
        request: &Req,
    ) -> Result<Resp, Status>
    where
        Req: Message,
        Resp: Message + Default,
    {
        if !self.is_running() {
            return Err(Status::unavailable(errmsg::SERVICE_STOPPED));
        }

        let reply = self
            .control
            .exchange(self.encode_request(method, request))
            .await
            .map_err(|e| map_network_error(method, e))?;

        Resp::decode(reply.payload()).map_err(|e| {
            error!(method, error = %e, "Failed to decode backend reply");
            Status::internal(errmsg::UNDECODABLE_REPLY)
        })
    }
}

/// Map a control channel failure to the status returned to the caller.
fn map_network_error(method: &str, error: NetworkError) -> Status {
    warn!(method, error = %error, "Control channel exchange failed");
    match error {
        NetworkError::Timeout(_) => Status::deadline_exceeded(errmsg::BACKEND_TIMEOUT),
        NetworkError::Malformed(_) => Status::internal(errmsg::UNDECODABLE_REPLY),
        NetworkError::Connect { .. }
        | NetworkError::InvalidAddress { .. }
        | NetworkError::Transport(_)
        | NetworkError::Closed => Status::unavailable(errmsg::BACKEND_UNAVAILABLE),
    }
}

#[tonic::async_trait]
impl GatewayService for BridgeService {
    type ReceiveLivestreamStream = LivestreamStream;

    async fn receive_livestream(
        &self,
        request: Request<Streaming<ReceiveLivestreamRequest>>,
    ) -> Result<Response<Self::ReceiveLivestreamStream>, Status> {
        if !self.is_running() {
            return Err(Status::unavailable(errmsg::SERVICE_STOPPED));
        }

        let session = self.next_session.fetch_add(1, Ordering::SeqCst);
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let guard = SessionGuard::enter(self.sessions.clone());
        let subscriber = self.subscriber.clone();
        let stop = self.stop.subscribe();
        let settings = self.settings;

        tokio::spawn(async move {
            let _guard = guard;
            run_session(session, subscriber, inbound, tx, stop, settings).await;
        });

        debug!(session, "Livestream session started");
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn get_replay_chunk(
        &self,
        request: Request<GetReplayChunkRequest>,
    ) -> Result<Response<GetReplayChunkResponse>, Status> {
        let request = request.into_inner();
        debug!(start = ?request.start_timestamp, "Forwarding replay chunk request");
        self.forward_unary(GET_REPLAY_CHUNK, &request)
            .await
            .map(Response::new)
    }

    async fn get_game_events(
        &self,
        request: Request<GetGameEventsRequest>,
    ) -> Result<Response<GetGameEventsResponse>, Status> {
        self.forward_unary(GET_GAME_EVENTS, &request.into_inner())
            .await
            .map(Response::new)
    }
}

#[cfg(test)]
mod tests;
