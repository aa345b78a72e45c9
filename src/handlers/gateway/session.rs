//! Live telemetry sessions, one per `ReceiveLivestream` call.
//!
//! The consumer's request stream only signals liveness; its messages are
//! never read for content. Each session polls it concurrently with the
//! shared subscriber and forwards decoded samples in receive order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use prost::Message;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tonic::Status;
use tracing::{debug, error, info, warn};

use super::errmsg;
use crate::config::{DecodeErrorPolicy, LivestreamConfig};
use crate::network::{Envelope, SubscriberEndpoint};
use crate::proto::gateway::{ReceiveLivestreamRequest, ReceiveLivestreamResponse};
use crate::proto::playback::Sample;

/// Subscriber shared by all sessions; `None` once the service shut down.
pub(crate) type SharedSubscriber = Arc<Mutex<Option<Box<dyn SubscriberEndpoint>>>>;

/// Sender half feeding one consumer's response stream.
pub(crate) type ResponseSender = mpsc::Sender<Result<ReceiveLivestreamResponse, Status>>;

/// Liveness of the consumer side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// The consumer stream reported errors; retried up to a bound.
    Draining { failures: u32 },
    Closed,
}

/// What the consumer's request stream produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    Message,
    EndOfStream,
    Error,
}

impl SessionState {
    /// Next state after `event`, closing once more than `max_failures`
    /// consecutive errors were seen.
    pub fn on_inbound(self, event: InboundEvent, max_failures: u32) -> Self {
        match (self, event) {
            (SessionState::Closed, _) => SessionState::Closed,
            (_, InboundEvent::EndOfStream) => SessionState::Closed,
            (_, InboundEvent::Message) => SessionState::Open,
            (SessionState::Open, InboundEvent::Error) => Self::draining(1, max_failures),
            (SessionState::Draining { failures }, InboundEvent::Error) => {
                Self::draining(failures.saturating_add(1), max_failures)
            }
        }
    }

    fn draining(failures: u32, max_failures: u32) -> Self {
        if failures > max_failures {
            SessionState::Closed
        } else {
            SessionState::Draining { failures }
        }
    }
}

/// Per-session tuning taken from `LivestreamConfig`.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub decode_errors: DecodeErrorPolicy,
    pub max_inbound_errors: u32,
    pub retry_delay: Duration,
    pub idle_backoff: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&LivestreamConfig::default())
    }
}

impl From<&LivestreamConfig> for SessionSettings {
    fn from(config: &LivestreamConfig) -> Self {
        Self {
            decode_errors: config.decode_errors,
            max_inbound_errors: config.max_inbound_errors,
            retry_delay: config.retry_delay(),
            idle_backoff: config.idle_backoff(),
        }
    }
}

/// Counts a live session for as long as it is held.
pub(crate) struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    pub(crate) fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Step {
    ConsumerGone,
    Inbound(Option<Result<ReceiveLivestreamRequest, Status>>),
    ResumeInbound,
    Envelope(Envelope),
    Shutdown,
}

enum Forwarded {
    Sent,
    Skipped,
    Stop,
}

/// Resolves once the service stops. A dropped sender counts as stopped.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn next_envelope(subscriber: &SharedSubscriber) -> Option<Envelope> {
    let mut endpoint = subscriber.lock().await;
    match endpoint.as_mut() {
        Some(endpoint) => Some(endpoint.receive().await),
        None => None,
    }
}

/// Drive one session until the consumer leaves, errors out, the service
/// stops, or a sample cannot be decoded under `DecodeErrorPolicy::Terminate`.
pub(crate) async fn run_session<S>(
    session: u64,
    subscriber: SharedSubscriber,
    mut inbound: S,
    tx: ResponseSender,
    mut stop: watch::Receiver<bool>,
    settings: SessionSettings,
) where
    S: Stream<Item = Result<ReceiveLivestreamRequest, Status>> + Unpin + Send,
{
    let mut state = SessionState::Open;
    let mut sent = 0u64;
    // Set while a failing consumer stream waits out its retry delay.
    let mut inbound_paused_until: Option<Instant> = None;
    info!(session, "Livestream session opened");

    while state != SessionState::Closed {
        let paused = inbound_paused_until.is_some();
        let resume_at = inbound_paused_until.unwrap_or_else(Instant::now);
        let step = tokio::select! {
            biased;
            _ = tx.closed() => Step::ConsumerGone,
            _ = stopped(&mut stop) => Step::Shutdown,
            envelope = next_envelope(&subscriber) => match envelope {
                Some(envelope) => Step::Envelope(envelope),
                None => Step::Shutdown,
            },
            _ = tokio::time::sleep_until(resume_at), if paused => Step::ResumeInbound,
            item = inbound.next(), if !paused => Step::Inbound(item),
        };

        match step {
            Step::ConsumerGone => {
                debug!(session, "Consumer dropped the response stream");
                state = SessionState::Closed;
            }
            Step::Inbound(item) => {
                let event = match item {
                    Some(Ok(_)) => InboundEvent::Message,
                    None => InboundEvent::EndOfStream,
                    Some(Err(status)) => {
                        warn!(session, error = %status, "Consumer stream error");
                        InboundEvent::Error
                    }
                };
                state = state.on_inbound(event, settings.max_inbound_errors);
                if let SessionState::Draining { failures } = state {
                    inbound_paused_until = Some(Instant::now() + settings.retry_delay * failures);
                }
            }
            Step::ResumeInbound => inbound_paused_until = None,
            Step::Shutdown => {
                let _ = tx
                    .send(Err(Status::unavailable(errmsg::SERVICE_STOPPED)))
                    .await;
                state = SessionState::Closed;
            }
            Step::Envelope(envelope) => match forward(session, envelope, &tx, &settings).await {
                Forwarded::Sent => sent += 1,
                Forwarded::Skipped => {}
                Forwarded::Stop => state = SessionState::Closed,
            },
        }
    }

    info!(session, sent, "Livestream session closed");
}

async fn forward(
    session: u64,
    envelope: Envelope,
    tx: &ResponseSender,
    settings: &SessionSettings,
) -> Forwarded {
    if envelope.is_empty() {
        debug!(session, "Skipping empty envelope");
        tokio::time::sleep(settings.idle_backoff).await;
        return Forwarded::Skipped;
    }

    let sample = match Sample::decode(envelope.payload()) {
        Ok(sample) => sample,
        Err(e) => {
            return match settings.decode_errors {
                DecodeErrorPolicy::Skip => {
                    warn!(session, error = %e, "Dropping undecodable sample");
                    Forwarded::Skipped
                }
                DecodeErrorPolicy::Terminate => {
                    error!(session, error = %e, "Undecodable sample, ending session");
                    let _ = tx
                        .send(Err(Status::data_loss(errmsg::UNDECODABLE_SAMPLE)))
                        .await;
                    Forwarded::Stop
                }
            };
        }
    };

    let response = ReceiveLivestreamResponse {
        sample: Some(sample),
    };
    if tx.send(Ok(response)).await.is_err() {
        debug!(session, "Consumer gone while sending sample");
        return Forwarded::Stop;
    }
    Forwarded::Sent
}
