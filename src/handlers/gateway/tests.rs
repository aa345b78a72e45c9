use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::{Channel, Server};
use tonic::Code;

use super::*;
use crate::config::DecodeErrorPolicy;
use crate::network::channel::{channel_pubsub, ChannelPublisher, ChannelRouter};
use crate::network::RequestConnector;
use crate::proto::gateway::gateway_service_client::GatewayServiceClient;
use crate::proto::gateway::gateway_service_server::GatewayServiceServer;
use crate::proto::playback::{GameEvent, ReplayChunk, Sample};

const TOPIC: &str = "topic-playback";

fn sample(label: &str) -> Sample {
    Sample {
        first_timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_000,
            nanos: 0,
        }),
        timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_001,
            nanos: 500,
        }),
        detection: label.as_bytes().to_vec(),
        referee: Vec::new(),
    }
}

/// Backend that answers replay chunk requests with one sample starting at
/// the requested timestamp.
async fn replay_backend(request: Envelope) -> Option<Bytes> {
    let request = GetReplayChunkRequest::decode(request.payload()).ok()?;
    let response = GetReplayChunkResponse {
        replay_chunk: Some(ReplayChunk {
            start_timestamp: request.start_timestamp,
            samples: vec![sample("replayed")],
        }),
    };
    Some(response.encode_to_vec().into())
}

/// Backend that echoes the request's first frame back as a game event kind.
async fn tagging_backend(request: Envelope) -> Option<Bytes> {
    let kind = request
        .topic()
        .map(|t| String::from_utf8_lossy(t).into_owned())
        .unwrap_or_default();
    let response = GetGameEventsResponse {
        game_events: vec![GameEvent {
            timestamp: None,
            kind,
            description: "kickoff".to_string(),
        }],
    };
    Some(response.encode_to_vec().into())
}

async fn silent_backend(_request: Envelope) -> Option<Bytes> {
    None
}

struct Harness {
    publisher: ChannelPublisher,
    router: Arc<ChannelRouter>,
    service: Arc<BridgeService>,
    client: GatewayServiceClient<Channel>,
}

async fn start(
    router: ChannelRouter,
    settings: SessionSettings,
    framing: RequestFraming,
) -> Harness {
    let (publisher, subscriber) = channel_pubsub(vec![TOPIC.to_string()]);
    let router = Arc::new(router);
    let connector: Arc<dyn RequestConnector> = router.clone();
    let control = RequestChannel::lazy(connector, Duration::from_millis(200));
    let service = Arc::new(
        BridgeService::new(Box::new(subscriber), control)
            .with_settings(settings)
            .with_framing(framing),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServiceServer::from_arc(service.clone());
    tokio::spawn(async move {
        Server::builder()
            .add_service(server)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = GatewayServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    Harness {
        publisher,
        router,
        service,
        client,
    }
}

fn fast_settings(decode_errors: DecodeErrorPolicy) -> SessionSettings {
    SessionSettings {
        decode_errors,
        max_inbound_errors: 3,
        retry_delay: Duration::from_millis(5),
        idle_backoff: Duration::from_millis(1),
    }
}

async fn start_default(router: ChannelRouter) -> Harness {
    start(
        router,
        fast_settings(DecodeErrorPolicy::Terminate),
        RequestFraming::Raw,
    )
    .await
}

type Session = (
    mpsc::Sender<ReceiveLivestreamRequest>,
    Streaming<ReceiveLivestreamResponse>,
);

async fn open_session(client: &mut GatewayServiceClient<Channel>) -> Result<Session, Status> {
    let (tx, rx) = mpsc::channel(1);
    let stream = client
        .receive_livestream(ReceiverStream::new(rx))
        .await?
        .into_inner();
    Ok((tx, stream))
}

async fn next_sample(stream: &mut Streaming<ReceiveLivestreamResponse>) -> Sample {
    tokio::time::timeout(Duration::from_secs(2), stream.message())
        .await
        .expect("timed out waiting for sample")
        .expect("stream failed")
        .expect("stream ended")
        .sample
        .expect("response without sample")
}

async fn wait_for_sessions(service: &BridgeService, expected: usize) {
    for _ in 0..100 {
        if service.active_sessions() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} active sessions, found {}",
        service.active_sessions()
    );
}

#[tokio::test]
async fn test_livestream_forwards_published_sample() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;
    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();

    h.publisher
        .publish(TOPIC, sample("sample-1").encode_to_vec())
        .unwrap();

    assert_eq!(next_sample(&mut stream).await, sample("sample-1"));
    assert_eq!(h.service.active_sessions(), 1);
}

#[tokio::test]
async fn test_livestream_skips_empty_and_failed_receives_in_order() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;
    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();

    h.publisher
        .publish(TOPIC, sample("first").encode_to_vec())
        .unwrap();
    h.publisher.publish(TOPIC, Bytes::new()).unwrap();
    h.publisher.inject_failure("connection reset").unwrap();
    h.publisher
        .publish(TOPIC, sample("second").encode_to_vec())
        .unwrap();

    assert_eq!(next_sample(&mut stream).await.detection, b"first");
    assert_eq!(next_sample(&mut stream).await.detection, b"second");
}

#[tokio::test]
async fn test_livestream_ignores_other_topics() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;
    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();

    h.publisher
        .publish("topic-other", sample("filtered").encode_to_vec())
        .unwrap();
    h.publisher
        .publish(TOPIC, sample("wanted").encode_to_vec())
        .unwrap();

    assert_eq!(next_sample(&mut stream).await.detection, b"wanted");
}

#[tokio::test]
async fn test_livestream_decode_failure_ends_session_with_data_loss() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;
    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();

    h.publisher.publish(TOPIC, vec![0x0a, 0xff]).unwrap();

    let status = stream.message().await.unwrap_err();
    assert_eq!(status.code(), Code::DataLoss);
    wait_for_sessions(&h.service, 0).await;
}

#[tokio::test]
async fn test_livestream_skip_policy_drops_undecodable_samples() {
    let mut h = start(
        ChannelRouter::new(silent_backend),
        fast_settings(DecodeErrorPolicy::Skip),
        RequestFraming::Raw,
    )
    .await;
    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();

    h.publisher.publish(TOPIC, vec![0x0a, 0xff]).unwrap();
    h.publisher
        .publish(TOPIC, sample("valid").encode_to_vec())
        .unwrap();

    assert_eq!(next_sample(&mut stream).await.detection, b"valid");
}

#[tokio::test]
async fn test_closing_consumer_ends_session_and_service_keeps_serving() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;

    let (tx, stream) = open_session(&mut h.client).await.unwrap();
    wait_for_sessions(&h.service, 1).await;
    drop(tx);
    drop(stream);
    wait_for_sessions(&h.service, 0).await;

    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();
    h.publisher
        .publish(TOPIC, sample("after").encode_to_vec())
        .unwrap();
    assert_eq!(next_sample(&mut stream).await.detection, b"after");
}

#[tokio::test]
async fn test_end_of_consumer_stream_ends_session() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;

    let (tx, mut stream) = open_session(&mut h.client).await.unwrap();
    wait_for_sessions(&h.service, 1).await;
    drop(tx);

    let end = tokio::time::timeout(Duration::from_secs(2), stream.message())
        .await
        .unwrap()
        .unwrap();
    assert!(end.is_none());
    wait_for_sessions(&h.service, 0).await;
}

#[tokio::test]
async fn test_get_replay_chunk_round_trip_matches_backend() {
    let mut h = start_default(ChannelRouter::new(replay_backend)).await;
    let request = GetReplayChunkRequest {
        start_timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_100,
            nanos: 0,
        }),
    };

    let expected = replay_backend(Envelope::single(request.encode_to_vec()))
        .await
        .unwrap();
    let expected = GetReplayChunkResponse::decode(expected).unwrap();

    let response = h
        .client
        .get_replay_chunk(request)
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response, expected);
}

#[tokio::test]
async fn test_tagged_framing_carries_method_name() {
    let mut h = start(
        ChannelRouter::new(tagging_backend),
        fast_settings(DecodeErrorPolicy::Terminate),
        RequestFraming::Tagged,
    )
    .await;

    let response = h
        .client
        .get_game_events(GetGameEventsRequest {})
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.game_events.len(), 1);
    assert_eq!(response.game_events[0].kind, GET_GAME_EVENTS);
}

#[tokio::test]
async fn test_raw_framing_sends_single_frame() {
    let mut h = start_default(ChannelRouter::new(tagging_backend)).await;

    let response = h
        .client
        .get_game_events(GetGameEventsRequest {})
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.game_events[0].kind, "");
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let mut h = start_default(ChannelRouter::new(replay_backend)).await;
    h.router.set_reachable(false);

    let status = h
        .client
        .get_game_events(GetGameEventsRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_backend_without_reply_is_deadline_exceeded() {
    let mut h = start_default(ChannelRouter::new(silent_backend)).await;

    let status = h
        .client
        .get_replay_chunk(GetReplayChunkRequest::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_undecodable_reply_is_internal() {
    let garbage = |_request: Envelope| async { Some(Bytes::from_static(&[0x0a, 0xff])) };
    let mut h = start_default(ChannelRouter::new(garbage)).await;

    let status = h
        .client
        .get_game_events(GetGameEventsRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
}

#[tokio::test]
async fn test_shutdown_ends_sessions_and_rejects_new_calls() {
    let mut h = start_default(ChannelRouter::new(replay_backend)).await;
    let (_tx, mut stream) = open_session(&mut h.client).await.unwrap();
    wait_for_sessions(&h.service, 1).await;

    tokio::time::timeout(Duration::from_secs(2), h.service.shutdown())
        .await
        .unwrap();
    assert!(!h.service.is_running());

    let status = stream.message().await.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
    wait_for_sessions(&h.service, 0).await;

    let Err(status) = open_session(&mut h.client).await else {
        panic!("session opened after shutdown");
    };
    assert_eq!(status.code(), Code::Unavailable);

    let status = h
        .client
        .get_replay_chunk(GetReplayChunkRequest::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}

#[test]
fn test_map_network_error() {
    let cases = [
        (NetworkError::Timeout(Duration::from_secs(1)), Code::DeadlineExceeded),
        (
            NetworkError::Connect {
                address: "ipc:///tmp/replay.ipc".to_string(),
                message: "refused".to_string(),
            },
            Code::Unavailable,
        ),
        (NetworkError::Transport("reset".to_string()), Code::Unavailable),
        (NetworkError::Closed, Code::Unavailable),
        (NetworkError::Malformed("no frames".to_string()), Code::Internal),
    ];
    for (error, code) in cases {
        assert_eq!(map_network_error(GET_GAME_EVENTS, error).code(), code);
    }
}
