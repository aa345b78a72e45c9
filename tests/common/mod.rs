//! Shared utilities for integration tests.
//!
//! Runs a `BridgeService` behind a real tonic server on loopback and
//! connects the consumer-side client to it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use telemetry_gateway::handlers::gateway::{BridgeService, SessionSettings};
use telemetry_gateway::network::channel::{channel_pubsub, ChannelPublisher, ChannelRouter};
use telemetry_gateway::network::{RequestChannel, RequestConnector};
use telemetry_gateway::proto::gateway::gateway_service_server::GatewayServiceServer;
use telemetry_gateway::proto::playback::Sample;
use telemetry_gateway_client::{GatewayClient, NotificationEvent};

pub const TOPIC: &str = "topic-playback";

/// Serve `service` on an ephemeral loopback port.
pub async fn serve(service: Arc<BridgeService>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(GatewayServiceServer::from_arc(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

pub async fn connect_client(addr: SocketAddr) -> GatewayClient {
    GatewayClient::connect(&addr.to_string()).await.unwrap()
}

/// Channel-backed gateway plus a connected client.
pub struct Bridge {
    pub publisher: ChannelPublisher,
    pub router: Arc<ChannelRouter>,
    pub service: Arc<BridgeService>,
    pub client: GatewayClient,
}

pub async fn start_bridge(router: ChannelRouter, reply_timeout: Duration) -> Bridge {
    let (publisher, subscriber) = channel_pubsub(vec![TOPIC.to_string()]);
    let router = Arc::new(router);
    let connector: Arc<dyn RequestConnector> = router.clone();
    let control = RequestChannel::lazy(connector, reply_timeout);
    let settings = SessionSettings {
        retry_delay: Duration::from_millis(5),
        idle_backoff: Duration::from_millis(1),
        ..SessionSettings::default()
    };
    let service = Arc::new(BridgeService::new(Box::new(subscriber), control).with_settings(settings));

    let addr = serve(service.clone()).await;
    let client = connect_client(addr).await;

    Bridge {
        publisher,
        router,
        service,
        client,
    }
}

pub fn encoded_sample(label: &str) -> Vec<u8> {
    Sample {
        detection: label.as_bytes().to_vec(),
        ..Default::default()
    }
    .encode_to_vec()
}

pub fn detection(event: &NotificationEvent) -> String {
    let frame = event.frame().expect("event without frame");
    String::from_utf8_lossy(&frame.detection).into_owned()
}
