//! telemetry-gateway: gRPC bridge for live and recorded match telemetry
//!
//! ## Architecture
//! ```text
//! [Consumer] <-gRPC stream-- [telemetry-gateway] <--SUB-- [playback publisher]
//! [Consumer] --gRPC unary--> [telemetry-gateway] --DEALER--> [replay backend]
//! ```
//!
//! ## Configuration
//! - GATEWAY_CONFIG: path to a YAML config file
//! - GATEWAY_LIVESTREAM__ADDRESS: publisher endpoint (default: ipc:///tmp/playback.ipc)
//! - GATEWAY_LIVESTREAM__TOPICS: comma-separated topic prefixes (default: topic-playback)
//! - GATEWAY_CONTROL__ADDRESS: replay backend endpoint (default: ipc:///tmp/replay.ipc)
//! - GATEWAY_TRANSPORT__TCP__PORT: gRPC port (default: 50051)
//! - GATEWAY_TRANSPORT__TYPE: `tcp` or `uds` (socket at GATEWAY_TRANSPORT__UDS__PATH)
//! - GATEWAY_LOG: log filter (default: info)

use std::sync::Arc;

use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::{error, info};

use telemetry_gateway::config::Config;
use telemetry_gateway::handlers::gateway::BridgeService;
use telemetry_gateway::proto::gateway::gateway_service_server::GatewayServiceServer;
use telemetry_gateway::transport::{grpc_trace_layer, Listener};
use telemetry_gateway::utils::bootstrap::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting telemetry-gateway service");

    let config = Config::load(None).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let service = Arc::new(BridgeService::connect(&config).await.map_err(|e| {
        error!("Failed to connect messaging endpoints: {}", e);
        e
    })?);

    let listener = Listener::bind(&config.transport).await.map_err(|e| {
        error!("Failed to bind gRPC listener: {}", e);
        e
    })?;

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<GatewayServiceServer<BridgeService>>()
        .await;

    let router = Server::builder()
        .layer(grpc_trace_layer())
        .add_service(health_service)
        .add_service(GatewayServiceServer::from_arc(service.clone()));

    let served = listener.serve(router, shutdown_signal()).await;

    health_reporter
        .set_not_serving::<GatewayServiceServer<BridgeService>>()
        .await;
    service.shutdown().await;
    info!("telemetry-gateway stopped");

    Ok(served?)
}
