//! Consumer-side client for the telemetry gateway.
//!
//! Drives the gateway's live stream and republishes each frame to local
//! listeners as a notification event; exposes the unary replay calls with
//! per-call deadlines and cancellation.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use telemetry_gateway_client::{ChannelListener, GatewayClient, Notifier};
//!
//! async fn example() -> telemetry_gateway_client::Result<()> {
//!     let client = GatewayClient::connect("http://localhost:50051").await?;
//!
//!     let notifier = Notifier::new();
//!     let (listener, mut events) = ChannelListener::new();
//!     notifier.subscribe(listener);
//!
//!     let streaming = client.clone();
//!     tokio::spawn(async move { streaming.start_live_stream(&notifier).await });
//!     while let Some(event) = events.recv().await {
//!         println!("{}: {:?}", event.kind, event.frame());
//!     }
//!
//!     let chunk = client.get_replay_chunk("2024-01-15T10:30:00Z").await?;
//!     let events = client.get_game_events().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Mocking for Tests
//!
//! Implement `traits::GatewayApi` to substitute the unary calls.

pub mod client;
pub mod context;
pub mod convert;
pub mod entity;
pub mod error;
pub mod notify;
pub mod proto;
pub mod traits;

// Re-export main types at crate root
pub use client::{GatewayClient, DEFAULT_MAX_STREAM_ERRORS};
pub use context::CallContext;
pub use entity::{Chunk, Event, Frame};
pub use error::{ClientError, Result};
pub use notify::{ChannelListener, Listener, NotificationEvent, Notifier, Payload, SAMPLE_EVENT_KIND};
pub use traits::GatewayApi;

// Re-export helpers
pub use convert::{datetime_to_timestamp, parse_timestamp, timestamp_to_datetime};

pub use tokio_util::sync::CancellationToken;
