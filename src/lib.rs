//! Telemetry gateway.
//!
//! Bridges gRPC consumers to a ZeroMQ telemetry publisher (live samples)
//! and a ZeroMQ request backend (replay chunks, game events).

pub mod config;
pub mod handlers;
pub mod network;
pub mod transport;
pub mod utils;

pub mod proto {
    pub mod playback {
        tonic::include_proto!("playback");
    }

    pub mod gateway {
        tonic::include_proto!("gateway");
    }
}
