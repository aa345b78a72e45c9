//! Generated protobuf types shared with the gateway.

pub mod playback {
    tonic::include_proto!("playback");
}

pub mod gateway {
    tonic::include_proto!("gateway");
}
