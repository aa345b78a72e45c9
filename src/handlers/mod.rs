//! RPC handlers exposed by the gateway binary.

pub mod gateway;
