//! Utility modules for the gateway.

pub mod bootstrap;
pub mod retry;
