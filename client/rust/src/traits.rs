//! Client trait for the gateway's unary calls.
//!
//! Implement this trait to create mock clients for testing or
//! alternative transport implementations.

use async_trait::async_trait;

use crate::context::CallContext;
use crate::entity::{Chunk, Event};
use crate::error::Result;

#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Fetch the recorded chunk starting at an RFC 3339 `timestamp`.
    async fn get_replay_chunk(&self, timestamp: &str, ctx: &CallContext) -> Result<Chunk>;

    /// Fetch the game events known to the replay backend.
    async fn get_game_events(&self, ctx: &CallContext) -> Result<Vec<Event>>;
}
