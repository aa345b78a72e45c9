//! Error types for the gateway client.

use std::time::Duration;

use tonic::{Code, Status};

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish connection to the gateway.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Transport-level error from tonic.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC error from the gateway.
    #[error("grpc error: {0}")]
    Grpc(Box<Status>),

    /// Failed to parse timestamp.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The call context was cancelled before a reply arrived.
    #[error("call cancelled")]
    Cancelled,

    /// The call context deadline passed before a reply arrived.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Grpc(Box::new(status))
    }
}

impl ClientError {
    /// Returns the error message.
    pub fn message(&self) -> String {
        match self {
            ClientError::Connection(msg) => msg.clone(),
            ClientError::Transport(e) => e.to_string(),
            ClientError::Grpc(s) => s.message().to_string(),
            ClientError::InvalidTimestamp(msg) => msg.clone(),
            ClientError::Cancelled | ClientError::Timeout(_) => self.to_string(),
        }
    }

    /// Returns the gRPC status code if this is a gRPC error.
    pub fn code(&self) -> Option<Code> {
        match self {
            ClientError::Grpc(s) => Some(s.code()),
            _ => None,
        }
    }

    /// Returns the underlying gRPC Status if this is a gRPC error.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Grpc(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if the gateway or its backend is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.code(), Some(Code::Unavailable))
    }

    /// Returns true if a deadline expired, locally or on the gateway.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.code(), Some(Code::DeadlineExceeded))
            || matches!(self, ClientError::Timeout(_))
    }

    /// Returns true if the call was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.code(), Some(Code::Cancelled)) || matches!(self, ClientError::Cancelled)
    }

    /// Returns true if this is an "invalid argument" error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.code(), Some(Code::InvalidArgument))
            || matches!(self, ClientError::InvalidTimestamp(_))
    }

    /// Returns true if this is a connection or transport error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ClientError::Connection(_) | ClientError::Transport(_))
    }
}
