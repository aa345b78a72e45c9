//! Per-call deadline and cancellation for unary gateway calls.
//!
//! Cancelling only stops the local wait. A request already sent may still
//! be processed by the backend; its reply is discarded.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::Request;

use crate::error::{ClientError, Result};

/// Controls one unary call: an optional deadline and a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the call with `ClientError::Timeout` after `timeout`.
    /// The deadline is also sent to the gateway as `grpc-timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Share cancellation with an existing token (e.g. a parent's child token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wrap `message` in a request carrying the deadline.
    pub(crate) fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some(timeout) = self.timeout {
            request.set_timeout(timeout);
        }
        request
    }

    /// Await `call` unless the context is cancelled or its deadline passes first.
    pub(crate) async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let bounded = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, call)
                    .await
                    .map_err(|_| ClientError::Timeout(timeout))?,
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            result = bounded => result,
        }
    }
}
