//! gRPC listener for the gateway.
//!
//! Consumers on other hosts reach the gateway over TCP; consumers on the
//! same host may use a Unix socket instead. [`Listener::bind`] claims the
//! address up front so startup fails before any consumer is accepted.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tonic::service::Routes;
use tonic::transport::server::Router;
use tower::{Layer, Service};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Which listener the gateway serves on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    #[default]
    Tcp,
    Uds,
}

/// Listener configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(rename = "type")]
    pub kind: ListenerKind,
    pub tcp: TcpConfig,
    pub uds: UdsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub host: String,
    /// Port 0 picks a free port; see [`Listener::endpoint`].
    pub port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

impl TcpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, TransportError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|source| TransportError::Address { address, source })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UdsConfig {
    /// Socket file. Parent directories are created on bind.
    pub path: PathBuf,
}

impl Default for UdsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/gateway/gateway.sock"),
        }
    }
}

/// Errors raised while binding or serving the gRPC listener.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid listen address {address}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] tonic::transport::Error),
}

/// Unix socket file owned by a listener. Removed when dropped.
pub struct SocketFile {
    path: PathBuf,
}

impl SocketFile {
    /// Take ownership of `path`: create its directory and remove a socket
    /// left behind by an earlier run.
    pub fn claim(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "Removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Socket file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove socket file")
            }
        }
    }
}

/// A bound gRPC listener.
pub enum Listener {
    Tcp(TcpListener),
    Uds {
        listener: UnixListener,
        socket: SocketFile,
    },
}

impl Listener {
    pub async fn bind(config: &TransportConfig) -> Result<Self, TransportError> {
        let listener = match config.kind {
            ListenerKind::Tcp => {
                let addr = config.tcp.socket_addr()?;
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| TransportError::Bind {
                        address: addr.to_string(),
                        source,
                    })?;
                Listener::Tcp(listener)
            }
            ListenerKind::Uds => {
                let path = &config.uds.path;
                let bind_error = |source: std::io::Error| TransportError::Bind {
                    address: path.display().to_string(),
                    source,
                };
                let socket = SocketFile::claim(path).map_err(bind_error)?;
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                Listener::Uds { listener, socket }
            }
        };

        info!(endpoint = %listener.endpoint(), "Gateway listening");
        Ok(listener)
    }

    /// Where consumers connect: `host:port` for TCP, the socket path for UDS.
    pub fn endpoint(&self) -> String {
        match self {
            Listener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default(),
            Listener::Uds { socket, .. } => socket.path().display().to_string(),
        }
    }

    /// Serve `router` until `signal` resolves. A UDS socket file is removed
    /// once serving ends.
    pub async fn serve<L, ResBody, F>(
        self,
        router: Router<L>,
        signal: F,
    ) -> Result<(), TransportError>
    where
        L: Layer<Routes> + Clone,
        L::Service: Service<http::Request<tonic::body::BoxBody>, Response = http::Response<ResBody>>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<http::Request<tonic::body::BoxBody>>>::Future: Send + 'static,
        <L::Service as Service<http::Request<tonic::body::BoxBody>>>::Error:
            Into<Box<dyn std::error::Error + Send + Sync>> + Send,
        ResBody: http_body::Body<Data = bytes::Bytes> + Send + 'static,
        ResBody::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: Future<Output = ()> + Send,
    {
        match self {
            Listener::Tcp(listener) => {
                router
                    .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
                    .await?
            }
            Listener::Uds {
                listener,
                socket: _socket,
            } => {
                router
                    .serve_with_incoming_shutdown(UnixListenerStream::new(listener), signal)
                    .await?
            }
        }
        info!("Gateway listener stopped");
        Ok(())
    }
}

/// Tower trace layer creating one span per RPC, keyed by method path and
/// the optional `x-consumer-id` header.
pub fn grpc_trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::GrpcErrorsAsFailures>,
    impl Fn(&http::Request<tonic::body::BoxBody>) -> tracing::Span + Clone,
> {
    TraceLayer::new_for_grpc().make_span_with(|request: &http::Request<tonic::body::BoxBody>| {
        let consumer = request
            .headers()
            .get("x-consumer-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let path = request.uri().path();
        tracing::info_span!("grpc", %consumer, %path)
    })
}
