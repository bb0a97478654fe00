//! Ferry Server - HTTP front-end for the web relay.
//!
//! ## Endpoints
//!
//! - `POST /api/proxy/connect` - Create a session
//! - `POST /api/proxy/forward` - Forward a request (`X-VPN-Session` header)
//! - `GET /api/proxy/resource?url=&session=` - Fetch a resource and return its raw body
//! - `POST /api/proxy/disconnect` - Terminate a session (`X-VPN-Session` header)
//! - `GET /api/proxy/status` - Session status (`X-VPN-Session` header)
//! - `GET /browse?url=&session=` - New-window entry used by the interception script
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ferry_core::{ProxySettings, SessionRegistry};
//! use ferry_proxy::{ForwardingEngine, ReqwestTransport, ResponseCache};
//! use ferry_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = ProxySettings::default();
//!     let transport = ReqwestTransport::from_settings(&settings).unwrap();
//!     let engine = ForwardingEngine::new(
//!         SessionRegistry::new(),
//!         ResponseCache::new(),
//!         Arc::new(transport),
//!         Arc::new(settings),
//!     );
//!     let server = Server::new(ServerConfig::default(), AppState::new(engine)).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use handlers::{ClientAddress, SESSION_HEADER};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 48765;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48765).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/proxy/connect", post(handlers::connect))
        .route("/api/proxy/forward", post(handlers::forward))
        .route("/api/proxy/resource", get(handlers::resource))
        .route("/api/proxy/disconnect", post(handlers::disconnect))
        .route("/api/proxy/status", get(handlers::status))
        .route("/browse", get(handlers::resource))
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with the given configuration and state.
    pub fn new(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until the process ends.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` resolves, then drains connections.
    pub async fn run_until<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting Ferry relay on {}", self.addr);

        let listener = self.bind()?;

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Ferry relay stopped");
        Ok(())
    }

    fn bind(&self) -> std::result::Result<tokio::net::TcpListener, ServerError> {
        let bind_err = |e| ServerError::BindError(self.addr, e);

        let socket = Socket::new(Domain::for_address(self.addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;

        // Allow address reuse (helps with TIME_WAIT sockets after a restart)
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&self.addr.into()).map_err(bind_err)?;
        socket.listen(128).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;

        let std_listener: std::net::TcpListener = socket.into();
        tokio::net::TcpListener::from_std(std_listener).map_err(bind_err)
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
