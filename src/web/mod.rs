//! Control-plane HTTP interface
//!
//! Thin axum handlers in front of [`StreamSupervisor`] and [`AuthStore`].
//!
//! # Layout
//!
//! - **Public routes**: health, pairing code, pairing exchange, OpenAPI document
//! - **Protected routes**: stream control, status, session listing, the event
//!   stream and artifact serving, all behind the bearer-token middleware
//! - **Layers**: request logging everywhere, CORS outermost so preflights
//!   never reach the auth check

use anyhow::Result;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::{CorsConfig, WebConfig};
use crate::services::{AuthStore, StreamSupervisor};

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod responses;

pub use extractors::ValidatedJson;
pub use responses::{ApiResponse, handle_error, handle_result};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<StreamSupervisor>,
    pub auth: Arc<AuthStore>,
    /// Transcoder version reported by `-version` at boot
    pub transcoder_version: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// Ends long-lived responses such as the event stream on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(supervisor: Arc<StreamSupervisor>, auth: Arc<AuthStore>) -> Self {
        Self {
            supervisor,
            auth,
            transcoder_version: None,
            start_time: chrono::Utc::now(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_transcoder_version(mut self, version: Option<String>) -> Self {
        self.transcoder_version = version;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Build the full router: public and protected routes plus logging and CORS layers.
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let protected = Router::new()
        .route(
            "/devices/{device_id}/streams",
            post(handlers::streams::start_stream).delete(handlers::streams::stop_stream),
        )
        .route("/devices/{device_id}/status", get(handlers::streams::device_status))
        .route("/devices", get(handlers::streams::list_sessions))
        .route("/events", get(handlers::events::stream_events))
        .route("/stream/{device_id}/{artifact}", get(handlers::artifacts::serve_artifact))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_token));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/pairing-code", get(handlers::pairing::pairing_code))
        .route("/pair", post(handlers::pairing::pair))
        .route("/openapi.json", get(openapi::openapi_json))
        .merge(protected)
        .layer(from_fn(middleware::request_logging_middleware))
        .layer(cors_layer(cors))
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if config.allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &WebConfig, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        Ok(Self {
            app: create_router(state, &config.cors),
            addr,
        })
    }

    /// Serve until `cancellation_token` fires. `ready_signal` reports the bind result.
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => {
                let _ = ready_signal.send(Ok(()));
                info!("Control plane listening on {}", self.addr);

                let shutdown_signal = async move {
                    cancellation_token.cancelled().await;
                    info!("Web server received cancellation signal, shutting down gracefully");
                };

                axum::serve(listener, self.app)
                    .with_graceful_shutdown(shutdown_signal)
                    .await?;
                Ok(())
            }
            Err(bind_error) => {
                let bind_err_msg = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", bind_err_msg)));
                Err(anyhow::anyhow!("{}", bind_err_msg))
            }
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
