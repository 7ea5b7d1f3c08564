//! HTTP boundary: `GET /api/find?url=...` (also served at `/`).
//!
//! Responses are JSON envelopes: `{"data": [...]}` on success and
//! `{"error": "..."}` for rejected input. Internal faults return a bare 500.

use crate::config::Config;
use crate::feed::{DiscoveryError, Feed, Finder};
use crate::net::FetchError;
use crate::util::{normalize_target, UrlValidationError};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Request-level failures, mapped onto status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(#[from] UrlValidationError),
    #[error("{0}")]
    MalformedQuery(#[from] QueryRejection),
    #[error("internal error: {0}")]
    Internal(#[from] DiscoveryError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::MalformedQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let ApiError::Internal(e) = &self {
            tracing::error!(error = %e, "Discovery failed");
            return status.into_response();
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Failures that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindResponse {
    pub data: Vec<Feed>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub url: Option<String>,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    finder: Finder,
    banned_suffixes: Arc<[String]>,
}

impl AppState {
    pub fn new(finder: Finder, banned_suffixes: Vec<String>) -> Self {
        Self {
            finder,
            banned_suffixes: banned_suffixes.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Ok(Self::new(Finder::new(config)?, config.banned_suffixes.clone()))
    }

    /// Normalizes `raw`, rejects bad input, and runs discovery.
    ///
    /// Shared by the HTTP handler and the `find` subcommand.
    pub async fn find(&self, raw: Option<&str>) -> Result<FindResponse, ApiError> {
        let target = normalize_target(raw.unwrap_or_default(), &self.banned_suffixes)?;
        let data = self.finder.find(&target).await?;
        Ok(FindResponse { data })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(find))
        .route("/api/find", get(find))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn find(
    State(state): State<AppState>,
    query: Result<Query<FindQuery>, QueryRejection>,
) -> Result<Json<FindResponse>, ApiError> {
    let Query(query) = query?;
    state.find(query.url.as_deref()).await.map(Json)
}

/// Binds `config.listen` and serves until Ctrl+C or SIGTERM.
pub async fn run(config: &Config) -> Result<(), ServerError> {
    let address: SocketAddr = config.listen.parse().map_err(|source| ServerError::Listen {
        addr: config.listen.clone(),
        source,
    })?;
    let app = router(AppState::from_config(config)?);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "feedfinder listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
