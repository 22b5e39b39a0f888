//! HTTP routes
//!
//! | Path | Description |
//! |------|-------------|
//! | `/` | Liveness banner |
//! | `/{source}` | Live audio stream for a configured source (chunked) |

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::config::SourceCatalog;
use crate::error::Error;
use crate::registry::{SourceKey, SourceRegistry};
use crate::session::ConsumerSession;

use super::config::ServerConfig;

/// Shared state passed to all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Hub registry
    pub registry: Arc<SourceRegistry>,
    /// Source key → URL lookup
    pub catalog: Arc<SourceCatalog>,
    /// Server settings
    pub config: Arc<ServerConfig>,
}

/// Build the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/{source}", get(stream_source))
        .with_state(state)
}

async fn serve_root() -> impl IntoResponse {
    format!(
        "Server Run Successful!\nVersion: {}",
        env!("CARGO_PKG_VERSION")
    )
}

/// Handles requests to `/{source}`
///
/// The response body is the session's chunk stream; when the client goes
/// away the body is dropped and the session released with it.
async fn stream_source(State(state): State<AppState>, Path(source): Path<String>) -> Response {
    let key = SourceKey::new(source);

    let url = match state.catalog.lookup(&key).await {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(source = %key, error = %e, "Unknown source requested");
            return (StatusCode::NOT_FOUND, "Stream not found").into_response();
        }
    };

    let session = match ConsumerSession::open(&state.registry, &key, &url).await {
        Ok(session) => session,
        Err(e @ Error::Spawn { .. }) => {
            tracing::error!(source = %key, error = %e, "Could not start transcoder");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error starting transcoder").into_response();
        }
        Err(e) => {
            tracing::error!(source = %key, error = %e, "Could not open session");
            return (StatusCode::SERVICE_UNAVAILABLE, "Stream unavailable").into_response();
        }
    };

    tracing::info!(
        source = %key,
        hub_id = session.hub().id(),
        listeners = session.hub().refcount(),
        "Client attached"
    );

    let body = Body::from_stream(session.into_stream(state.config.idle_timeout));
    (
        [
            (header::CONTENT_TYPE, state.config.content_type.clone()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}
