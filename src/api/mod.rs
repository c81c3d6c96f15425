//! REST API running AEP analyses on demand.
//!
//! Provides one endpoint:
//! - `POST /calculate` runs the configured analysis, with optional
//!   `num_simulations` and `master_seed` overrides

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use crate::analysis::AnalysisInputs;
use crate::config::AnalysisConfig;

pub use types::CalculateRequest;

/// Application state shared across all request handlers.
///
/// Inputs are loaded once at start-up and only read afterwards, so no locks
/// are needed. Every request builds its own dataset from them.
pub struct AppState {
    /// Base configuration that request overrides apply to.
    pub config: AnalysisConfig,
    /// Raw plant and reanalysis tables.
    pub inputs: AnalysisInputs,
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/calculate", post(handlers::calculate))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind to `addr` or the
/// server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
