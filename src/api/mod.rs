//! HTTP surface using Axum
//!
//! Thin transport around the supervisor core: liveness intake, manual
//! command intake, and the dashboard status snapshot. The core state
//! machine knows nothing about this layer — it only sees method calls and
//! emits broadcast events.

pub mod envelope;
pub mod handlers;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `WARDEN_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for dashboard development.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("WARDEN_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        // Probe intake — kept at the root, the probe side is a dumb GET
        .route("/alive", get(handlers::report_alive))
        // v1 API
        .route("/api/v1/command", post(handlers::submit_command))
        .route("/api/v1/status", get(handlers::fleet_status))
        // Infrastructure health probe
        .route("/health", get(handlers::health))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
