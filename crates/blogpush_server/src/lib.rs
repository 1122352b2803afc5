//! Upload proxy for blogpush.
//!
//! Publishes markdown posts (and the images they reference) to GitHub on
//! behalf of the editor, and hosts freshly uploaded images for a few minutes
//! until a publish moves them into the repository.

pub mod config;
pub mod handlers;
pub mod image_source;
pub mod relay;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use handlers::{ApiState, api_routes};
use relay::PUBLIC_PREFIX;

/// CORS layer for the configured origins; an empty list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Build the full application router.
pub fn app(state: ApiState, cors: CorsLayer) -> Router {
    let uploads = ServeDir::new(state.relay.dir());
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api_routes(state))
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
