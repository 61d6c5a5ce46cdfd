//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Only the registry protocol is gated; discovery must stay reachable so
    // clients can find the login endpoints.
    let module_routes = Router::new()
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/versions",
            get(handlers::list_versions),
        )
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/{version}/download",
            get(handlers::download),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // GET routes also answer HEAD with an empty body.
    let discovery_routes =
        Router::new().route("/.well-known/terraform.json", get(handlers::terraform_json));

    Router::new()
        .merge(module_routes)
        .merge(discovery_routes)
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
