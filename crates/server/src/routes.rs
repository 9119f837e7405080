//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::routing::{get, post};
use resumable_core::protocol::{HEADER_INTEROP_VERSION, INTEROP_VERSION};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route(
            "/upload",
            post(handlers::create_upload)
                .put(handlers::create_upload)
                .patch(handlers::create_upload),
        )
        .route(
            "/upload/{token}",
            get(handlers::get_upload_status)
                .patch(handlers::append_upload)
                .delete(handlers::delete_upload),
        )
        // Every upload response, errors included, advertises the interop version.
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(HEADER_INTEROP_VERSION),
            HeaderValue::from_static(INTEROP_VERSION),
        ));

    let api_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/admin/tokens", post(handlers::create_token))
        .route(
            "/v1/admin/tokens/{token_id}",
            axum::routing::delete(handlers::revoke_token),
        );

    let mut router = Router::new().merge(upload_routes).merge(api_routes);

    // When enabled, /metrics must be network-restricted to scrapers.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
