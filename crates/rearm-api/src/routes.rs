//! Router and server startup.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use rearm_core::error::RearmError;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// Localhost origins allowed to call the API from a browser.
fn local_origins(port: u16) -> Vec<HeaderValue> {
    ["127.0.0.1", "localhost"]
        .iter()
        .filter_map(|host| format!("http://{}:{}", host, port).parse().ok())
        .collect()
}

/// Build the router with every route and middleware layer.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(local_origins(state.port)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let public_routes = Router::new().route("/health", get(handlers::health));

    let protected_routes = Router::new()
        .route("/v1/skill", post(handlers::skill))
        .route(
            "/v1/credentials",
            get(handlers::list_credentials).post(handlers::register),
        )
        .route(
            "/v1/credentials/{user_id}/pending",
            post(handlers::begin_registration),
        )
        .route("/v1/events/{user_id}", get(handlers::get_event))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on 127.0.0.1:`state.port` until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), RearmError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = format!("127.0.0.1:{}", state.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RearmError::Api(format!("Failed to bind {}: {}", addr, e)))?;
    info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RearmError::Api(format!("Server error: {}", e)))?;
    Ok(())
}
