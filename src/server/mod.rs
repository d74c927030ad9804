//! HTTP/JSON front end.
//!
//! Provides four endpoints:
//! - `/ip-info?ip=<addr>` - location of the given address
//! - `/client-ip` - location of the caller
//! - `/healthz` - liveness probe
//! - `/version` - crate version
//!
//! JSON routes answer with an `{"error": ..., "content": ...}` envelope and
//! reject requests whose `Content-Type` is not JSON. When a limiter is
//! configured, every route passes through it first.

mod handlers;
mod middleware;
mod types;

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use handlers::{client_ip_handler, healthz_handler, ip_info_handler, version_handler};
pub use middleware::client_ip;
pub use types::{ApiError, ApiResponse, AppState, VersionInfo};

/// Builds the router with all routes and guards.
pub fn router(state: AppState) -> Router {
    let json_routes = Router::new()
        .route("/ip-info", get(ip_info_handler))
        .route("/client-ip", get(client_ip_handler))
        .route("/version", get(version_handler))
        .route_layer(axum::middleware::from_fn(middleware::require_json));

    let text_routes = Router::new()
        .route("/healthz", get(healthz_handler))
        .route_layer(axum::middleware::from_fn(middleware::require_text_plain));

    let mut app = Router::new().merge(json_routes).merge(text_routes);
    if state.limiter.is_some() {
        app = app.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ));
    }
    app.with_state(state)
}

/// Serves `app` on `listener` until `shutdown` fires, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let addr = listener
        .local_addr()
        .map_err(|e| anyhow::anyhow!("Failed to read listener address: {}", e))?;
    log::info!("HTTP server listening on http://{}/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    log::info!("HTTP server stopped");
    Ok(())
}
