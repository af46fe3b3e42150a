//! API Bridge HTTP front: request filter, health check, bootstrap
pub mod bootstrap;
pub mod extract;
pub mod handlers;
pub mod middleware;

pub use bootstrap::{run, run_configured};
pub use extract::{ContextRejection, RequestContext};
pub use middleware::{Bridge, FatalHook, RemoteAddr};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Liveness probe polled by the host orchestrator.
pub const HEALTH_CHECK_PATH: &str = "/_appengine_delegate_health_check";

/// Mount the application routes behind the context filter.
pub fn create_app(bridge: Bridge, app: Router) -> Router {
    Router::new()
        .route(HEALTH_CHECK_PATH, get(handlers::health))
        .merge(app)
        .layer(axum::middleware::from_fn_with_state(bridge, middleware::filter_request))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app).await
}
