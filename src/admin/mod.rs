//! Admin and metrics HTTP surface.
//!
//! ```text
//! GET  /metrics              Prometheus text exposition (no auth)
//! GET  /admin/status         router summary
//! GET  /admin/nodes          per-node stats snapshot
//! POST /admin/health-check   run one health check now, return the snapshot
//! ```
//!
//! `/admin/*` requires `Authorization: Bearer <api_key>` when a key is
//! configured.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub router: Arc<crate::Router>,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(router: Arc<crate::Router>, api_key: Option<String>) -> Self {
        Self {
            router,
            api_key: api_key.filter(|key| !key.is_empty()).map(Arc::from),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let admin = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/nodes", get(get_nodes))
        .route("/admin/health-check", post(run_health_check))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/metrics", get(get_metrics))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
