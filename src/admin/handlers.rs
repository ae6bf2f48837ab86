use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::AdminState;
use crate::config::ReadPreference;
use crate::load_balancer::node::NodeStats;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub read_preference: ReadPreference,
    pub primary_healthy: bool,
    pub nodes: usize,
    pub healthy_nodes: usize,
    pub open_circuits: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let stats = state.router.stats();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if state.router.is_running() { "running" } else { "stopped" },
        read_preference: state.router.config().read_preference,
        primary_healthy: stats.first().is_some_and(|primary| primary.healthy),
        nodes: stats.len(),
        healthy_nodes: stats.iter().filter(|node| node.healthy).count(),
        open_circuits: stats.iter().filter(|node| node.circuit_open).count(),
    })
}

pub async fn get_nodes(State(state): State<AdminState>) -> Json<Vec<NodeStats>> {
    Json(state.router.stats())
}

pub async fn run_health_check(State(state): State<AdminState>) -> Json<Vec<NodeStats>> {
    state.router.check_health().await;
    Json(state.router.stats())
}

pub async fn get_metrics(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.router.render_metrics(),
    )
}
