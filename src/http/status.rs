//! Read-only status endpoints.
//!
//! Informational only; nothing here takes part in the counting protocol.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::lifecycle::ProcessState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub port: u16,
    pub state: ProcessState,
}

#[derive(Serialize)]
pub struct CountStatus {
    /// Last global value seen on the change bus.
    pub count: Option<i64>,
}

pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "OK",
        port: state.port,
        state: state.lifecycle.state(),
    })
}

pub async fn count(State(state): State<AppState>) -> Json<CountStatus> {
    Json(CountStatus {
        count: state.coordinator.last_seen(),
    })
}
