use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

/// Probe body. `store` is only reported by the readiness probe.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProbeReport {
    status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<ComponentStatus>,
}

/// Liveness: the process answers requests
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Process is alive", body = ProbeReport)
    )
)]
pub(crate) async fn health_check() -> Json<ProbeReport> {
    Json(ProbeReport {
        status: ProbeStatus::Ok,
        store: None,
    })
}

/// Readiness: the account store can serve reads and writes
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Account store is reachable", body = ProbeReport),
        (status = 503, description = "Account store is unavailable", body = ProbeReport)
    )
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<ProbeReport>) {
    let (code, status, store) = if state.health_check().await {
        (StatusCode::OK, ProbeStatus::Ok, ComponentStatus::Healthy)
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            ProbeStatus::Unavailable,
            ComponentStatus::Unhealthy,
        )
    };
    (
        code,
        Json(ProbeReport {
            status,
            store: Some(store),
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}
