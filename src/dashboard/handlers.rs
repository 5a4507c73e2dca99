use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::alerts::AlertRecord;
use crate::dashboard::DashboardState;
use crate::health::outcome::Outcome;
use crate::health::state::HealthSnapshot;
use crate::monitor::{HealthSummary, TargetSummary};
use crate::store::TargetStats;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(key) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("unknown target '{}'", key) })),
            )
                .into_response(),
        }
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    #[serde(flatten)]
    pub summary: HealthSummary,
}

#[derive(Serialize)]
pub struct TargetDetail {
    #[serde(flatten)]
    pub summary: TargetSummary,
    pub health: Option<HealthSnapshot>,
    pub stats: Option<TargetStats>,
    pub alerts: Vec<AlertRecord>,
}

#[derive(Serialize)]
pub struct Uptime {
    pub key: String,
    pub window_secs: Option<u64>,
    pub uptime_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UptimeParams {
    pub window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertParams {
    pub limit: Option<usize>,
    pub target: Option<String>,
}

pub async fn get_status(State(state): State<DashboardState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        summary: state.view.summary(),
    })
}

pub async fn get_targets(State(state): State<DashboardState>) -> Json<Vec<TargetSummary>> {
    Json(state.view.list_targets())
}

pub async fn get_target(
    State(state): State<DashboardState>,
    Path(key): Path<String>,
) -> Result<Json<TargetDetail>, ApiError> {
    let summary = state
        .view
        .target(&key)
        .ok_or_else(|| ApiError::NotFound(key.clone()))?;
    Ok(Json(TargetDetail {
        summary,
        health: state.view.health(&key),
        stats: state.view.stats(&key),
        alerts: state.view.target_alerts(&key, 10),
    }))
}

pub async fn get_history(
    State(state): State<DashboardState>,
    Path(key): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Arc<Outcome>>>, ApiError> {
    state
        .view
        .history(&key, params.limit.unwrap_or(DEFAULT_LIMIT))
        .map(Json)
        .ok_or(ApiError::NotFound(key))
}

pub async fn get_uptime(
    State(state): State<DashboardState>,
    Path(key): Path<String>,
    Query(params): Query<UptimeParams>,
) -> Result<Json<Uptime>, ApiError> {
    if state.view.current_state(&key).is_none() {
        return Err(ApiError::NotFound(key));
    }
    let window = params.window_secs.map(Duration::from_secs);
    Ok(Json(Uptime {
        uptime_ratio: state.view.uptime_ratio(&key, window),
        window_secs: params.window_secs,
        key,
    }))
}

pub async fn get_alerts(
    State(state): State<DashboardState>,
    Query(params): Query<AlertParams>,
) -> Json<Vec<AlertRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    Json(match params.target {
        Some(key) => state.view.target_alerts(&key, limit),
        None => state.view.alerts(limit),
    })
}
