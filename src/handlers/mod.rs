/// HTTP request handlers exposing the engine's read surface
use crate::clients::CommandClient;
use crate::domain::{CreateBundleRequest, DtnBundle, Health, TransmitRequest};
use crate::errors::ApiError;
use crate::services::{EngineSnapshot, HandoffView, SequencerView, TelemetryEngine, ThroughputSample};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TelemetryEngine>,
    pub commands: Arc<CommandClient>,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Full canonical snapshot
pub async fn get_state(State(state): State<AppState>) -> Json<SuccessResponse<EngineSnapshot>> {
    Json(SuccessResponse::new(state.engine.snapshot()))
}

/// Handoff count, in-progress flag, and last event
pub async fn get_handoff(State(state): State<AppState>) -> Json<SuccessResponse<HandoffView>> {
    Json(SuccessResponse::new(state.engine.handoff_view()))
}

/// Journey projection, newest first
pub async fn get_journeys(State(state): State<AppState>) -> Json<Value> {
    let journeys = state.engine.journeys();
    Json(serde_json::json!(SuccessResponse::new(serde_json::json!({
        "journeys": journeys
    }))))
}

/// Per-station custody queue, expedited first
pub async fn get_station_queue(
    Path(station_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let queue = state
        .engine
        .station_queue(&station_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown station {station_id}")))?;
    Ok(Json(serde_json::json!(SuccessResponse::new(
        serde_json::json!({
            "station": station_id,
            "queue": queue
        })
    ))))
}

/// Visibility uptime percentage over the rolling window
pub async fn get_station_uptime(
    Path(station_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let uptime = state
        .engine
        .station_uptime(&station_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown station {station_id}")))?;
    Ok(Json(serde_json::json!(SuccessResponse::new(
        serde_json::json!({
            "station": station_id,
            "uptime_percent": uptime
        })
    ))))
}

/// Throughput history snapshot
pub async fn get_throughput(State(state): State<AppState>) -> Json<Value> {
    let history: Vec<ThroughputSample> = state.engine.throughput_history();
    Json(serde_json::json!(SuccessResponse::new(serde_json::json!({
        "history": history
    }))))
}

/// Windowed SNR history for the link-budget chart
pub async fn get_link_budget(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!(SuccessResponse::new(serde_json::json!({
        "history": state.engine.link_budget_window()
    }))))
}

/// Current protocol stack sequencer projection
pub async fn get_sequencer(State(state): State<AppState>) -> Json<SuccessResponse<SequencerView>> {
    Json(SuccessResponse::new(state.engine.sequencer_view()))
}

/// Submit a create-bundle command upstream and track the result
pub async fn create_bundle(
    State(state): State<AppState>,
    Json(request): Json<CreateBundleRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.source_station.is_empty() {
        return Err(ApiError::InvalidInput("source_station is required".into()));
    }
    if request.ttl_hours <= 0 {
        return Err(ApiError::InvalidInput("ttl_hours must be positive".into()));
    }

    let bundle: DtnBundle = state.commands.create_bundle(&request).await?;
    state.engine.record_created_bundle(bundle.clone());

    Ok(Json(serde_json::json!(SuccessResponse::new(
        serde_json::json!({
            "bundle": bundle
        })
    ))))
}

/// Trigger the protocol stack sequencer for one simulated transmission
pub async fn transmit(
    State(state): State<AppState>,
    Json(request): Json<TransmitRequest>,
) -> Json<Value> {
    state
        .engine
        .trigger_transmission(request.direction, request.dtn_mode);
    Json(serde_json::json!(SuccessResponse::new(serde_json::json!({
        "direction": request.direction,
        "dtn_mode": request.dtn_mode
    }))))
}
