//! Automation status API handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use issuetree_core::automation::{AutomationUpdate, StartAutomation};
use issuetree_core::{AutomationRecord, AutomationSnapshot};

use super::error::ApiError;
use crate::state::AppState;

/// Current automation fields of a ticket
pub async fn get_automation(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
) -> Result<Json<AutomationSnapshot>, ApiError> {
    let snapshot = state.automation().status(number).await?;
    Ok(Json(snapshot))
}

/// Start an automation run
pub async fn start_automation(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
    Json(body): Json<StartAutomation>,
) -> Result<Json<AutomationRecord>, ApiError> {
    let record = state.automation().start(number, body).await?;
    Ok(Json(record))
}

/// Apply a status change, step merge and/or log line
pub async fn update_automation(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
    Json(body): Json<AutomationUpdate>,
) -> Result<Json<AutomationRecord>, ApiError> {
    let record = state.automation().apply_update(number, body).await?;
    Ok(Json(record))
}
