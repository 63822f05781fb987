//! Ticket API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use issuetree_core::hierarchy::{NewTicketRequest, UpdateOutcome, AUTOMATION_LABELS};
use issuetree_core::{AutomationStatus, Ticket};

use super::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for replacing a ticket body
#[derive(Debug, Deserialize)]
pub struct UpdateBodyRequest {
    pub body: String,
}

/// Request body for re-parenting a ticket
#[derive(Debug, Deserialize)]
pub struct SetParentRequest {
    pub parent: u64,
}

/// Request body for registering a child under a ticket
#[derive(Debug, Deserialize)]
pub struct AddChildRequest {
    pub child: u64,
}

/// Response for ticket creation
#[derive(Debug, Serialize)]
pub struct CreateTicketResponse {
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Set for tickets carrying an automation label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_status: Option<AutomationStatus>,
}

/// Response for child registration
#[derive(Debug, Serialize)]
pub struct AddChildResponse {
    pub parent: u64,
    pub child: u64,
    /// False when the child was already listed.
    pub added: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// List tickets in every state
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let tickets = state.gateway().list_tickets().await?;
    Ok(Json(tickets))
}

/// Create a ticket; hierarchy links are written in the background
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewTicketRequest>,
) -> Result<(StatusCode, Json<CreateTicketResponse>), ApiError> {
    let ticket = state.hierarchy().create_ticket(body).await?;
    let automation_status = ticket
        .has_any_label(AUTOMATION_LABELS)
        .then_some(AutomationStatus::Pending);

    Ok((
        StatusCode::CREATED,
        Json(CreateTicketResponse {
            ticket,
            automation_status,
        }),
    ))
}

/// Get a ticket by number
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = state.gateway().get_ticket(number).await?;
    Ok(Json(ticket))
}

/// Replace a ticket body and bring linked tickets in line
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
    Json(body): Json<UpdateBodyRequest>,
) -> Result<Json<UpdateOutcome>, ApiError> {
    let outcome = state.hierarchy().update_body(number, body.body).await?;
    Ok(Json(outcome))
}

/// Mark a ticket as deleted (the tracker only closes it)
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = state.gateway().delete_ticket(number).await?;
    info!("Marked ticket #{} as deleted", number);
    Ok(Json(ticket))
}

/// Point a ticket at a new parent
pub async fn set_parent(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
    Json(body): Json<SetParentRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = state.hierarchy().set_parent(number, body.parent).await?;
    Ok(Json(ticket))
}

/// List a child in the ticket's `### Children:` section
pub async fn add_child(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
    Json(body): Json<AddChildRequest>,
) -> Result<Json<AddChildResponse>, ApiError> {
    let added = state.hierarchy().register_child(number, body.child).await?;
    Ok(Json(AddChildResponse {
        parent: number,
        child: body.child,
        added,
    }))
}

/// Re-run the hierarchy fan-out for a ticket
pub async fn sync_ticket(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
) -> Result<Json<UpdateOutcome>, ApiError> {
    let outcome = state.hierarchy().resync(number).await?;
    Ok(Json(outcome))
}
