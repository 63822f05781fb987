//! Ticket Gateway: the external issue tracker as seen by the sync engine.
//!
//! The tracker owns ticket storage. This module only describes the calls the
//! engine makes against it and ships a GitHub-backed implementation.

mod github;
mod types;

pub use github::GitHubGateway;
pub use types::*;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors returned by a tracker call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Ticket or comment does not exist (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tracker refused the call because of rate limiting.
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimited,

    /// The tracker answered with an unexpected status.
    #[error("Tracker API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Missing credentials or repository coordinates.
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::UpstreamFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

/// Contract consumed by the hierarchy and automation subsystems.
///
/// Every call is treated as at-most-once; implementations own any retry
/// policy. Each read is a fresh call, nothing is cached by the engine.
#[async_trait]
pub trait TicketGateway: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Browser URL of a ticket, used when rendering titled links.
    fn ticket_url(&self, number: u64) -> String;

    /// Fetch a single ticket.
    async fn get_ticket(&self, number: u64) -> Result<Ticket, GatewayError>;

    /// List tickets in every state.
    async fn list_tickets(&self) -> Result<Vec<Ticket>, GatewayError>;

    /// Create a ticket; the tracker assigns its number.
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, GatewayError>;

    /// Update a ticket. An update with no field differing from the current
    /// ticket performs no write and returns the current ticket.
    async fn update_ticket(
        &self,
        number: u64,
        update: TicketUpdate,
    ) -> Result<Ticket, GatewayError>;

    /// List comments on a ticket, oldest first.
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GatewayError>;

    /// Add a comment to a ticket.
    async fn create_comment(&self, number: u64, body: &str) -> Result<Comment, GatewayError>;

    /// Replace a comment's body.
    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<Comment, GatewayError>;

    /// Delete a comment.
    async fn delete_comment(&self, comment_id: u64) -> Result<(), GatewayError>;

    /// Logically delete a ticket.
    ///
    /// The tracker has no real delete: the ticket is closed, its title gets a
    /// `[DELETED] ` prefix and its body a deletion notice.
    async fn delete_ticket(&self, number: u64) -> Result<Ticket, GatewayError> {
        let current = self.get_ticket(number).await?;
        let update = TicketUpdate::deletion_of(&current, Utc::now());
        if update.is_empty() {
            return Ok(current);
        }
        self.update_ticket(number, update).await
    }
}
