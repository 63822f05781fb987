//! In-memory issue tracker for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use chrono::Utc;

use crate::tracker::{
    Comment, GatewayError, NewTicket, Ticket, TicketGateway, TicketState, TicketUpdate,
};

#[derive(Debug, Default)]
struct TrackerState {
    tickets: BTreeMap<u64, Ticket>,
    /// Comment id -> (ticket number, comment).
    comments: BTreeMap<u64, (u64, Comment)>,
    next_number: u64,
    next_comment_id: u64,
}

/// Mock implementation of the TicketGateway trait.
///
/// Provides controllable behavior for testing:
/// - Seed tickets and read bodies back for assertions
/// - Count reads and effective writes per ticket
/// - Fail reads or writes of specific tickets
/// - Add latency to every call so concurrent edits really overlap
///
/// # Example
///
/// ```rust,ignore
/// use issuetree_core::testing::MockTicketGateway;
///
/// let gateway = MockTicketGateway::new();
/// gateway.insert_ticket(3, "Epic", "").await;
/// gateway.fail_updates_for(4).await;
///
/// let sync = HierarchySync::new(Arc::new(gateway), serializer);
/// ```
#[derive(Debug)]
pub struct MockTicketGateway {
    state: Arc<RwLock<TrackerState>>,
    get_counts: Arc<RwLock<HashMap<u64, usize>>>,
    write_counts: Arc<RwLock<HashMap<u64, usize>>>,
    failing_gets: Arc<RwLock<HashSet<u64>>>,
    failing_updates: Arc<RwLock<HashSet<u64>>>,
    latency: Arc<RwLock<Option<Duration>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<GatewayError>>>,
}

impl Default for MockTicketGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTicketGateway {
    /// Create an empty tracker. The first created ticket gets number 1.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(TrackerState {
                next_number: 1,
                next_comment_id: 1,
                ..Default::default()
            })),
            get_counts: Arc::new(RwLock::new(HashMap::new())),
            write_counts: Arc::new(RwLock::new(HashMap::new())),
            failing_gets: Arc::new(RwLock::new(HashSet::new())),
            failing_updates: Arc::new(RwLock::new(HashSet::new())),
            latency: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Add an open ticket with the given number.
    pub async fn insert_ticket(&self, number: u64, title: &str, body: &str) -> Ticket {
        let ticket = Ticket {
            number,
            title: title.to_string(),
            body: body.to_string(),
            state: TicketState::Open,
            labels: Vec::new(),
        };
        self.put_ticket(ticket.clone()).await;
        ticket
    }

    /// Add or replace a ticket as-is.
    pub async fn put_ticket(&self, ticket: Ticket) {
        let mut state = self.state.write().await;
        state.next_number = state.next_number.max(ticket.number + 1);
        state.tickets.insert(ticket.number, ticket);
    }

    /// Number assigned to the next created ticket.
    pub async fn set_next_number(&self, number: u64) {
        self.state.write().await.next_number = number;
    }

    /// Current ticket, bypassing counters and failure injection.
    pub async fn ticket(&self, number: u64) -> Option<Ticket> {
        self.state.read().await.tickets.get(&number).cloned()
    }

    /// Current body, bypassing counters and failure injection.
    pub async fn body(&self, number: u64) -> Option<String> {
        self.ticket(number).await.map(|t| t.body)
    }

    pub async fn ticket_count(&self) -> usize {
        self.state.read().await.tickets.len()
    }

    // =========================================================================
    // Call counting
    // =========================================================================

    /// `get_ticket` calls made for a ticket.
    pub async fn get_count(&self, number: u64) -> usize {
        self.get_counts.read().await.get(&number).copied().unwrap_or(0)
    }

    pub async fn total_gets(&self) -> usize {
        self.get_counts.read().await.values().sum()
    }

    /// Effective writes to a ticket; no-op updates are not counted.
    pub async fn update_count(&self, number: u64) -> usize {
        self.write_counts.read().await.get(&number).copied().unwrap_or(0)
    }

    pub async fn total_updates(&self) -> usize {
        self.write_counts.read().await.values().sum()
    }

    // =========================================================================
    // Failure and latency injection
    // =========================================================================

    /// Make every `get_ticket` of this ticket fail with a server error.
    pub async fn fail_gets_for(&self, number: u64) {
        self.failing_gets.write().await.insert(number);
    }

    /// Make every `update_ticket` of this ticket fail with a server error.
    pub async fn fail_updates_for(&self, number: u64) {
        self.failing_updates.write().await.insert(number);
    }

    /// Remove all per-ticket failures.
    pub async fn clear_failures(&self) {
        self.failing_gets.write().await.clear();
        self.failing_updates.write().await.clear();
    }

    /// Sleep this long at the start of every call.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: GatewayError) {
        *self.next_error.write().await = Some(error);
    }

    async fn begin_call(&self) -> Result<(), GatewayError> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn injected(number: u64) -> GatewayError {
        GatewayError::Api {
            status: 500,
            message: format!("injected failure for #{}", number),
        }
    }

    fn missing_ticket(number: u64) -> GatewayError {
        GatewayError::NotFound(format!("issue #{}", number))
    }
}

#[async_trait]
impl TicketGateway for MockTicketGateway {
    fn name(&self) -> &str {
        "mock"
    }

    fn ticket_url(&self, number: u64) -> String {
        format!("https://tracker.test/issues/{}", number)
    }

    async fn get_ticket(&self, number: u64) -> Result<Ticket, GatewayError> {
        self.begin_call().await?;
        *self.get_counts.write().await.entry(number).or_insert(0) += 1;

        if self.failing_gets.read().await.contains(&number) {
            return Err(Self::injected(number));
        }
        self.ticket(number)
            .await
            .ok_or_else(|| Self::missing_ticket(number))
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, GatewayError> {
        self.begin_call().await?;
        Ok(self
            .state
            .read()
            .await
            .tickets
            .values()
            .rev()
            .cloned()
            .collect())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, GatewayError> {
        self.begin_call().await?;
        let mut state = self.state.write().await;
        let number = state.next_number;
        state.next_number += 1;

        let created = Ticket {
            number,
            title: ticket.title,
            body: ticket.body,
            state: TicketState::Open,
            labels: ticket.labels,
        };
        state.tickets.insert(number, created.clone());
        Ok(created)
    }

    async fn update_ticket(
        &self,
        number: u64,
        update: TicketUpdate,
    ) -> Result<Ticket, GatewayError> {
        self.begin_call().await?;
        if self.failing_updates.read().await.contains(&number) {
            return Err(Self::injected(number));
        }

        let mut state = self.state.write().await;
        let ticket = state
            .tickets
            .get_mut(&number)
            .ok_or_else(|| Self::missing_ticket(number))?;

        let changes = update.changes_against(ticket);
        if !changes.is_empty() {
            changes.apply_to(ticket);
            *self.write_counts.write().await.entry(number).or_insert(0) += 1;
        }
        Ok(ticket.clone())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GatewayError> {
        self.begin_call().await?;
        let state = self.state.read().await;
        if !state.tickets.contains_key(&number) {
            return Err(Self::missing_ticket(number));
        }
        Ok(state
            .comments
            .values()
            .filter(|(ticket, _)| *ticket == number)
            .map(|(_, comment)| comment.clone())
            .collect())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<Comment, GatewayError> {
        self.begin_call().await?;
        let mut state = self.state.write().await;
        if !state.tickets.contains_key(&number) {
            return Err(Self::missing_ticket(number));
        }

        let id = state.next_comment_id;
        state.next_comment_id += 1;
        let now = Utc::now();
        let comment = Comment {
            id,
            body: body.to_string(),
            author: Some("mock-user".to_string()),
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.comments.insert(id, (number, comment.clone()));
        Ok(comment)
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<Comment, GatewayError> {
        self.begin_call().await?;
        let mut state = self.state.write().await;
        let (_, comment) = state
            .comments
            .get_mut(&comment_id)
            .ok_or_else(|| GatewayError::NotFound(format!("comment {}", comment_id)))?;
        comment.body = body.to_string();
        comment.updated_at = Some(Utc::now());
        Ok(comment.clone())
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<(), GatewayError> {
        self.begin_call().await?;
        self.state
            .write()
            .await
            .comments
            .remove(&comment_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("comment {}", comment_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_numbers_after_seeded_tickets() {
        let gateway = MockTicketGateway::new();
        gateway.insert_ticket(4, "Seeded", "").await;

        let created = gateway
            .create_ticket(NewTicket {
                title: "New".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.number, 5);
    }

    #[tokio::test]
    async fn test_no_op_update_is_not_a_write() {
        let gateway = MockTicketGateway::new();
        gateway.insert_ticket(1, "Title", "Body").await;

        gateway
            .update_ticket(1, TicketUpdate::new().with_body("Body"))
            .await
            .unwrap();
        assert_eq!(gateway.update_count(1).await, 0);

        gateway
            .update_ticket(1, TicketUpdate::new().with_body("Other"))
            .await
            .unwrap();
        assert_eq!(gateway.update_count(1).await, 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let gateway = MockTicketGateway::new();
        gateway.insert_ticket(1, "Title", "Body").await;
        gateway.fail_gets_for(1).await;

        assert!(!gateway.get_ticket(1).await.unwrap_err().is_not_found());
        assert!(gateway.get_ticket(2).await.unwrap_err().is_not_found());

        gateway.clear_failures().await;
        assert!(gateway.get_ticket(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_next_error_applies_once() {
        let gateway = MockTicketGateway::new();
        gateway.insert_ticket(1, "Title", "").await;
        gateway.set_next_error(GatewayError::RateLimited).await;

        assert!(matches!(
            gateway.get_ticket(1).await,
            Err(GatewayError::RateLimited)
        ));
        assert!(gateway.get_ticket(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_comments_lifecycle() {
        let gateway = MockTicketGateway::new();
        gateway.insert_ticket(1, "Title", "").await;

        let comment = gateway.create_comment(1, "first").await.unwrap();
        let updated = gateway.update_comment(comment.id, "edited").await.unwrap();
        assert_eq!(updated.body, "edited");
        assert_eq!(gateway.list_comments(1).await.unwrap().len(), 1);

        gateway.delete_comment(comment.id).await.unwrap();
        assert!(gateway.list_comments(1).await.unwrap().is_empty());
        assert!(gateway.delete_comment(comment.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_ticket_marks_and_closes() {
        let gateway = MockTicketGateway::new();
        gateway.insert_ticket(1, "Title", "Body").await;

        let deleted = gateway.delete_ticket(1).await.unwrap();
        assert_eq!(deleted.state, TicketState::Closed);
        assert_eq!(deleted.title, "[DELETED] Title");
        assert!(deleted.body.starts_with("*This issue was marked as deleted on "));
        assert!(deleted.body.ends_with("*\n\nBody"));

        // Deleting again changes nothing.
        gateway.delete_ticket(1).await.unwrap();
        assert_eq!(gateway.update_count(1).await, 1);
    }
}
