//! Projection of tracker tickets and comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title prefix marking a logically deleted ticket.
pub const DELETED_TITLE_PREFIX: &str = "[DELETED] ";

/// Open/closed state as reported by the tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Open,
    Closed,
}

/// A ticket as seen by the sync engine.
///
/// `number` is the only identity used here; the tracker's opaque id is never
/// read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub number: u64,
    pub title: String,
    /// Markdown body. The tracker returns `null` for empty bodies; that is
    /// normalized to an empty string.
    #[serde(default)]
    pub body: String,
    pub state: TicketState,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Ticket {
    /// Whether the ticket carries one of the given labels.
    pub fn has_any_label(&self, labels: &[&str]) -> bool {
        self.labels.iter().any(|l| labels.contains(&l.as_str()))
    }
}

/// Fields for creating a ticket. The tracker assigns the number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Partial update of a ticket. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TicketState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl TicketUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_state(mut self, state: TicketState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.state.is_none() && self.labels.is_none()
    }

    /// Drop every field that already matches `current`.
    ///
    /// Gateways call this before writing so that an update with no effective
    /// change never reaches the tracker. Labels compare as sets.
    pub fn changes_against(&self, current: &Ticket) -> TicketUpdate {
        let labels = self.labels.as_ref().filter(|labels| {
            let mut wanted: Vec<&String> = labels.iter().collect();
            let mut have: Vec<&String> = current.labels.iter().collect();
            wanted.sort();
            wanted.dedup();
            have.sort();
            have.dedup();
            wanted != have
        });

        TicketUpdate {
            title: self.title.clone().filter(|t| *t != current.title),
            body: self.body.clone().filter(|b| *b != current.body),
            state: self.state.filter(|s| *s != current.state),
            labels: labels.cloned(),
        }
    }

    /// Apply the set fields onto a ticket.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(ref title) = self.title {
            ticket.title = title.clone();
        }
        if let Some(ref body) = self.body {
            ticket.body = body.clone();
        }
        if let Some(state) = self.state {
            ticket.state = state;
        }
        if let Some(ref labels) = self.labels {
            ticket.labels = labels.clone();
        }
    }

    /// The update that marks `ticket` as logically deleted at `at`.
    ///
    /// Returns an empty update when the ticket is already closed and marked.
    pub fn deletion_of(ticket: &Ticket, at: DateTime<Utc>) -> TicketUpdate {
        if ticket.state == TicketState::Closed && ticket.title.starts_with(DELETED_TITLE_PREFIX) {
            return TicketUpdate::new();
        }

        TicketUpdate::new()
            .with_state(TicketState::Closed)
            .with_title(format!("{}{}", DELETED_TITLE_PREFIX, ticket.title))
            .with_body(format!(
                "*This issue was marked as deleted on {}*\n\n{}",
                crate::iso_timestamp(at),
                ticket.body
            ))
    }
}

/// A comment on a ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ticket() -> Ticket {
        Ticket {
            number: 4,
            title: "Write docs".to_string(),
            body: "Some body".to_string(),
            state: TicketState::Open,
            labels: vec!["docs".to_string(), "help".to_string()],
        }
    }

    #[test]
    fn test_changes_against_strips_unchanged_fields() {
        let update = TicketUpdate::new()
            .with_title("Write docs")
            .with_body("New body")
            .with_labels(vec!["help".to_string(), "docs".to_string()]);

        let changes = update.changes_against(&ticket());
        assert_eq!(changes.title, None);
        assert_eq!(changes.body.as_deref(), Some("New body"));
        assert_eq!(changes.labels, None);
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_changes_against_identical_is_empty() {
        let update = TicketUpdate::new()
            .with_body("Some body")
            .with_state(TicketState::Open);
        assert!(update.changes_against(&ticket()).is_empty());
    }

    #[test]
    fn test_deletion_marks_title_body_and_state() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let update = TicketUpdate::deletion_of(&ticket(), at);

        assert_eq!(update.state, Some(TicketState::Closed));
        assert_eq!(update.title.as_deref(), Some("[DELETED] Write docs"));
        assert_eq!(
            update.body.as_deref(),
            Some("*This issue was marked as deleted on 2024-05-01T12:00:00.000Z*\n\nSome body")
        );
    }

    #[test]
    fn test_deletion_of_already_deleted_is_noop() {
        let mut deleted = ticket();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        TicketUpdate::deletion_of(&deleted.clone(), at).apply_to(&mut deleted);

        assert!(TicketUpdate::deletion_of(&deleted, at).is_empty());
    }

    #[test]
    fn test_null_body_deserializes_as_empty() {
        let json = r#"{"number": 3, "title": "t", "state": "open"}"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.body, "");
        assert!(ticket.labels.is_empty());
    }
}
