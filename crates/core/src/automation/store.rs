//! Storage of automation sidecar records.

use std::fmt;

use super::AutomationRecord;
use crate::error::ErrorKind;

/// Error type for automation record storage.
#[derive(Debug)]
pub enum AutomationStoreError {
    /// Database error.
    Database(String),
    /// A stored record could not be decoded.
    Corrupt { ticket_number: u64, message: String },
}

impl AutomationStoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamFailure
    }
}

impl fmt::Display for AutomationStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationStoreError::Database(msg) => write!(f, "Database error: {}", msg),
            AutomationStoreError::Corrupt {
                ticket_number,
                message,
            } => write!(
                f,
                "Stored automation record for #{} is corrupt: {}",
                ticket_number, message
            ),
        }
    }
}

impl std::error::Error for AutomationStoreError {}

/// Persistence for automation records, one per ticket number.
pub trait AutomationStore: Send + Sync {
    /// Record for a ticket, `None` when automation never ran.
    fn get(&self, ticket_number: u64) -> Result<Option<AutomationRecord>, AutomationStoreError>;

    /// Insert or replace the record for `record.ticket_number`.
    fn save(&self, record: &AutomationRecord) -> Result<(), AutomationStoreError>;

    /// Number of stored records.
    fn count(&self) -> Result<u64, AutomationStoreError>;
}
