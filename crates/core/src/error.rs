//! Error classification shared by every subsystem.

use serde::Serialize;

/// Coarse failure class surfaced to callers of the sync engine.
///
/// Each module keeps its own error enum; this is the common projection the
/// HTTP layer maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Ticket, comment or automation record absent.
    NotFound,
    /// Bad status value, missing field, self-reference.
    InvalidArgument,
    /// The tracker (or the sidecar store) failed.
    UpstreamFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::UpstreamFailure => "upstream_failure",
        }
    }
}
