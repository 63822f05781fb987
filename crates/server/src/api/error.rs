//! Mapping of domain errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use issuetree_core::{AutomationError, ErrorKind, GatewayError, HierarchyError};

/// Error body returned by every handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

/// A failed API call: the error class plus a message for the caller.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<HierarchyError> for ApiError {
    fn from(e: HierarchyError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<AutomationError> for ApiError {
    fn from(e: AutomationError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.kind == ErrorKind::UpstreamFailure {
            warn!("Upstream failure: {}", self.message);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.message,
                kind: self.kind,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_by_kind() {
        let not_found: ApiError = HierarchyError::NotFound(3).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let invalid = ApiError::invalid_argument("content must not be empty");
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let upstream: ApiError = GatewayError::RateLimited.into();
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_gateway_not_found_maps_to_404() {
        let err: ApiError = GatewayError::NotFound("issue #8".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
