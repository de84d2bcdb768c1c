use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::{RejectionReason, TransitionRejection};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Contract(String),

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable label the views switch on: inline field errors for `validation`,
    /// a banner for `network`, the login view for `unauthorized`.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Network(_) => "network",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Contract(_) => "contract",
            AppError::Upstream { .. } => "upstream",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Contract(_) => StatusCode::BAD_GATEWAY,
            AppError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|code| code.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TransitionRejection> for AppError {
    fn from(rejection: TransitionRejection) -> Self {
        let message = rejection.to_string();
        match rejection.reason {
            RejectionReason::Invalid { field, .. } => AppError::Validation { field, message },
            RejectionReason::NotPermitted { .. } | RejectionReason::NotActorsDelivery => {
                AppError::Forbidden(message)
            }
            RejectionReason::IllegalFrom | RejectionReason::AlreadyAssigned => {
                AppError::Conflict(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        let body = match &self {
            AppError::Validation { field, message } => json!({
                "error": message,
                "kind": kind,
                "field": field,
            }),
            AppError::Unauthorized(msg) => json!({
                "error": msg,
                "kind": kind,
                "redirect": "/login",
            }),
            AppError::Forbidden(msg)
            | AppError::Network(msg)
            | AppError::Conflict(msg)
            | AppError::NotFound(msg)
            | AppError::Contract(msg)
            | AppError::Internal(msg) => json!({
                "error": msg,
                "kind": kind,
            }),
            AppError::Upstream { message, .. } => json!({
                "error": message,
                "kind": kind,
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::AppError;
    use crate::lifecycle::{Action, RejectionReason, TransitionRejection};
    use crate::models::delivery::DeliveryStatus;

    #[test]
    fn illegal_transition_maps_to_conflict() {
        let rejection = TransitionRejection {
            action: Action::Cancel,
            from: Some(DeliveryStatus::OnRoute),
            reason: RejectionReason::IllegalFrom,
        };

        let err = AppError::from(rejection);
        assert_eq!(err.kind(), "conflict");
        assert!(err.to_string().contains("On Route"));
    }

    #[test]
    fn missing_reason_maps_to_field_validation() {
        let rejection = TransitionRejection {
            action: Action::Reject,
            from: Some(DeliveryStatus::Assigned),
            reason: RejectionReason::Invalid {
                field: "reason".to_string(),
                message: "a rejection reason is required".to_string(),
            },
        };

        match AppError::from(rejection) {
            AppError::Validation { field, .. } => assert_eq!(field, "reason"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn client_side_upstream_statuses_become_bad_gateway() {
        let err = AppError::Upstream {
            status: 418,
            message: "teapot".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = AppError::Upstream {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
