use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::models::LeadSource;

/// Error taxonomy for the lead sourcing engine.
#[derive(Debug)]
pub enum LeadError {
    /// An upstream provider call failed or returned a malformed payload.
    Provider { source: LeadSource, message: String },
    /// No configuration record exists for the given source.
    ConfigNotFound(LeadSource),
    /// Persistence failure; callers must not assume partial writes occurred.
    Store(sqlx::Error),
    /// Reserved for callers enforcing hard quotas. Quota is advisory by
    /// default, so nothing in this crate raises it.
    #[allow(dead_code)]
    QuotaExceeded { source: LeadSource, daily_limit: i64 },
    /// Invalid caller input.
    BadRequest(String),
    /// Anything else.
    Internal(String),
}

impl LeadError {
    pub fn provider(source: LeadSource, message: impl Into<String>) -> Self {
        LeadError::Provider {
            source,
            message: message.into(),
        }
    }
}

impl fmt::Display for LeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadError::Provider { source, message } => {
                write!(f, "Provider error ({}): {}", source, message)
            }
            LeadError::ConfigNotFound(source) => {
                write!(f, "No source configuration for {}", source)
            }
            LeadError::Store(e) => write!(f, "Store error: {}", e),
            LeadError::QuotaExceeded {
                source,
                daily_limit,
            } => write!(f, "Daily quota of {} exhausted for {}", daily_limit, source),
            LeadError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            LeadError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for LeadError {}

impl IntoResponse for LeadError {
    /// Maps each variant to an HTTP status and a JSON body, logging by
    /// severity. Store and internal failures never leak details to clients.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            LeadError::Provider { source, message } => {
                tracing::error!("Provider error ({}): {}", source, message);
                (StatusCode::BAD_GATEWAY, "Upstream provider error".to_string())
            }
            LeadError::ConfigNotFound(source) => (
                StatusCode::NOT_FOUND,
                format!("No source configuration for {}", source),
            ),
            LeadError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Store error".to_string())
            }
            LeadError::QuotaExceeded {
                source,
                daily_limit,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Daily quota of {} exhausted for {}", daily_limit, source),
            ),
            LeadError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            LeadError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for LeadError {
    fn from(err: sqlx::Error) -> Self {
        LeadError::Store(err)
    }
}
