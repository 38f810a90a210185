//! Network gateway contract.
//!
//! The engine never talks to the network directly. Every cache-miss read and every mutation goes
//! through one `Gateway::request` call.

use std::fmt;

use async_trait::async_trait;
use coherence_api_types::{ErrorBody, FieldError};
use serde_json::Value;
use thiserror::Error;

use crate::cache::QueryKey;
use crate::domain::mutation::MutationKind;

/// What a gateway call is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Query(QueryKey),
    Mutation(MutationKind),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Query(key) => write!(f, "query {key}"),
            Operation::Mutation(kind) => write!(f, "mutation {kind}"),
        }
    }
}

/// Transport-level outcome of a failed request.
///
/// `Clone` so a single fetch outcome can be handed to every deduplicated waiter.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("not authorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("request rejected with status {status}: {}", body.error.message)]
    Rejected { status: u16, body: ErrorBody },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            status: 401,
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, body: ErrorBody) -> Self {
        Self::Rejected { status, body }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }

    /// Field-level messages carried by a rejection, if any.
    pub fn fields(&self) -> &[FieldError] {
        match self {
            GatewayError::Rejected { body, .. } => &body.error.fields,
            _ => &[],
        }
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Issue one authoritative request and return its JSON payload.
    async fn request(&self, operation: &Operation, params: Value) -> Result<Value, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use coherence_api_types::codes;

    #[test]
    fn rejection_exposes_field_errors() {
        let body = ErrorBody::new(codes::VALIDATION, "invalid role")
            .with_fields(vec![FieldError::new("role", "unknown role `root`")]);
        let err = GatewayError::rejected(422, body);

        assert_eq!(err.fields().len(), 1);
        assert!(err.to_string().contains("invalid role"));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn operation_display_names_target() {
        let op = Operation::Mutation(MutationKind::MarkAllRead);
        assert_eq!(op.to_string(), "mutation mark_all_read");

        let op = Operation::Query(QueryKey::bans());
        assert_eq!(op.to_string(), "query [bans]");
    }
}
