//! Mutation executor.
//!
//! Sends one authoritative request per mutation and, only on success, applies the invalidation
//! plan of its kind before handing the output back.

use std::sync::Arc;
use std::time::Instant;

use coherence_api_types::{FieldError, codes};
use metrics::{counter, histogram};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::mutation::{Mutation, MutationKind};
use crate::infra::gateway::{Gateway, GatewayError, Operation};

use super::graph::{ConfigurationError, InvalidationGraph};
use super::planner::InvalidationPlan;
use super::store::QueryCache;

const METRIC_MUTATION_TOTAL: &str = "coherence_mutation_total";
const METRIC_MUTATION_MS: &str = "coherence_mutation_ms";

#[derive(Debug, Clone, Error)]
pub enum MutationError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl MutationError {
    /// Text to show the user: the first field-level message when present, else the original
    /// error message.
    pub fn user_message(&self) -> String {
        match self {
            MutationError::Validation { message, fields } => fields
                .first()
                .map(|field| field.message.clone())
                .unwrap_or_else(|| message.clone()),
            MutationError::Authorization(message) | MutationError::Transport(message) => {
                message.clone()
            }
            MutationError::Server { message, .. } => message.clone(),
            MutationError::Configuration(err) => err.to_string(),
        }
    }

    pub fn fields(&self) -> &[FieldError] {
        match self {
            MutationError::Validation { fields, .. } => fields,
            _ => &[],
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            MutationError::Validation { .. } => "invalid",
            MutationError::Authorization(_) => "unauthorized",
            MutationError::Transport(_) => "transport",
            MutationError::Server { .. } => "rejected",
            MutationError::Configuration(_) => "misconfigured",
        }
    }
}

impl From<GatewayError> for MutationError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unauthorized { message, .. } => MutationError::Authorization(message),
            GatewayError::Rejected { status, body } => {
                let is_validation = body.error.code == codes::VALIDATION
                    || !body.error.fields.is_empty()
                    || status == 400
                    || status == 422;
                if is_validation {
                    MutationError::Validation {
                        message: body.error.message,
                        fields: body.error.fields,
                    }
                } else {
                    MutationError::Server {
                        status,
                        message: body.error.message,
                    }
                }
            }
            GatewayError::Transport(message) | GatewayError::Decode(message) => {
                MutationError::Transport(message)
            }
            GatewayError::InvalidRequest(message) => MutationError::Validation {
                message,
                fields: Vec::new(),
            },
        }
    }
}

pub struct MutationExecutor {
    gateway: Arc<dyn Gateway>,
    cache: Arc<QueryCache>,
    graph: Arc<InvalidationGraph>,
}

impl MutationExecutor {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        cache: Arc<QueryCache>,
        graph: Arc<InvalidationGraph>,
    ) -> Self {
        Self {
            gateway,
            cache,
            graph,
        }
    }

    /// Run one mutation.
    ///
    /// Never retries. On success every pattern declared for the kind is stale before this
    /// returns; on failure the cache is left untouched.
    #[instrument(skip(self, mutation), fields(kind = %mutation.kind()))]
    pub async fn execute(&self, mutation: &Mutation) -> Result<Value, MutationError> {
        let kind = mutation.kind();
        let plan = InvalidationPlan::from_kinds(&self.graph, [kind])?;

        if let Err(fields) = mutation.validate() {
            let err = MutationError::Validation {
                message: format!("invalid input for {kind}"),
                fields,
            };
            record_outcome(kind, err.outcome_label());
            return Err(err);
        }

        let started = Instant::now();
        let result = self
            .gateway
            .request(&Operation::Mutation(kind), mutation.params())
            .await;
        histogram!(METRIC_MUTATION_MS, "kind" => kind.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(output) => {
                let touched = plan.apply(&self.cache);
                record_outcome(kind, "success");
                info!(%plan, touched, "Mutation succeeded");
                Ok(output)
            }
            Err(err) => {
                let err = MutationError::from(err);
                record_outcome(kind, err.outcome_label());
                warn!(error = %err, "Mutation failed; cache left untouched");
                Err(err)
            }
        }
    }
}

fn record_outcome(kind: MutationKind, outcome: &'static str) {
    counter!(METRIC_MUTATION_TOTAL, "kind" => kind.as_str(), "outcome" => outcome).increment(1);
}
