//! Cascade orchestration.
//!
//! A cascade is an ordered chain of mutations. Each step's input may depend on the outputs of the
//! steps before it. Steps run strictly one after another through the `MutationExecutor`, so each
//! completed step has already applied its own invalidations when the next one starts. Nothing is
//! rolled back.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::domain::mutation::{Mutation, MutationKind};

use super::executor::{MutationError, MutationExecutor};
use super::graph::ConfigurationError;

const METRIC_CASCADE_TOTAL: &str = "coherence_cascade_total";

/// Builds a step's mutation from the outputs of earlier steps.
///
/// The slice holds one value per earlier step, `Value::Null` for a step that failed under a
/// continue-on-failure policy.
pub type InputBuilder = Box<dyn Fn(&[Value]) -> Mutation + Send + Sync>;

pub struct CascadeStep {
    kind: MutationKind,
    build_input: InputBuilder,
}

impl CascadeStep {
    pub fn new(
        kind: MutationKind,
        build_input: impl Fn(&[Value]) -> Mutation + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            build_input: Box::new(build_input),
        }
    }

    /// A step whose input does not depend on earlier results.
    pub fn fixed(mutation: Mutation) -> Self {
        let kind = mutation.kind();
        Self::new(kind, move |_| mutation.clone())
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }
}

impl fmt::Debug for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeStep")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadePolicy {
    /// Keep running later steps after one fails. Off by default.
    pub continue_on_step_failure: bool,
}

#[derive(Debug)]
pub struct CascadeSpec {
    name: String,
    steps: Vec<CascadeStep>,
    policy: CascadePolicy,
}

impl CascadeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            policy: CascadePolicy::default(),
        }
    }

    pub fn step(mut self, step: CascadeStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_policy(mut self, policy: CascadePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> CascadePolicy {
        self.policy
    }

    pub fn kinds(&self) -> Vec<MutationKind> {
        self.steps.iter().map(CascadeStep::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Ban a user, then optionally delete all of their messages.
    ///
    /// The deletion step only runs after the ban succeeded.
    pub fn ban_with_message_deletion(
        user_id: impl Into<String>,
        reason: Option<String>,
        delete_messages: bool,
    ) -> Self {
        let user_id = user_id.into();
        let mut spec = Self::new("ban_user").step(CascadeStep::fixed(Mutation::BanUser {
            user_id: user_id.clone(),
            reason,
        }));
        if delete_messages {
            spec = spec.step(CascadeStep::fixed(Mutation::DeleteUserMessages { user_id }));
        }
        spec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    Pending,
    Running(usize),
    Succeeded,
    /// At least one step completed before the step at `failed_at` failed.
    PartiallyFailed { failed_at: usize },
    /// No step completed.
    Aborted,
}

impl CascadeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CascadeState::Succeeded | CascadeState::PartiallyFailed { .. } | CascadeState::Aborted
        )
    }

    fn metric_label(self) -> &'static str {
        match self {
            CascadeState::Pending => "pending",
            CascadeState::Running(_) => "running",
            CascadeState::Succeeded => "succeeded",
            CascadeState::PartiallyFailed { .. } => "partially_failed",
            CascadeState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeState::Pending => f.write_str("pending"),
            CascadeState::Running(step) => write!(f, "running step {step}"),
            CascadeState::Succeeded => f.write_str("succeeded"),
            CascadeState::PartiallyFailed { failed_at } => {
                write!(f, "partially failed at step {failed_at}")
            }
            CascadeState::Aborted => f.write_str("aborted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepFailure {
    pub index: usize,
    pub kind: MutationKind,
    pub error: MutationError,
}

#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub name: String,
    pub status: CascadeState,
    /// Indices of steps whose request was attempted, in order.
    pub ran_steps: Vec<usize>,
    /// Indices of steps that succeeded.
    pub completed_steps: Vec<usize>,
    pub first_failure: Option<StepFailure>,
    /// One entry per ran step; `Value::Null` for failed steps.
    pub outputs: Vec<Value>,
}

impl CascadeOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CascadeState::Succeeded
    }

    /// Human-readable result line. Partial failures never read like a success.
    pub fn summary(&self) -> String {
        match (&self.status, &self.first_failure) {
            (CascadeState::Succeeded, _) => format!(
                "{}: succeeded ({} of {} steps)",
                self.name,
                self.completed_steps.len(),
                self.ran_steps.len()
            ),
            (status, Some(failure)) => format!(
                "{}: {status} ({}): {}; completed steps {:?}",
                self.name,
                failure.kind,
                failure.error.user_message(),
                self.completed_steps
            ),
            (status, None) => format!("{}: {status}", self.name),
        }
    }

    /// Convert into the step outputs, or the failure report.
    pub fn into_result(self) -> Result<Vec<Value>, CascadeFailure> {
        match self.first_failure {
            None => Ok(self.outputs),
            Some(failure) => Err(CascadeFailure {
                cascade: self.name,
                status: self.status,
                failed_at: failure.index,
                kind: failure.kind,
                error: failure.error,
                completed_steps: self.completed_steps,
            }),
        }
    }
}

/// A cascade that did not fully succeed.
#[derive(Debug, Clone, Error)]
#[error("cascade `{cascade}` {status} ({kind}): {error}")]
pub struct CascadeFailure {
    pub cascade: String,
    pub status: CascadeState,
    pub failed_at: usize,
    pub kind: MutationKind,
    pub error: MutationError,
    pub completed_steps: Vec<usize>,
}

pub struct CascadeOrchestrator {
    executor: Arc<MutationExecutor>,
}

impl CascadeOrchestrator {
    pub fn new(executor: Arc<MutationExecutor>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, spec: &CascadeSpec) -> CascadeOutcome {
        let (progress, _) = watch::channel(CascadeState::Pending);
        self.run_with_progress(spec, &progress).await
    }

    /// Run the cascade, publishing every state transition on `progress`.
    #[instrument(skip(self, spec, progress), fields(cascade = %spec.name, steps = spec.len()))]
    pub async fn run_with_progress(
        &self,
        spec: &CascadeSpec,
        progress: &watch::Sender<CascadeState>,
    ) -> CascadeOutcome {
        progress.send_replace(CascadeState::Pending);

        let mut outcome = CascadeOutcome {
            name: spec.name.clone(),
            status: CascadeState::Pending,
            ran_steps: Vec::new(),
            completed_steps: Vec::new(),
            first_failure: None,
            outputs: Vec::new(),
        };

        for (index, step) in spec.steps.iter().enumerate() {
            progress.send_replace(CascadeState::Running(index));
            outcome.ran_steps.push(index);

            let mutation = (step.build_input)(&outcome.outputs);
            let result = if mutation.kind() == step.kind {
                debug!(step = index, kind = %step.kind, "Running cascade step");
                self.executor.execute(&mutation).await
            } else {
                Err(MutationError::Configuration(
                    ConfigurationError::StepKindMismatch {
                        cascade: spec.name.clone(),
                        step: index,
                        expected: step.kind,
                        actual: mutation.kind(),
                    },
                ))
            };

            match result {
                Ok(output) => {
                    outcome.completed_steps.push(index);
                    outcome.outputs.push(output);
                }
                Err(error) => {
                    warn!(step = index, kind = %step.kind, %error, "Cascade step failed");
                    outcome.outputs.push(Value::Null);
                    if outcome.first_failure.is_none() {
                        outcome.first_failure = Some(StepFailure {
                            index,
                            kind: step.kind,
                            error,
                        });
                    }
                    if !spec.policy.continue_on_step_failure {
                        break;
                    }
                }
            }
        }

        outcome.status = match &outcome.first_failure {
            None => CascadeState::Succeeded,
            Some(_) if outcome.completed_steps.is_empty() => CascadeState::Aborted,
            Some(failure) => CascadeState::PartiallyFailed {
                failed_at: failure.index,
            },
        };

        counter!(METRIC_CASCADE_TOTAL, "status" => outcome.status.metric_label()).increment(1);
        info!(status = %outcome.status, completed = ?outcome.completed_steps, "Cascade finished");
        progress.send_replace(outcome.status);
        outcome
    }
}
