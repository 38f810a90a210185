use std::error::Error as StdError;

use thiserror::Error;

use crate::cache::{CascadeFailure, ConfigurationError, FetchError, MutationError};
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Error message chain collected for logging.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("engine misconfigured: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Cascade(#[from] CascadeFailure),
    #[error("query failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Configuration(_) => 78,
            AppError::Infra(InfraError::Session { .. })
            | AppError::Mutation(MutationError::Authorization(_)) => 77,
            AppError::Validation(_) | AppError::Mutation(MutationError::Validation { .. }) => 65,
            AppError::Cascade(_) => 3,
            _ => 1,
        }
    }

    /// Text shown to the person running the command.
    pub fn presentation_message(&self) -> String {
        match self {
            AppError::Config(_) => "Configuration could not be loaded".to_string(),
            AppError::Infra(InfraError::Session { message }) => message.clone(),
            AppError::Infra(InfraError::Configuration { message }) => message.clone(),
            AppError::Infra(InfraError::Telemetry(_)) => {
                "Logging subsystem could not start".to_string()
            }
            AppError::Infra(InfraError::Io(_)) => "I/O failure".to_string(),
            AppError::Configuration(_) => "Engine misconfigured".to_string(),
            AppError::Mutation(err) => err.user_message(),
            AppError::Cascade(failure) => format!(
                "{} {} ({}): {}; completed steps {:?}",
                failure.cascade,
                failure.status,
                failure.kind,
                failure.error.user_message(),
                failure.completed_steps
            ),
            AppError::Fetch(err) => err.to_string(),
            AppError::Validation(message) => message.clone(),
            AppError::Unexpected(_) => "Unexpected error occurred".to_string(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
