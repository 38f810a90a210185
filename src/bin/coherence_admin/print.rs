use coherence::application::error::AppError;
use coherence::cache::{CascadeOutcome, QueryKey};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::unexpected(format!("failed to render output: {e}")))?;
    println!("{out}");
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport<'a> {
    pub cascade: &'a str,
    pub status: String,
    pub summary: String,
    pub ran_steps: &'a [usize],
    pub completed_steps: &'a [usize],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a CascadeOutcome> for CascadeReport<'a> {
    fn from(outcome: &'a CascadeOutcome) -> Self {
        Self {
            cascade: &outcome.name,
            status: outcome.status.to_string(),
            summary: outcome.summary(),
            ran_steps: &outcome.ran_steps,
            completed_steps: &outcome.completed_steps,
            failed_at: outcome.first_failure.as_ref().map(|f| f.index),
            error: outcome
                .first_failure
                .as_ref()
                .map(|f| f.error.user_message()),
        }
    }
}

pub fn print_cascade(outcome: &CascadeOutcome) -> Result<(), AppError> {
    print_json(&CascadeReport::from(outcome))
}

/// One line per poll refresh: timestamp, key, compact value.
pub fn print_refresh(key: &QueryKey, value: &Value) -> Result<(), AppError> {
    let at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::unexpected(format!("failed to format timestamp: {e}")))?;
    println!("{at} {key} {value}");
    Ok(())
}
