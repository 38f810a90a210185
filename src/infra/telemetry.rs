use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Runs once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "coherence_cache_fetch_total",
            Unit::Count,
            "Total number of underlying query fetches issued."
        );
        describe_counter!(
            "coherence_cache_dedup_total",
            Unit::Count,
            "Total number of reads that joined an in-flight fetch."
        );
        describe_counter!(
            "coherence_cache_invalidated_total",
            Unit::Count,
            "Total number of cache entries marked stale."
        );
        describe_counter!(
            "coherence_mutation_total",
            Unit::Count,
            "Total number of mutations, by kind and outcome."
        );
        describe_histogram!(
            "coherence_mutation_ms",
            Unit::Milliseconds,
            "Mutation round-trip latency in milliseconds."
        );
        describe_counter!(
            "coherence_cascade_total",
            Unit::Count,
            "Total number of finished cascades, by terminal status."
        );
        describe_counter!(
            "coherence_poll_refetch_total",
            Unit::Count,
            "Total number of polling refetches, by trigger."
        );
        describe_gauge!(
            "coherence_poll_watchers",
            Unit::Count,
            "Current number of live polling watchers."
        );
    });
}
