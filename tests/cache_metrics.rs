use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coherence::cache::{
    CascadeSpec, ConsistencyEngine, EngineConfig, KeyPattern, Namespace, PollConfig, QueryKey,
};
use coherence::domain::mutation::{Mutation, MutationKind};
use coherence::infra::gateway::{Gateway, GatewayError, Operation};
use coherence::infra::telemetry;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::{Value, json};

struct CountingGateway {
    requests: AtomicUsize,
}

#[async_trait]
impl Gateway for CountingGateway {
    async fn request(&self, operation: &Operation, _params: Value) -> Result<Value, GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match operation {
            Operation::Mutation(MutationKind::DeleteUserMessages) => {
                Err(GatewayError::transport("storage offline"))
            }
            Operation::Query(_) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(json!({ "total": 1 }))
            }
            Operation::Mutation(_) => Ok(json!({})),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let gateway = Arc::new(CountingGateway {
        requests: AtomicUsize::new(0),
    });
    let engine =
        ConsistencyEngine::new(gateway.clone(), EngineConfig::default()).expect("engine");

    // Fetch + dedup
    let key = QueryKey::notifications();
    let (a, b) = tokio::join!(engine.fetch(&key), engine.fetch(&key));
    a.expect("first fetch");
    b.expect("second fetch");

    // Mutation latency, outcome and invalidation
    engine
        .execute(&Mutation::MarkAllRead)
        .await
        .expect("mark all read");
    assert!(engine.cache().invalidate(&KeyPattern::from(Namespace::Notifications)) > 0);

    // Cascade outcome
    let outcome = engine
        .run_cascade(&CascadeSpec::ban_with_message_deletion("u1", None, true))
        .await;
    assert!(!outcome.is_success());

    // Poll refetch + watcher gauge
    engine.watch(
        QueryKey::notification_counts(),
        PollConfig::every(Duration::from_millis(20)),
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.reset_session();

    assert!(gateway.requests.load(Ordering::SeqCst) >= 4);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "coherence_cache_fetch_total",
        "coherence_cache_dedup_total",
        "coherence_cache_invalidated_total",
        "coherence_mutation_total",
        "coherence_mutation_ms",
        "coherence_cascade_total",
        "coherence_poll_refetch_total",
        "coherence_poll_watchers",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
