//! Polling refresh controller.
//!
//! Each watched key gets its own task that forces a refetch every interval, whatever the entry's
//! status. A focus-regained signal triggers an immediate refetch and restarts that key's timer.
//! Dropping a watcher aborts its task, so no timer outlives `unwatch`, `stop_all` or the
//! controller itself.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::keys::QueryKey;
use super::store::QueryCache;

const METRIC_POLL_REFETCH_TOTAL: &str = "coherence_poll_refetch_total";
const METRIC_POLL_WATCHERS: &str = "coherence_poll_watchers";

const FOCUS_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub refetch_on_regain_focus: bool,
}

impl PollConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            refetch_on_regain_focus: true,
        }
    }
}

struct Watcher {
    config: PollConfig,
    handle: JoinHandle<()>,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct PollingController {
    cache: Arc<QueryCache>,
    watchers: DashMap<QueryKey, Watcher>,
    focus: broadcast::Sender<()>,
}

impl PollingController {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        let (focus, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self {
            cache,
            watchers: DashMap::new(),
            focus,
        }
    }

    /// Start polling `key`, replacing any existing watcher for it.
    ///
    /// Must be called from within a tokio runtime. A zero interval is clamped to one
    /// millisecond.
    pub fn watch(&self, key: QueryKey, config: PollConfig) {
        let config = PollConfig {
            interval: config.interval.max(Duration::from_millis(1)),
            ..config
        };
        let handle = tokio::spawn(run_watcher(
            self.cache.clone(),
            key.clone(),
            config,
            self.focus.subscribe(),
        ));

        info!(key = %key, interval_ms = config.interval.as_millis() as u64, "Polling started");
        // The replaced watcher (if any) is dropped here, aborting its task.
        self.watchers.insert(key, Watcher { config, handle });
        self.report_watchers();
    }

    /// Stop polling `key`. Returns false if it was not watched.
    pub fn unwatch(&self, key: &QueryKey) -> bool {
        let removed = self.watchers.remove(key).is_some();
        if removed {
            debug!(key = %key, "Polling stopped");
            self.report_watchers();
        }
        removed
    }

    pub fn stop_all(&self) {
        self.watchers.clear();
        self.report_watchers();
    }

    /// Signal that the host regained focus. Returns the number of watchers notified.
    pub fn focus_regained(&self) -> usize {
        self.focus.send(()).unwrap_or(0)
    }

    pub fn is_watching(&self, key: &QueryKey) -> bool {
        self.watchers.contains_key(key)
    }

    pub fn config(&self, key: &QueryKey) -> Option<PollConfig> {
        self.watchers.get(key).map(|watcher| watcher.config)
    }

    pub fn watched(&self) -> Vec<QueryKey> {
        self.watchers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    fn report_watchers(&self) {
        gauge!(METRIC_POLL_WATCHERS).set(self.watchers.len() as f64);
    }
}

async fn run_watcher(
    cache: Arc<QueryCache>,
    key: QueryKey,
    config: PollConfig,
    mut focus: broadcast::Receiver<()>,
) {
    let period = config.interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => refresh(&cache, &key, "interval").await,
            received = focus.recv(), if config.refetch_on_regain_focus => match received {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    refresh(&cache, &key, "focus").await;
                    ticker.reset();
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

async fn refresh(cache: &Arc<QueryCache>, key: &QueryKey, trigger: &'static str) {
    counter!(METRIC_POLL_REFETCH_TOTAL, "trigger" => trigger).increment(1);
    match cache.refetch(key).await {
        Ok(_) => debug!(key = %key, trigger, "Poll refresh complete"),
        Err(err) => warn!(key = %key, trigger, error = %err, "Poll refresh failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::cache::store::{EntryStatus, FetcherRegistry, QueryFetcher};
    use crate::infra::gateway::GatewayError;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryFetcher for CountingFetcher {
        async fn fetch(&self, _key: &QueryKey) -> Result<Value, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "total": n }))
        }
    }

    fn setup() -> (Arc<CountingFetcher>, Arc<QueryCache>, PollingController) {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(QueryCache::new(FetcherRegistry::uniform(fetcher.clone())));
        let controller = PollingController::new(cache.clone());
        (fetcher, cache, controller)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interval_refetches_fresh_entry() {
        let (fetcher, cache, controller) = setup();
        let key = QueryKey::notification_counts();
        cache.write(&key, json!({ "total": 0 }));

        controller.watch(key.clone(), PollConfig::every(Duration::from_millis(30_000)));
        settle().await;

        advance(29_999).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

        advance(1).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.status(&key), Some(EntryStatus::Fresh));

        advance(30_000).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_refetches_and_restarts_timer() {
        let (fetcher, _cache, controller) = setup();
        let key = QueryKey::notification_counts();
        controller.watch(key.clone(), PollConfig::every(Duration::from_millis(30_000)));
        settle().await;

        advance(10_000).await;
        assert_eq!(controller.focus_regained(), 1);
        settle().await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        // The old deadline at 30s no longer applies; the next tick is 30s after the focus event.
        advance(25_000).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        advance(5_000).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_is_ignored_when_disabled() {
        let (fetcher, _cache, controller) = setup();
        let key = QueryKey::notification_unread_count();
        controller.watch(
            key,
            PollConfig {
                interval: Duration::from_millis(30_000),
                refetch_on_regain_focus: false,
            },
        );
        settle().await;

        controller.focus_regained();
        settle().await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_cancels_timers() {
        let (fetcher, _cache, controller) = setup();
        let key = QueryKey::notification_counts();
        controller.watch(key.clone(), PollConfig::every(Duration::from_millis(1_000)));
        settle().await;
        assert!(controller.is_watching(&key));

        assert!(controller.unwatch(&key));
        assert!(!controller.unwatch(&key));
        advance(10_000).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(controller.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rewatch_replaces_previous_watcher() {
        let (fetcher, _cache, controller) = setup();
        let key = QueryKey::notification_counts();
        controller.watch(key.clone(), PollConfig::every(Duration::from_millis(1_000)));
        controller.watch(key.clone(), PollConfig::every(Duration::from_millis(5_000)));
        settle().await;

        assert_eq!(controller.len(), 1);
        assert_eq!(
            controller.config(&key).map(|c| c.interval),
            Some(Duration::from_millis(5_000))
        );

        advance(4_000).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        advance(1_000).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_tears_down_every_watcher() {
        let (fetcher, _cache, controller) = setup();
        controller.watch(
            QueryKey::notification_counts(),
            PollConfig::every(Duration::from_millis(1_000)),
        );
        controller.watch(
            QueryKey::notification_unread_count(),
            PollConfig::every(Duration::from_millis(1_000)),
        );
        settle().await;

        controller.stop_all();
        assert!(controller.is_empty());
        advance(5_000).await;
        assert_eq!(controller.focus_regained(), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
