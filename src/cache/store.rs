//! Query cache storage.
//!
//! One entry per `QueryKey`, each carrying its last value, fetch time and status. Fetches are
//! delegated to a `QueryFetcher` registered per namespace and run on spawned tasks, so a dropped
//! caller never leaves an entry stuck in `Fetching`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, instrument, warn};

use crate::infra::gateway::{Gateway, GatewayError, Operation};

use super::keys::{KeyPattern, Namespace, QueryKey};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

const METRIC_FETCH_TOTAL: &str = "coherence_cache_fetch_total";
const METRIC_DEDUP_TOTAL: &str = "coherence_cache_dedup_total";
const METRIC_INVALIDATED_TOTAL: &str = "coherence_cache_invalidated_total";

const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Fresh,
    Stale,
    Fetching,
    Errored,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryStatus::Fresh => "fresh",
            EntryStatus::Stale => "stale",
            EntryStatus::Fetching => "fetching",
            EntryStatus::Errored => "errored",
        };
        f.write_str(label)
    }
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub value: Option<Value>,
    pub fetched_at: Option<OffsetDateTime>,
    pub status: EntryStatus,
    /// Error of the last failed fetch, cleared by the next success.
    pub error: Option<FetchError>,
}

/// Result of a non-blocking `read`.
#[derive(Debug, Clone)]
pub struct CacheRead {
    /// Last known value, possibly outdated.
    pub value: Option<Value>,
    pub status: EntryStatus,
    /// True when a fetch for this key is in flight after the read returns.
    pub fetching: bool,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("no fetcher registered for namespace `{0}`")]
    NoFetcher(Namespace),
    #[error("fetch abandoned: cache was cleared")]
    Abandoned,
}

type FetchOutcome = Result<Value, FetchError>;

/// Loads the authoritative value for a key.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, GatewayError>;
}

/// Fetcher that forwards every key to the network gateway as a query operation.
pub struct GatewayFetcher {
    gateway: Arc<dyn Gateway>,
}

impl GatewayFetcher {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl QueryFetcher for GatewayFetcher {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, GatewayError> {
        self.gateway
            .request(&Operation::Query(key.clone()), Value::Null)
            .await
    }
}

/// Per-namespace fetcher table.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<Namespace, Arc<dyn QueryFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one fetcher for every namespace.
    pub fn uniform(fetcher: Arc<dyn QueryFetcher>) -> Self {
        let mut registry = Self::new();
        for namespace in Namespace::ALL {
            registry.register(namespace, fetcher.clone());
        }
        registry
    }

    pub fn register(&mut self, namespace: Namespace, fetcher: Arc<dyn QueryFetcher>) {
        self.fetchers.insert(namespace, fetcher);
    }

    pub fn get(&self, namespace: Namespace) -> Option<Arc<dyn QueryFetcher>> {
        self.fetchers.get(&namespace).cloned()
    }

    /// Namespaces that have no fetcher.
    pub fn missing(&self) -> Vec<Namespace> {
        Namespace::ALL
            .into_iter()
            .filter(|ns| !self.fetchers.contains_key(ns))
            .collect()
    }
}

struct Slot {
    value: Option<Value>,
    fetched_at: Option<OffsetDateTime>,
    status: EntryStatus,
    error: Option<FetchError>,
    /// Bumped by every invalidation and write. Only a fetch started on the current generation
    /// may be joined or may replace the value.
    generation: u64,
    /// Id source for fetches started on this slot.
    fetches: u64,
    /// Newest fetch still running, if any.
    in_flight: Option<Ticket>,
    waiters: Vec<oneshot::Sender<FetchOutcome>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            value: None,
            fetched_at: None,
            status: EntryStatus::Stale,
            error: None,
            generation: 0,
            fetches: 0,
            in_flight: None,
            waiters: Vec::new(),
        }
    }

    /// A running fetch can be joined only if nothing invalidated or overwrote the entry since
    /// it started.
    fn joinable(&self) -> bool {
        self.in_flight
            .is_some_and(|ticket| ticket.generation == self.generation)
    }

    fn snapshot(&self, key: &QueryKey) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            value: self.value.clone(),
            fetched_at: self.fetched_at,
            status: self.status,
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
struct Table {
    slots: HashMap<QueryKey, Slot>,
    /// Bumped by `clear`; fetches started under an older session are discarded.
    session: u64,
}

#[derive(Clone, Copy)]
struct Ticket {
    session: u64,
    fetch: u64,
    generation: u64,
}

enum FetchPlan {
    Ready(Value),
    Wait(oneshot::Receiver<FetchOutcome>),
    Start(oneshot::Receiver<FetchOutcome>, Ticket),
}

/// Keyed store of fetched results with staleness tracking and request deduplication.
pub struct QueryCache {
    table: Mutex<Table>,
    fetchers: FetcherRegistry,
    updates: broadcast::Sender<QueryKey>,
}

impl QueryCache {
    pub fn new(fetchers: FetcherRegistry) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            table: Mutex::new(Table::default()),
            fetchers,
            updates,
        }
    }

    /// Receive the key of every entry that gets a new value, from a fetch or a `write`.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.updates.subscribe()
    }

    pub fn fetchers(&self) -> &FetcherRegistry {
        &self.fetchers
    }

    /// Non-blocking read.
    ///
    /// Returns the current value immediately. If the entry is absent, stale or errored, a fetch
    /// is started in the background; a fetch already running is joined instead, unless the entry
    /// was invalidated after that fetch started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn read(self: &Arc<Self>, key: &QueryKey) -> CacheRead {
        let (read, start) = {
            let mut table = mutex_lock(&self.table, SOURCE, "read");
            let session = table.session;
            let slot = table.slots.entry(key.clone()).or_insert_with(Slot::empty);

            if slot.joinable() {
                counter!(METRIC_DEDUP_TOTAL, "namespace" => key.namespace().as_str())
                    .increment(1);
                (
                    CacheRead {
                        value: slot.value.clone(),
                        status: slot.status,
                        fetching: true,
                    },
                    None,
                )
            } else if slot.status == EntryStatus::Fresh {
                (
                    CacheRead {
                        value: slot.value.clone(),
                        status: slot.status,
                        fetching: false,
                    },
                    None,
                )
            } else {
                let previous = slot.value.clone();
                let ticket = Self::mark_fetching(slot, session);
                (
                    CacheRead {
                        value: previous,
                        status: EntryStatus::Fetching,
                        fetching: true,
                    },
                    Some(ticket),
                )
            }
        };

        if let Some(ticket) = start {
            self.spawn_fetch(key.clone(), ticket);
        }
        read
    }

    /// Return a fresh value, fetching (or joining an in-flight fetch) when needed.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn fetch(self: &Arc<Self>, key: &QueryKey) -> Result<Value, FetchError> {
        self.fetch_with(key, false).await
    }

    /// Fetch regardless of staleness. Joins a fetch already running on the current generation
    /// instead of issuing a second one.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn refetch(self: &Arc<Self>, key: &QueryKey) -> Result<Value, FetchError> {
        self.fetch_with(key, true).await
    }

    async fn fetch_with(self: &Arc<Self>, key: &QueryKey, force: bool) -> FetchOutcome {
        let receiver = match self.plan_fetch(key, force) {
            FetchPlan::Ready(value) => return Ok(value),
            FetchPlan::Wait(receiver) => receiver,
            FetchPlan::Start(receiver, ticket) => {
                self.spawn_fetch(key.clone(), ticket);
                receiver
            }
        };
        receiver.await.unwrap_or(Err(FetchError::Abandoned))
    }

    fn plan_fetch(&self, key: &QueryKey, force: bool) -> FetchPlan {
        let mut table = mutex_lock(&self.table, SOURCE, "plan_fetch");
        let session = table.session;
        let slot = table.slots.entry(key.clone()).or_insert_with(Slot::empty);

        if slot.joinable() {
            counter!(METRIC_DEDUP_TOTAL, "namespace" => key.namespace().as_str()).increment(1);
            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);
            return FetchPlan::Wait(rx);
        }

        if !force
            && slot.status == EntryStatus::Fresh
            && let Some(value) = slot.value.clone()
        {
            return FetchPlan::Ready(value);
        }

        let ticket = Self::mark_fetching(slot, session);
        let (tx, rx) = oneshot::channel();
        slot.waiters.push(tx);
        FetchPlan::Start(rx, ticket)
    }

    /// Start a fetch on the current generation. An older fetch still running is superseded:
    /// its result is discarded when it lands.
    fn mark_fetching(slot: &mut Slot, session: u64) -> Ticket {
        slot.fetches += 1;
        let ticket = Ticket {
            session,
            fetch: slot.fetches,
            generation: slot.generation,
        };
        slot.in_flight = Some(ticket);
        slot.status = EntryStatus::Fetching;
        ticket
    }

    fn spawn_fetch(self: &Arc<Self>, key: QueryKey, ticket: Ticket) {
        counter!(METRIC_FETCH_TOTAL, "namespace" => key.namespace().as_str()).increment(1);

        let Some(fetcher) = self.fetchers.get(key.namespace()) else {
            warn!(key = %key, "No fetcher registered for namespace");
            self.complete(&key, ticket, Err(FetchError::NoFetcher(key.namespace())));
            return;
        };

        debug!(key = %key, "Cache fetch started");
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = fetcher.fetch(&key).await.map_err(FetchError::from);
            cache.complete(&key, ticket, outcome);
        });
    }

    fn complete(&self, key: &QueryKey, ticket: Ticket, outcome: FetchOutcome) {
        let (waiters, delivered, updated) = {
            let mut table = mutex_lock(&self.table, SOURCE, "complete");
            if table.session != ticket.session {
                debug!(key = %key, "Discarding fetch result from a cleared session");
                return;
            }
            let Some(slot) = table.slots.get_mut(key) else {
                return;
            };
            if slot.in_flight.map(|running| running.fetch) != Some(ticket.fetch) {
                // Waiters stay queued for the newer fetch.
                debug!(key = %key, "Discarding result of a superseded fetch");
                return;
            }

            slot.in_flight = None;
            let current = slot.generation == ticket.generation;
            let written = !current && slot.status == EntryStatus::Fresh;
            let delivered = if written {
                debug!(key = %key, "Keeping value written while the fetch ran");
                slot.value.clone().map_or_else(|| outcome.clone(), Ok)
            } else {
                match &outcome {
                    Ok(value) => {
                        slot.value = Some(value.clone());
                        slot.fetched_at = Some(OffsetDateTime::now_utc());
                        slot.error = None;
                        slot.status = if current {
                            EntryStatus::Fresh
                        } else {
                            EntryStatus::Stale
                        };
                        debug!(key = %key, status = %slot.status, "Cache fetch complete");
                    }
                    Err(err) => {
                        slot.error = Some(err.clone());
                        if current {
                            slot.status = EntryStatus::Errored;
                        }
                        warn!(key = %key, error = %err, "Cache fetch failed");
                    }
                }
                outcome.clone()
            };
            let updated = outcome.is_ok() && !written;
            (std::mem::take(&mut slot.waiters), delivered, updated)
        };

        if updated {
            let _ = self.updates.send(key.clone());
        }
        for waiter in waiters {
            let _ = waiter.send(delivered.clone());
        }
    }

    /// Mark every entry matching `pattern` stale. Returns how many entries matched.
    ///
    /// Invalidating a key that was never populated is a no-op.
    pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
        let mut table = mutex_lock(&self.table, SOURCE, "invalidate");
        let mut count = 0;
        for (key, slot) in table.slots.iter_mut() {
            if pattern.matches(key) {
                slot.generation += 1;
                slot.status = EntryStatus::Stale;
                count += 1;
            }
        }
        if count > 0 {
            counter!(METRIC_INVALIDATED_TOTAL, "namespace" => pattern.namespace().as_str())
                .increment(count as u64);
        }
        count
    }

    /// Store a value as fresh, e.g. from a poll or an optimistic cascade step.
    ///
    /// A fetch already running when the write happens does not replace the written value.
    pub fn write(&self, key: &QueryKey, value: Value) {
        {
            let mut table = mutex_lock(&self.table, SOURCE, "write");
            let slot = table.slots.entry(key.clone()).or_insert_with(Slot::empty);
            slot.generation += 1;
            slot.value = Some(value);
            slot.fetched_at = Some(OffsetDateTime::now_utc());
            slot.error = None;
            slot.status = EntryStatus::Fresh;
        }
        let _ = self.updates.send(key.clone());
    }

    pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
        mutex_lock(&self.table, SOURCE, "status")
            .slots
            .get(key)
            .map(|slot| slot.status)
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        mutex_lock(&self.table, SOURCE, "entry")
            .slots
            .get(key)
            .map(|slot| slot.snapshot(key))
    }

    /// Keys currently held, in no particular order.
    pub fn keys(&self) -> Vec<QueryKey> {
        mutex_lock(&self.table, SOURCE, "keys")
            .slots
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.table, SOURCE, "len").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry (logout). Pending waiters receive `FetchError::Abandoned`.
    pub fn clear(&self) {
        let slots = {
            let mut table = mutex_lock(&self.table, SOURCE, "clear");
            table.session += 1;
            std::mem::take(&mut table.slots)
        };
        for (_, slot) in slots {
            for waiter in slot.waiters {
                let _ = waiter.send(Err(FetchError::Abandoned));
            }
        }
    }
}
