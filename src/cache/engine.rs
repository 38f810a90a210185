//! Session-scoped consistency engine.
//!
//! Wires the query cache, invalidation graph, mutation executor, cascade orchestrator and polling
//! controller together, and exposes one convenience method per user-facing operation.

use std::sync::Arc;

use coherence_api_types::NotificationPreferences;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::mutation::{Mutation, MutationKind};
use crate::infra::gateway::{Gateway, GatewayError};

use super::cascade::{CascadeOrchestrator, CascadeOutcome, CascadeSpec, CascadeState};
use super::config::EngineConfig;
use super::executor::{MutationError, MutationExecutor};
use super::graph::{ConfigurationError, InvalidationGraph};
use super::keys::QueryKey;
use super::polling::{PollConfig, PollingController};
use super::store::{
    CacheEntry, CacheRead, EntryStatus, FetchError, FetcherRegistry, GatewayFetcher, QueryCache,
};

/// One engine per signed-in session.
///
/// # Usage
///
/// ```ignore
/// let engine = ConsistencyEngine::new(gateway, EngineConfig::default())?;
/// let outcome = engine.ban_user("u1", Some("spam".into()), true).await;
/// println!("{}", outcome.summary());
/// ```
pub struct ConsistencyEngine {
    config: EngineConfig,
    cache: Arc<QueryCache>,
    graph: Arc<InvalidationGraph>,
    executor: Arc<MutationExecutor>,
    orchestrator: CascadeOrchestrator,
    poller: PollingController,
}

impl ConsistencyEngine {
    /// Build an engine with the standard graph, fetching every namespace through `gateway`.
    pub fn new(gateway: Arc<dyn Gateway>, config: EngineConfig) -> Result<Self, ConfigurationError> {
        let fetchers = FetcherRegistry::uniform(Arc::new(GatewayFetcher::new(gateway.clone())));
        Self::with_parts(gateway, config, InvalidationGraph::standard()?, fetchers)
    }

    /// Build an engine from explicit parts.
    ///
    /// Fails if the graph misses a mutation kind or a namespace has no fetcher.
    pub fn with_parts(
        gateway: Arc<dyn Gateway>,
        config: EngineConfig,
        graph: InvalidationGraph,
        fetchers: FetcherRegistry,
    ) -> Result<Self, ConfigurationError> {
        for kind in MutationKind::ALL {
            graph.lookup(kind)?;
        }
        if let Some(namespace) = fetchers.missing().into_iter().next() {
            return Err(ConfigurationError::MissingFetcher(namespace));
        }

        let cache = Arc::new(QueryCache::new(fetchers));
        let graph = Arc::new(graph);
        let executor = Arc::new(MutationExecutor::new(
            gateway,
            cache.clone(),
            graph.clone(),
        ));
        let orchestrator = CascadeOrchestrator::new(executor.clone());
        let poller = PollingController::new(cache.clone());

        debug!("Consistency engine assembled");
        Ok(Self {
            config,
            cache,
            graph,
            executor,
            orchestrator,
            poller,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &InvalidationGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn poller(&self) -> &PollingController {
        &self.poller
    }

    // Mutations

    pub async fn execute(&self, mutation: &Mutation) -> Result<Value, MutationError> {
        self.executor.execute(mutation).await
    }

    pub async fn run_cascade(&self, spec: &CascadeSpec) -> CascadeOutcome {
        self.orchestrator.run(spec).await
    }

    pub async fn run_cascade_with_progress(
        &self,
        spec: &CascadeSpec,
        progress: &watch::Sender<CascadeState>,
    ) -> CascadeOutcome {
        self.orchestrator.run_with_progress(spec, progress).await
    }

    /// Ban a user and, when requested, delete their messages afterwards.
    pub async fn ban_user(
        &self,
        user_id: &str,
        reason: Option<String>,
        delete_messages: bool,
    ) -> CascadeOutcome {
        let spec = CascadeSpec::ban_with_message_deletion(user_id, reason, delete_messages);
        self.orchestrator.run(&spec).await
    }

    pub async fn unban_user(&self, user_id: &str) -> Result<Value, MutationError> {
        self.execute(&Mutation::UnbanUser {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn update_user_role(&self, user_id: &str, role: &str) -> Result<Value, MutationError> {
        self.execute(&Mutation::UpdateUserRole {
            user_id: user_id.to_string(),
            role: role.to_string(),
        })
        .await
    }

    pub async fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> Result<Value, MutationError> {
        self.execute(&Mutation::MarkNotificationRead {
            notification_id: notification_id.to_string(),
        })
        .await
    }

    pub async fn mark_all_read(&self) -> Result<Value, MutationError> {
        self.execute(&Mutation::MarkAllRead).await
    }

    pub async fn delete_notification(&self, notification_id: &str) -> Result<Value, MutationError> {
        self.execute(&Mutation::DeleteNotification {
            notification_id: notification_id.to_string(),
        })
        .await
    }

    pub async fn delete_all_notifications(&self) -> Result<Value, MutationError> {
        self.execute(&Mutation::DeleteAllNotifications).await
    }

    pub async fn update_notification_preferences(
        &self,
        preferences: NotificationPreferences,
    ) -> Result<Value, MutationError> {
        self.execute(&Mutation::UpdateNotificationPreferences(preferences))
            .await
    }

    // Queries

    /// Key for a user search, falling back to the configured page size.
    pub fn user_search_key(&self, search: Option<&str>, limit: Option<u32>) -> QueryKey {
        let limit = limit.unwrap_or(self.config.user_search_limit.get());
        QueryKey::user_search(search, limit)
    }

    pub fn read(&self, key: &QueryKey) -> CacheRead {
        self.cache.read(key)
    }

    pub async fn fetch(&self, key: &QueryKey) -> Result<Value, FetchError> {
        self.cache.fetch(key).await
    }

    /// Fetch and decode into a wire type.
    pub async fn fetch_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<T, FetchError> {
        let value = self.cache.fetch(key).await?;
        serde_json::from_value(value)
            .map_err(|err| FetchError::Gateway(GatewayError::Decode(err.to_string())))
    }

    pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
        self.cache.status(key)
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.cache.entry(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    // Polling

    pub fn watch(&self, key: QueryKey, config: PollConfig) {
        self.poller.watch(key, config);
    }

    pub fn unwatch(&self, key: &QueryKey) -> bool {
        self.poller.unwatch(key)
    }

    pub fn watch_notification_counts(&self) {
        self.poller.watch(
            QueryKey::notification_counts(),
            self.config.notification_counts_poll,
        );
    }

    pub fn watch_unread_count(&self) {
        self.poller.watch(
            QueryKey::notification_unread_count(),
            self.config.unread_count_poll,
        );
    }

    pub fn focus_regained(&self) -> usize {
        self.poller.focus_regained()
    }

    /// Logout: stop every watcher, then drop all cached state.
    pub fn reset_session(&self) {
        self.poller.stop_all();
        self.cache.clear();
        info!("Session reset: watchers stopped and cache cleared");
    }
}
