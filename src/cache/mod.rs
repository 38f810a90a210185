//! Coherence cache system
//!
//! Keeps client-side query results consistent with server-side mutations:
//!
//! - **Query cache** (`store`): keyed results with Fresh/Stale/Fetching/Errored status and
//!   per-key fetch deduplication
//! - **Invalidation graph** (`graph`): which query keys each mutation kind makes stale
//! - **Executor** (`executor`): one request per mutation, invalidation only on success
//! - **Cascades** (`cascade`): ordered multi-step mutations with partial-failure reporting
//! - **Polling** (`polling`): interval and focus-driven refetches
//!
//! `ConsistencyEngine` owns one of each for a signed-in session.
//!
//! ## Configuration
//!
//! Polling cadence and query defaults come from the `[polling]` and `[cache]` sections:
//!
//! ```toml
//! [polling]
//! notification_counts_interval_ms = 30000
//! unread_count_interval_ms = 30000
//! refetch_on_focus = true
//!
//! [cache]
//! user_search_limit = 20
//! ```

mod cascade;
mod config;
mod engine;
mod executor;
mod graph;
mod keys;
mod lock;
mod planner;
mod polling;
mod store;

pub use cascade::{
    CascadeFailure, CascadeOrchestrator, CascadeOutcome, CascadePolicy, CascadeSpec, CascadeState,
    CascadeStep, InputBuilder, StepFailure,
};
pub use config::EngineConfig;
pub use engine::ConsistencyEngine;
pub use executor::{MutationError, MutationExecutor};
pub use graph::{ConfigurationError, InvalidationGraph, InvalidationGraphBuilder};
pub use keys::{KeyPattern, Namespace, QueryKey};
pub use planner::InvalidationPlan;
pub use polling::{PollConfig, PollingController};
pub use store::{
    CacheEntry, CacheRead, EntryStatus, FetchError, FetcherRegistry, GatewayFetcher, QueryCache,
    QueryFetcher,
};
