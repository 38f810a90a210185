//! Coherence: client-side mutation and query-cache consistency engine.
//!
//! Mutations invalidate the cached queries they affect, multi-step workflows run as ordered
//! cascades with explicit partial-failure reporting, and aggregate counters refresh on a timer
//! and on focus. See [`cache::ConsistencyEngine`] for the entry point.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
