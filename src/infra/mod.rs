//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod gateway;
pub mod http;
pub mod session;
pub mod telemetry;
