//! Application layer: error presentation for the binaries.

pub mod error;
