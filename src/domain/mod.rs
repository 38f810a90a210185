//! Domain model: the mutations a client can issue.

pub mod mutation;
