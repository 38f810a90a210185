#![deny(clippy::all, clippy::pedantic)]

pub mod notifications;
pub mod users;
pub mod watch;
