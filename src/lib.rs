#![forbid(unsafe_code)]

//! tallyd: a line-oriented JSON counter server.
//!
//! Clients connect over TCP, register and authenticate with a username and
//! password, then accumulate named integer counters that only they can see.
//! Credentials and counters are kept in two JSON snapshot files that are
//! rewritten atomically on every change.

pub mod auth;
pub mod config;
pub mod counters;
pub mod protocol;
pub mod server;
pub mod session;
pub mod snapshot;

pub use config::Config;
pub use server::{AppState, Server};
pub use session::Session;
