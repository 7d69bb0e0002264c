//! Approval Relay — library crate for the bot server, the decision endpoint,
//! and integration testing.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod api;
pub mod approval;
pub mod bot;
pub mod config;
pub mod errors;
pub mod models;
pub mod notification;
pub mod store;
