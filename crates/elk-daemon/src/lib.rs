//! elk-daemon library target.
//!
//! Exposes the coordinator, router and state for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod connection;
pub mod coordinator;
pub mod presence;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod ws;
