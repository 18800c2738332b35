//! termlink: term occurrence reconciliation service.
//!
//! Wires the termlink_core pipeline to the Postgres adapters and runs the
//! scheduled orphan sweeper. The `termlink` binary is the command-line entry point.

pub mod config;
pub mod worker;

pub use config::ServiceConfig;
pub use worker::spawn_orphan_sweeper;
