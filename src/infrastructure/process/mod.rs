//! Worker process management
//!
//! Spawns scraper workers with `tokio::process` and stops them with
//! SIGTERM, escalating to a kill after a grace period.

pub mod launcher;

pub use launcher::{ChildWorker, CommandLauncher};
