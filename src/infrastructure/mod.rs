//! Infrastructure layer module
//!
//! Adapters between the coordinator and the outside world:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Worker process management (tokio::process)
//! - Source artifact parsing
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod artifact;
pub mod config;
pub mod logging;
pub mod process;
