//! multichat - multi-source chat aggregation coordinator
//!
//! Supervises one scraping worker per chat source, ingests what each worker
//! appends to its artifact, and merges everything into a single bounded,
//! time-ordered, de-duplicated feed for a display layer.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): chat and source models, errors, the worker port
//! - **Service Layer** (`services`): intake, supervision, merging, persistence
//! - **Infrastructure Layer** (`infrastructure`): config, logging, processes, artifacts
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use multichat::{ConfigLoader, Coordinator};
//! use multichat::infrastructure::process::CommandLauncher;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let launcher = Arc::new(CommandLauncher::from_config(&config.supervisor));
//!     let mut coordinator = Coordinator::new(config, launcher)?;
//!     coordinator.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ChatItem, Config, CoordinatorState, DedupKey, EnrichedItem, SourceConfig, SourceId,
    SourceStatus,
};
pub use domain::ports::{WorkerLauncher, WorkerProcess};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ChannelSupervisor, Coordinator, FeedState, MergeScheduler, PersistenceWriter};
