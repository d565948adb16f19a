pub mod chat;
pub mod config;
pub mod source;
pub mod status;

pub use chat::{Author, Badge, ChatItem, DedupKey, EnrichedItem, SourceMeta};
pub use config::{
    Config, FeedConfig, IntakeConfig, LogFormat, LoggingConfig, PerformanceConfig,
    PersistenceConfig, RotationPolicy, StatusConfig, SupervisorConfig,
};
pub use source::{SourceConfig, SourceId};
pub use status::{CoordinatorState, SourceStatus};
