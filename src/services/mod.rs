//! Service layer: the aggregation pipeline.
//!
//! Workers append to per-source artifacts, intake readers turn growth into
//! queued items, the merge scheduler folds queues into one bounded feed and
//! the persistence writer publishes it. The channel supervisor and the
//! coordinator keep the whole set of sources running.

pub mod channel_supervisor;
pub mod coordinator;
pub mod intake_reader;
pub mod merge_scheduler;
pub mod persistence_writer;
pub mod source_queue;
pub mod status_reporter;
pub mod stop_flag;
pub mod timers;

pub use channel_supervisor::{ChannelSupervisor, RestartOutcome};
pub use coordinator::{Coordinator, MonitorReport};
pub use intake_reader::{IntakeReader, PollOutcome, RestartRequests, SourceActivity};
pub use merge_scheduler::{fair_trim, FeedState, MergeOutcome, MergeScheduler};
pub use persistence_writer::{PersistenceWriter, PublishMode};
pub use source_queue::{SourceQueue, SourceQueues};
pub use status_reporter::{read_status_token, write_status_token, StatusReporter};
pub use stop_flag::StopFlag;
pub use timers::{Cooldown, InactivityTimer};
