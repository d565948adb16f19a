use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::source::SourceConfig;

/// Main configuration structure for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Master switch; a disabled config refuses to start
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ordered list of chat sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Merged feed configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Per-source artifact polling
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Worker process supervision
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Merge throttling for very busy sources
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Feed artifact publishing
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Status artifact
    #[serde(default)]
    pub status: StatusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![],
            feed: FeedConfig::default(),
            intake: IntakeConfig::default(),
            supervisor: SupervisorConfig::default(),
            performance: PerformanceConfig::default(),
            persistence: PersistenceConfig::default(),
            status: StatusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Enabled sources with a usable prefix, name and target, in config order.
    pub fn active_sources(&self) -> Vec<SourceConfig> {
        self.sources
            .iter()
            .filter(|s| s.enabled && s.is_valid())
            .cloned()
            .collect()
    }

    /// Feed capacity for the given number of active sources.
    pub fn feed_capacity(&self, active_sources: usize) -> usize {
        if self.feed.scale_with_sources {
            self.feed
                .max_messages
                .saturating_mul(active_sources)
                .max(self.feed.min_total_messages)
        } else {
            self.feed.max_messages
        }
    }
}

/// Merged feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FeedConfig {
    /// Path of the merged feed artifact read by the display layer
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Feed capacity; per source when `scale_with_sources` is set
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Capacity becomes `max(max_messages * sources, min_total_messages)`
    #[serde(default = "default_true")]
    pub scale_with_sources: bool,

    #[serde(default = "default_min_total_messages")]
    pub min_total_messages: usize,

    /// Lower bound of each source's share when trimming
    #[serde(default = "default_min_per_source")]
    pub min_per_source: usize,

    #[serde(default = "default_merge_interval_ms")]
    pub merge_interval_ms: u64,

    /// Batches larger than this are logged as anomalies
    #[serde(default = "default_burst_warning_threshold")]
    pub burst_warning_threshold: usize,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("messages.json")
}

const fn default_max_messages() -> usize {
    50
}

const fn default_min_total_messages() -> usize {
    100
}

const fn default_min_per_source() -> usize {
    5
}

const fn default_merge_interval_ms() -> u64 {
    500
}

const fn default_burst_warning_threshold() -> usize {
    400
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            max_messages: default_max_messages(),
            scale_with_sources: true,
            min_total_messages: default_min_total_messages(),
            min_per_source: default_min_per_source(),
            merge_interval_ms: default_merge_interval_ms(),
            burst_warning_threshold: default_burst_warning_threshold(),
        }
    }
}

impl FeedConfig {
    pub const fn merge_interval(&self) -> Duration {
        Duration::from_millis(self.merge_interval_ms)
    }
}

/// Per-source artifact polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IntakeConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Queue depth above which the oldest items are shed
    #[serde(default = "default_queue_soft_limit")]
    pub queue_soft_limit: usize,

    /// Number of items shed at once
    #[serde(default = "default_queue_shed_batch")]
    pub queue_shed_batch: usize,

    /// Silence after which a live worker is considered stalled
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Consecutive read failures tolerated before warning
    #[serde(default = "default_error_warning_threshold")]
    pub error_warning_threshold: u32,

    /// Appends larger than this in one poll are logged
    #[serde(default = "default_high_activity_threshold")]
    pub high_activity_threshold: usize,
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_queue_soft_limit() -> usize {
    500
}

const fn default_queue_shed_batch() -> usize {
    50
}

const fn default_inactivity_timeout_secs() -> u64 {
    600
}

const fn default_error_warning_threshold() -> u32 {
    10
}

const fn default_high_activity_threshold() -> usize {
    200
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            queue_soft_limit: default_queue_soft_limit(),
            queue_shed_batch: default_queue_shed_batch(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            error_warning_threshold: default_error_warning_threshold(),
            high_activity_threshold: default_high_activity_threshold(),
        }
    }
}

impl IntakeConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Worker process supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Worker executable
    #[serde(default = "default_worker_command")]
    pub worker_command: String,

    /// Arguments placed before `<target> --output <artifact>`
    #[serde(default)]
    pub worker_args: Vec<String>,

    /// Extra environment variables for workers
    #[serde(default)]
    pub worker_env: BTreeMap<String, String>,

    /// Inherited environment variables removed before spawning
    #[serde(default)]
    pub worker_env_remove: Vec<String>,

    /// Directory holding per-source artifacts
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Minimum interval between restarts of the same source
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,

    /// Time a worker gets to exit after SIGTERM before it is killed
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    /// Pause between stopping and restarting everything after a total outage
    #[serde(default = "default_full_restart_delay_secs")]
    pub full_restart_delay_secs: u64,

    /// Minimum interval between two full restarts
    #[serde(default = "default_full_restart_cooldown_secs")]
    pub full_restart_cooldown_secs: u64,

    /// Queue depth reported as a backlog by the monitor
    #[serde(default = "default_queue_warning_depth")]
    pub queue_warning_depth: usize,
}

fn default_worker_command() -> String {
    "chat-worker".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".multichat/sources")
}

const fn default_restart_cooldown_secs() -> u64 {
    60
}

const fn default_grace_period_secs() -> u64 {
    5
}

const fn default_monitor_interval_secs() -> u64 {
    10
}

const fn default_full_restart_delay_secs() -> u64 {
    5
}

const fn default_full_restart_cooldown_secs() -> u64 {
    60
}

const fn default_queue_warning_depth() -> usize {
    50
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_command: default_worker_command(),
            worker_args: vec![],
            worker_env: BTreeMap::new(),
            worker_env_remove: vec![],
            artifact_dir: default_artifact_dir(),
            restart_cooldown_secs: default_restart_cooldown_secs(),
            grace_period_secs: default_grace_period_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            full_restart_delay_secs: default_full_restart_delay_secs(),
            full_restart_cooldown_secs: default_full_restart_cooldown_secs(),
            queue_warning_depth: default_queue_warning_depth(),
        }
    }
}

impl SupervisorConfig {
    pub const fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }

    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub const fn full_restart_delay(&self) -> Duration {
        Duration::from_secs(self.full_restart_delay_secs)
    }

    pub const fn full_restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.full_restart_cooldown_secs)
    }
}

/// Merge throttling, off by default
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PerformanceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_per_source_per_cycle")]
    pub max_per_source_per_cycle: usize,

    /// Pause between drained items, smoothing CPU and I/O bursts
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

const fn default_max_per_source_per_cycle() -> usize {
    10
}

const fn default_item_delay_ms() -> u64 {
    100
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_per_source_per_cycle: default_max_per_source_per_cycle(),
            item_delay_ms: default_item_delay_ms(),
        }
    }
}

impl PerformanceConfig {
    /// Per-source drain cap, `None` when unlimited.
    pub const fn cycle_cap(&self) -> Option<usize> {
        if self.enabled {
            Some(self.max_per_source_per_cycle)
        } else {
            None
        }
    }

    pub const fn item_delay(&self) -> Option<Duration> {
        if self.enabled && self.item_delay_ms > 0 {
            Some(Duration::from_millis(self.item_delay_ms))
        } else {
            None
        }
    }
}

/// Feed artifact publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PersistenceConfig {
    /// Atomic replace attempts before falling back to a direct write
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step; attempt `n` waits `n * step`
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_backoff_step_ms() -> u64 {
    50
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

/// Status artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusConfig {
    #[serde(default = "default_status_path")]
    pub path: PathBuf,

    #[serde(default = "default_status_interval_secs")]
    pub interval_secs: u64,
}

fn default_status_path() -> PathBuf {
    PathBuf::from("multichat_status.txt")
}

const fn default_status_interval_secs() -> u64 {
    10
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            path: default_status_path(),
            interval_secs: default_status_interval_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Stdout format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}
