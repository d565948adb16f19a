//! End-to-end tests of the data path without worker processes:
//! artifact -> intake reader -> source queue -> merge scheduler -> feed file.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use common::{append_records, source, temp_dir};
use multichat::domain::models::{IntakeConfig, PersistenceConfig, SourceConfig};
use multichat::services::{
    FeedState, IntakeReader, MergeScheduler, PersistenceWriter, PollOutcome, RestartRequests,
    SourceActivity, SourceQueues,
};

struct Pipeline {
    queues: Arc<SourceQueues>,
    restarts: Arc<RestartRequests>,
    scheduler: MergeScheduler,
    output: std::path::PathBuf,
}

impl Pipeline {
    fn new(dir: &Path, max_messages: usize) -> Self {
        let queues = Arc::new(SourceQueues::new(1_000, 100));
        let output = dir.join("messages.json");
        let writer = PersistenceWriter::new(&output, &PersistenceConfig::default());
        let feed = Arc::new(RwLock::new(FeedState::new(max_messages, 0)));
        let scheduler =
            MergeScheduler::new(Arc::clone(&queues), feed, writer, Duration::from_millis(50));
        Self {
            queues,
            restarts: Arc::new(RestartRequests::new()),
            scheduler,
            output,
        }
    }

    fn reader(&self, source: &SourceConfig, artifact: &Path, config: IntakeConfig) -> IntakeReader {
        IntakeReader::new(
            source.clone(),
            artifact.to_path_buf(),
            self.queues.get_or_create(&source.id()),
            Arc::new(SourceActivity::new()),
            Arc::clone(&self.restarts),
            config,
        )
    }

    fn published(&self) -> Vec<serde_json::Value> {
        serde_json::from_str(&std::fs::read_to_string(&self.output).unwrap()).unwrap()
    }
}

#[tokio::test]
async fn test_two_sources_flow_into_one_ordered_feed() {
    let dir = temp_dir();
    let pipeline = Pipeline::new(dir.path(), 100);
    let yt = source("[YT]");
    let tw = source("[TW]");
    let yt_artifact = dir.path().join("yt.jsonl");
    let tw_artifact = dir.path().join("tw.jsonl");
    let mut yt_reader = pipeline.reader(&yt, &yt_artifact, IntakeConfig::default());
    let mut tw_reader = pipeline.reader(&tw, &tw_artifact, IntakeConfig::default());

    append_records(&yt_artifact, &[("1", 100), ("2", 300)]);
    append_records(&tw_artifact, &[("1", 200)]);

    assert!(matches!(yt_reader.poll_once().await, PollOutcome::Appended { items: 2, .. }));
    assert!(matches!(tw_reader.poll_once().await, PollOutcome::Appended { items: 1, .. }));

    let outcome = pipeline.scheduler.run_cycle().await;
    assert_eq!(outcome.accepted, 3);

    let feed = pipeline.published();
    let order: Vec<(String, i64)> = feed
        .iter()
        .map(|v| {
            (
                v["source"]["source_id"].as_str().unwrap().to_string(),
                v["timestamp"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("yt".to_string(), 100),
            ("tw".to_string(), 200),
            ("yt".to_string(), 300)
        ]
    );
}

#[tokio::test]
async fn test_partial_line_is_picked_up_once_complete() {
    use std::io::Write;

    let dir = temp_dir();
    let pipeline = Pipeline::new(dir.path(), 100);
    let yt = source("[YT]");
    let artifact = dir.path().join("yt.jsonl");
    let mut reader = pipeline.reader(&yt, &artifact, IntakeConfig::default());

    let line = common::artifact_line("late", 5);
    let (head, tail) = line.split_at(line.len() / 2);
    append_records(&artifact, &[("early", 1)]);
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&artifact).unwrap();
        write!(file, "{head}").unwrap();
    }

    assert!(matches!(reader.poll_once().await, PollOutcome::Appended { items: 1, .. }));
    assert_eq!(reader.poll_once().await, PollOutcome::Unchanged);

    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&artifact).unwrap();
        writeln!(file, "{tail}").unwrap();
    }
    assert!(matches!(reader.poll_once().await, PollOutcome::Appended { items: 1, .. }));

    pipeline.scheduler.run_cycle().await;
    assert_eq!(pipeline.published().len(), 2);
}

#[tokio::test]
async fn test_rereading_after_reset_does_not_duplicate_feed_items() {
    let dir = temp_dir();
    let pipeline = Pipeline::new(dir.path(), 100);
    let yt = source("[YT]");
    let artifact = dir.path().join("yt.jsonl");
    let mut reader = pipeline.reader(&yt, &artifact, IntakeConfig::default());

    append_records(&artifact, &[("a", 1), ("b", 2), ("c", 3)]);
    reader.poll_once().await;
    pipeline.scheduler.run_cycle().await;

    // The worker rewrote its artifact from scratch with overlapping history.
    std::fs::write(&artifact, "").unwrap();
    append_records(&artifact, &[("b", 2)]);
    assert_eq!(reader.poll_once().await, PollOutcome::Reset { from: 3, to: 1 });

    append_records(&artifact, &[("c", 3), ("d", 4)]);
    assert!(matches!(reader.poll_once().await, PollOutcome::Appended { items: 2, .. }));

    let outcome = pipeline.scheduler.run_cycle().await;
    assert_eq!(outcome.accepted, 1);
    assert_eq!(outcome.duplicates, 1);
    assert_eq!(pipeline.published().len(), 4);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped_without_blocking() {
    use std::io::Write;

    let dir = temp_dir();
    let pipeline = Pipeline::new(dir.path(), 100);
    let yt = source("[YT]");
    let artifact = dir.path().join("yt.jsonl");
    let mut reader = pipeline.reader(&yt, &artifact, IntakeConfig::default());

    append_records(&artifact, &[("a", 1)]);
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&artifact).unwrap();
        writeln!(file, "not json at all").unwrap();
    }
    append_records(&artifact, &[("b", 2)]);

    assert_eq!(
        reader.poll_once().await,
        PollOutcome::Appended {
            items: 2,
            malformed: 1,
            shed: 0
        }
    );
    assert_eq!(reader.last_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_silent_source_requests_a_restart() {
    let dir = temp_dir();
    let pipeline = Pipeline::new(dir.path(), 100);
    let yt = source("[YT]");
    let artifact = dir.path().join("yt.jsonl");
    std::fs::write(&artifact, "").unwrap();

    let config = IntakeConfig {
        inactivity_timeout_secs: 30,
        ..IntakeConfig::default()
    };
    let mut reader = pipeline.reader(&yt, &artifact, config);

    assert_eq!(reader.poll_once().await, PollOutcome::Unchanged);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(
        reader.poll_once().await,
        PollOutcome::Stalled {
            restart_requested: true
        }
    );
    assert!(pipeline.restarts.contains(&yt.id()));

    // One request per timeout, not one per poll.
    assert_eq!(reader.poll_once().await, PollOutcome::Unchanged);
}

#[tokio::test]
async fn test_bounded_feed_keeps_quiet_source_in_published_file() {
    let dir = temp_dir();
    let pipeline = Pipeline::new(dir.path(), 10);
    let yt = source("[YT]");
    let tw = source("[TW]");
    let yt_artifact = dir.path().join("yt.jsonl");
    let tw_artifact = dir.path().join("tw.jsonl");
    let mut yt_reader = pipeline.reader(&yt, &yt_artifact, IntakeConfig::default());
    let mut tw_reader = pipeline.reader(&tw, &tw_artifact, IntakeConfig::default());

    append_records(&tw_artifact, &[("quiet", 1)]);
    let busy: Vec<(String, i64)> = (0..30).map(|n| (format!("busy-{n}"), 10 + n)).collect();
    let busy: Vec<(&str, i64)> = busy.iter().map(|(id, ts)| (id.as_str(), *ts)).collect();
    append_records(&yt_artifact, &busy);

    tw_reader.poll_once().await;
    yt_reader.poll_once().await;
    let outcome = pipeline.scheduler.run_cycle().await;
    assert_eq!(outcome.len, 10);
    assert_eq!(outcome.trimmed, 21);

    let feed = pipeline.published();
    assert_eq!(feed.len(), 10);
    assert_eq!(feed[0]["source"]["source_id"], "tw");
    assert_eq!(feed[9]["timestamp"], 39);
}
