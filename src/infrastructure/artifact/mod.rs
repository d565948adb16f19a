//! File artifacts shared with workers.

pub mod source_log;

pub use source_log::{artifact_path, parse_artifact, read_artifact, ArtifactSnapshot, Record};
