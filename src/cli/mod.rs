//! Command-line interface
//!
//! `run` drives the coordinator, `status` inspects a running instance
//! through its artifacts and `check` validates the setup.

pub mod commands;
pub mod models;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

/// Print an error in the requested format and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
