//! Table output formatting for CLI commands
//!
//! Renders source status and diagnostics with comfy-table. Colors are
//! dropped when `NO_COLOR` is set or the terminal is dumb, in which case
//! status cells fall back to text icons.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::cli::models::{CheckItem, Liveness, SourceReport};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Create a new table formatter with custom settings
    pub const fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format per-source artifact activity
    pub fn format_sources(&self, sources: &[SourceReport]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Items").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Idle").add_attribute(Attribute::Bold),
            Cell::new("State").add_attribute(Attribute::Bold),
        ]);

        for source in sources {
            let state = if source.enabled {
                source.liveness.to_string()
            } else {
                "disabled".to_string()
            };
            let state_cell = if self.use_colors {
                let color = if source.enabled {
                    liveness_color(source.liveness)
                } else {
                    Color::DarkGrey
                };
                Cell::new(&state).fg(color)
            } else {
                Cell::new(format!("{} {}", liveness_icon(source.liveness), state))
            };

            table.add_row(vec![
                Cell::new(&source.prefix),
                Cell::new(truncate_text(&source.name, 30)),
                Cell::new(source.items.map_or_else(|| "-".to_string(), |n| n.to_string())),
                Cell::new(source.size_bytes.map_or_else(|| "-".to_string(), format_bytes)),
                Cell::new(source.idle_secs.map_or_else(|| "-".to_string(), format_idle)),
                state_cell,
            ]);
        }

        table.to_string()
    }

    /// Format diagnostic results
    pub fn format_checks(&self, checks: &[CheckItem]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Check").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
            Cell::new("Detail").add_attribute(Attribute::Bold),
        ]);

        for check in checks {
            let (label, color, icon) = if check.ok {
                ("ok", Color::Green, "✓")
            } else {
                ("fail", Color::Red, "✗")
            };
            let result_cell = if self.use_colors {
                Cell::new(label).fg(color)
            } else {
                Cell::new(format!("{icon} {label}"))
            };

            table.add_row(vec![
                Cell::new(&check.name),
                result_cell,
                Cell::new(truncate_text(&check.detail, 60)),
            ]);
        }

        table.to_string()
    }

    /// Create a base table with common settings
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(u16::try_from(width).unwrap_or(u16::MAX));
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

const fn liveness_color(liveness: Liveness) -> Color {
    match liveness {
        Liveness::Active => Color::Green,
        Liveness::Suspect => Color::Yellow,
        Liveness::Stalled => Color::Red,
        Liveness::Missing => Color::DarkGrey,
    }
}

const fn liveness_icon(liveness: Liveness) -> &'static str {
    match liveness {
        Liveness::Active => "●",
        Liveness::Suspect => "⧗",
        Liveness::Stalled => "✗",
        Liveness::Missing => "○",
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_idle(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Truncate text to max length with ellipsis
fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
