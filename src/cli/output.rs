//! CLI output formatting utilities.

use crate::checkpoint::CheckpointSummary;
use crate::orchestrator::{EpisodeExtraction, EpisodeStatus};
use console::style;

/// Output helper for CLI formatting. Everything goes to stderr so stdout
/// stays clean for the JSON results.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        eprintln!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        eprintln!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        eprintln!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        eprintln!("  {}: {}", style(key).dim(), value);
    }

    /// Print the outcome of one episode.
    pub fn episode_summary(extraction: &EpisodeExtraction) {
        let report = &extraction.report;
        let label = extraction.title.as_deref().unwrap_or(&extraction.episode_id);
        let status = match extraction.status {
            EpisodeStatus::Succeeded => style(extraction.status.to_string()).green(),
            EpisodeStatus::PartiallyFailed => style(extraction.status.to_string()).yellow(),
            EpisodeStatus::Failed => style(extraction.status.to_string()).red(),
        };

        Output::header(label);
        Output::kv("Status", &status.to_string());
        Output::kv(
            "Units",
            &format!(
                "{}/{} succeeded, {} failed ({} timed out)",
                report.succeeded, report.total_units, report.failed, report.timed_out
            ),
        );
        if report.restored > 0 {
            Output::kv("Restored", &report.restored.to_string());
        }
        if report.fallback_used > 0 || report.sentiment_fallbacks > 0 {
            Output::kv(
                "Fallbacks",
                &format!(
                    "{} extraction, {} sentiment",
                    report.fallback_used, report.sentiment_fallbacks
                ),
            );
        }
        Output::kv(
            "Timing",
            &format!(
                "{} wall, {:.0}ms avg per unit, {:.1}x parallel",
                format_duration_ms(report.wall_time_ms),
                report.avg_unit_ms,
                report.parallelization_factor
            ),
        );
        for error in report.errors.iter().take(5) {
            eprintln!(
                "  {} unit {}: {} ({})",
                style("!").red(),
                error.unit_index,
                content_preview(&error.message, 120),
                error.error_kind
            );
        }
        if report.errors.len() > 5 {
            eprintln!("  {} more errors in the report", report.errors.len() - 5);
        }
    }

    /// Print one line per stored checkpoint.
    pub fn checkpoint_line(summary: &CheckpointSummary) {
        eprintln!(
            "  {} {} ({}, {}/{} units, {} failed, updated {})",
            style("*").cyan(),
            style(&summary.episode_id).bold(),
            summary.status,
            summary.completed_units,
            summary.total_units,
            summary.failed_units,
            summary.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
}

/// Format milliseconds to a human-readable string.
fn format_duration_ms(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_len: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_len {
        content
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(1500), "1.5s");
        assert_eq!(format_duration_ms(125_000), "2m 5s");
        assert_eq!(format_duration_ms(3_725_000), "1h 2m 5s");
    }

    #[test]
    fn test_content_preview_respects_char_boundaries() {
        assert_eq!(content_preview("line\nbreak", 20), "line break");
        assert_eq!(content_preview("blåbærsyltetøy", 5), "blåbæ...");
    }
}
