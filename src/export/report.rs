//! Plain-text interaction report
//!
//! The layout is fixed; apart from the `Recording Date` and `Generated`
//! header fields the output depends only on the events.

use std::fmt::Write as _;
use thiserror::Error;
use tracing::warn;

use crate::data::{InteractionEvent, InteractionKind};

const RULE_WIDTH: usize = 60;
const SECTION_RULE_WIDTH: usize = 20;
const MAX_URL_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("timestamp of entry {index} is out of range")]
    Timestamp { index: usize },

    #[error("failed to write report: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Render the report, falling back to a raw dump if that fails
pub fn render_or_fallback(
    events: &[InteractionEvent],
    recording_date: &str,
    generated: &str,
) -> String {
    match render_report(events, recording_date, generated) {
        Ok(report) => report,
        Err(e) => {
            warn!("Failed to render interaction report: {}", e);
            render_fallback(&e, events)
        }
    }
}

/// Render the full report
///
/// A single entry that cannot be rendered becomes an error line; it never
/// aborts the report.
pub fn render_report(
    events: &[InteractionEvent],
    recording_date: &str,
    generated: &str,
) -> Result<String, ReportError> {
    let rule = "=".repeat(RULE_WIDTH);
    let section_rule = "-".repeat(SECTION_RULE_WIDTH);
    let mut out = String::new();

    writeln!(out, "{}", rule)?;
    writeln!(out, "           SCREEN RECORDING - USER INTERACTIONS")?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "Recording Date: {}", recording_date)?;
    writeln!(out, "Total Interactions: {}", events.len())?;
    writeln!(out, "Generated: {}", generated)?;
    writeln!(out, "{}", rule)?;
    writeln!(out)?;

    let Some(first) = events.first() else {
        writeln!(out, "No user interactions were recorded.")?;
        return Ok(out);
    };

    writeln!(out, "SUMMARY:")?;
    writeln!(out, "{}", section_rule)?;
    for (kind, count) in summarize(events) {
        writeln!(out, "{}: {} times", kind.as_str().to_uppercase(), count)?;
    }
    writeln!(out)?;

    writeln!(out, "DETAILED LOG:")?;
    writeln!(out, "{}", section_rule)?;
    for (index, event) in events.iter().enumerate() {
        match render_entry(index, event, first.timestamp) {
            Ok(line) => writeln!(out, "{}", line)?,
            Err(e) => {
                warn!("Error formatting interaction entry: {}", e);
                writeln!(out, "[{:03}] Error formatting interaction", index + 1)?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "End of Recording Log")?;
    writeln!(out, "{}", rule)?;

    Ok(out)
}

/// Error-annotated raw dump of the events
pub fn render_fallback(error: &ReportError, events: &[InteractionEvent]) -> String {
    let raw = serde_json::to_string_pretty(events).unwrap_or_else(|e| {
        warn!("Failed to serialize interactions: {}", e);
        format!("{:#?}", events)
    });
    format!("Error formatting interactions: {}\n\nRaw data:\n{}", error, raw)
}

/// Counts per type, in order of first occurrence
fn summarize(events: &[InteractionEvent]) -> Vec<(&InteractionKind, usize)> {
    let mut summary: Vec<(&InteractionKind, usize)> = Vec::new();
    for event in events {
        match summary.iter_mut().find(|(kind, _)| *kind == &event.kind) {
            Some((_, count)) => *count += 1,
            None => summary.push((&event.kind, 1)),
        }
    }
    summary
}

fn render_entry(
    index: usize,
    event: &InteractionEvent,
    start: i64,
) -> Result<String, ReportError> {
    let elapsed = event
        .timestamp
        .checked_sub(start)
        .ok_or(ReportError::Timestamp { index })?;

    let mut line = format!("[{:03}] {}s - ", index + 1, format_seconds(elapsed));

    let x = event.x.unwrap_or(0);
    let y = event.y.unwrap_or(0);
    match &event.kind {
        InteractionKind::Click => {
            write!(line, "CLICK at ({}, {})", x, y)?;
            if let Some(target) = &event.target {
                write!(line, " on {}", target)?;
            }
        }
        InteractionKind::Scroll => {
            write!(line, "SCROLL to ({}, {})", x, y)?;
        }
        InteractionKind::KeyDown => {
            write!(line, "KEY PRESS: {}", event.key.as_deref().unwrap_or("unknown"))?;
            if let Some(target) = &event.target {
                write!(line, " in {}", target)?;
            }
        }
        InteractionKind::Other(name) => {
            line.push_str(&name.to_uppercase());
            if let (Some(x), Some(y)) = (event.x, event.y) {
                write!(line, " at ({}, {})", x, y)?;
            }
        }
    }

    if !event.url.is_empty() {
        write!(line, " [{}]", truncate_url(&event.url))?;
    }

    Ok(line)
}

/// Milliseconds as seconds with one decimal, rounding half up
fn format_seconds(millis: i64) -> String {
    let sign = if millis < 0 { "-" } else { "" };
    let tenths = (millis.unsigned_abs() + 50) / 100;
    format!("{}{}.{}", sign, tenths / 10, tenths % 10)
}

fn truncate_url(url: &str) -> String {
    if url.chars().count() > MAX_URL_CHARS {
        let head: String = url.chars().take(MAX_URL_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        url.to_string()
    }
}
