//! Console rendering of bot reports.
//!
//! Styled text by default, one JSON object per line with `--json`. Each
//! report is written as a single line under the writer's lock so lines from
//! the two loops never interleave mid-line.

use std::io::{self, Write};
use std::sync::Mutex;

use beacon_core::OutputSink;
use beacon_types::report::Report;
use console::style;

/// Render a report as one styled console line (without the newline).
pub fn styled_line(report: &Report) -> String {
    let text = report.to_string();
    match report {
        Report::Alert { .. } => format!("  {} {}", style("!").red().bold(), style(text).red()),
        Report::Reply { .. } => format!("  {} {}", style("<").green().bold(), text),
        Report::Broadcast { .. } => format!("  {} {}", style("*").cyan(), text),
        r if r.is_failure() => format!("  {} {}", style("x").yellow().bold(), style(text).yellow()),
        _ => format!("  {} {}", style("i").blue().bold(), style(text).dim()),
    }
}

/// Render a report as a compact JSON object.
pub fn json_line(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string(report)
}

/// Sink writing one line per report.
pub struct ConsoleSink<W = io::Stdout> {
    writer: Mutex<W>,
    json: bool,
}

impl ConsoleSink {
    pub fn stdout(json: bool) -> Self {
        Self::new(io::stdout(), json)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W, json: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            json,
        }
    }

    fn render(&self, report: &Report) -> String {
        if !self.json {
            return styled_line(report);
        }
        json_line(report).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to encode report as JSON");
            serde_json::json!({ "event": "unencodable", "text": report.to_string() }).to_string()
        })
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> OutputSink for ConsoleSink<W> {
    fn report(&self, report: Report) {
        let line = self.render(&report);
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            tracing::debug!(error = %e, "failed to write report");
        }
    }
}
