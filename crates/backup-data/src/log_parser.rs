//! Classification of individual service log lines.
//!
//! Lines are matched against plain substrings rather than a structured log
//! format: the backup jobs write free text, and systemd adds its own
//! start/stop chatter around it.

pub use backup_core::models::LogMarkers;

use backup_core::formatting::truncate_with_marker;
use backup_core::models::{EventKind, LogEvent};
use backup_core::time_utils::TimestampParser;
use tracing::debug;

/// Turns log lines into [`LogEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct LogEventParser {
    markers: LogMarkers,
    timestamps: TimestampParser,
}

impl LogEventParser {
    pub fn new(markers: LogMarkers, timestamps: TimestampParser) -> Self {
        Self {
            markers,
            timestamps,
        }
    }

    /// Classify one line.
    ///
    /// Start markers are checked first, then success, then failure. Lines
    /// matching none of them, and blank lines, produce `None`. A leading
    /// token that is not a timestamp leaves the event classified with an
    /// unknown time.
    pub fn parse_line(&self, line: &str) -> Option<LogEvent> {
        let kind = self.classify(line)?;
        let token = line.split_whitespace().next()?;

        let timestamp = self.timestamps.parse(token);
        if timestamp.is_none() {
            debug!("log line has no parseable timestamp: {:?}", token);
        }

        Some(LogEvent {
            timestamp,
            timestamp_token: token.to_string(),
            kind,
            raw_line: line.to_string(),
        })
    }

    /// Classify every line, keeping input order and dropping unclassified
    /// lines.
    pub fn parse_lines<S: AsRef<str>>(&self, lines: &[S]) -> Vec<LogEvent> {
        lines
            .iter()
            .filter_map(|l| self.parse_line(l.as_ref()))
            .collect()
    }

    fn classify(&self, line: &str) -> Option<EventKind> {
        let contains_any = |markers: &[String]| markers.iter().any(|m| line.contains(m.as_str()));

        if contains_any(&self.markers.start) {
            Some(EventKind::Start)
        } else if contains_any(&self.markers.success) {
            Some(EventKind::Success)
        } else if contains_any(&self.markers.failure) {
            Some(EventKind::Failure)
        } else {
            None
        }
    }
}

/// The human part of a journal line: everything after the timestamp and
/// host tokens.
///
/// Lines with fewer than three tokens yield their last token.
pub fn message_payload(line: &str) -> &str {
    let trimmed = line.trim();
    let mut rest = trimmed;
    for _ in 0..2 {
        match rest.split_once(char::is_whitespace) {
            Some((_, tail)) => rest = tail.trim_start(),
            None => return rest,
        }
    }
    rest
}

/// Render newest-first log lines as a chronological tail of at most
/// `max_chars` characters (plus the truncation marker).
pub fn render_tail<S: AsRef<str>>(newest_first: &[S], max_chars: usize) -> String {
    let text = newest_first
        .iter()
        .rev()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    truncate_with_marker(&text, max_chars)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
