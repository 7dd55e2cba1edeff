//! Run-history reconstruction from service logs.
//!
//! The log source delivers lines newest-first. A run is inferred by pairing
//! each terminal event (success or failure) with the start event that sits
//! chronologically immediately before it. Walking newest-first, that means
//! holding the most recently seen terminal event until the next start shows
//! up:
//!
//! * a later terminal seen before any start replaces the held one, so the
//!   *first* terminal after a start closes the run;
//! * a start with no held terminal is a run still in progress (or one whose
//!   end fell outside the window) and is dropped;
//! * a terminal still held when input runs out has no visible start and is
//!   dropped.
//!
//! The log carries no run identity, so overlapping executions of the same
//! unit are paired by proximity only. The resulting history is a best-effort
//! reading, not a guarantee.

use backup_core::formatting::truncate_chars;
use backup_core::models::{EventKind, LogEvent, Run, RunStatus, RUN_NOTE_MAX_CHARS};
use tracing::debug;

use crate::log_parser::{message_payload, LogEventParser};

/// Default number of log lines considered.
pub const DEFAULT_WINDOW_LINES: usize = 400;

/// Rebuilds [`Run`]s from raw log lines.
#[derive(Debug, Clone)]
pub struct RunReconstructor {
    parser: LogEventParser,
    window: usize,
}

impl Default for RunReconstructor {
    fn default() -> Self {
        Self::new(LogEventParser::default(), DEFAULT_WINDOW_LINES)
    }
}

impl RunReconstructor {
    /// `window` caps how many of the newest lines are looked at.
    pub fn new(parser: LogEventParser, window: usize) -> Self {
        Self { parser, window }
    }

    /// Reconstruct at most `max_runs` runs from `lines` (newest-first).
    ///
    /// The returned runs are newest-first.
    pub fn reconstruct<S: AsRef<str>>(&self, lines: &[S], max_runs: usize) -> Vec<Run> {
        let capped = &lines[..lines.len().min(self.window)];
        let events = self.parser.parse_lines(capped);
        pair_events(&events, max_runs)
    }
}

/// Pair newest-first events into runs. See the module docs for the rules.
pub fn pair_events(events: &[LogEvent], max_runs: usize) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut pending_end: Option<&LogEvent> = None;
    let mut dropped_starts = 0usize;

    for event in events {
        if runs.len() >= max_runs {
            break;
        }
        if event.kind.is_terminal() {
            pending_end = Some(event);
            continue;
        }
        match pending_end.take() {
            Some(end) => runs.push(build_run(event, end)),
            None => dropped_starts += 1,
        }
    }

    debug!(
        "paired {} runs from {} events ({} unmatched starts)",
        runs.len(),
        events.len(),
        dropped_starts
    );
    runs
}

fn build_run(start: &LogEvent, end: &LogEvent) -> Run {
    let duration = match (start.timestamp, end.timestamp) {
        (Some(s), Some(e)) if e >= s => Some(e - s),
        _ => None,
    };
    let status = match end.kind {
        EventKind::Failure => RunStatus::Fail,
        _ => RunStatus::Ok,
    };
    Run {
        start_time: start.timestamp,
        start_label: start.timestamp_token.clone(),
        status,
        duration,
        note: truncate_chars(message_payload(&end.raw_line), RUN_NOTE_MAX_CHARS),
    }
}

// ── RunHistory ────────────────────────────────────────────────────────────────

/// Query helpers over a newest-first run list.
pub trait RunHistory {
    /// The newest `limit` successful runs.
    fn successful(&self, limit: usize) -> Vec<Run>;

    /// The newest failed run, if any.
    fn last_failure(&self) -> Option<&Run>;
}

impl RunHistory for [Run] {
    fn successful(&self, limit: usize) -> Vec<Run> {
        self.iter()
            .filter(|r| r.status == RunStatus::Ok)
            .take(limit)
            .cloned()
            .collect()
    }

    fn last_failure(&self) -> Option<&Run> {
        self.iter().find(|r| r.status == RunStatus::Fail)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
