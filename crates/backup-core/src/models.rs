use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Maximum length (in characters) of a [`Run`] note.
pub const RUN_NOTE_MAX_CHARS: usize = 80;

// ── Log events ────────────────────────────────────────────────────────────────

/// Substrings that identify run boundaries in a unit's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMarkers {
    pub start: Vec<String>,
    /// Completion and deactivation markers.
    pub success: Vec<String>,
    /// Start-failure and exit-code markers.
    pub failure: Vec<String>,
}

impl Default for LogMarkers {
    fn default() -> Self {
        Self {
            start: vec!["Starting".to_string()],
            success: vec!["Done.".to_string(), "Deactivated successfully".to_string()],
            failure: vec!["Failed to start".to_string(), "exit-code".to_string()],
        }
    }
}

/// Classification of a single service log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The unit began executing.
    Start,
    /// The unit finished or was deactivated cleanly.
    Success,
    /// The unit failed to start or exited with an error code.
    Failure,
}

impl EventKind {
    /// `true` for events that close a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Success | EventKind::Failure)
    }
}

/// One classified log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Parsed leading timestamp, or `None` when the token was not ISO-8601.
    pub timestamp: Option<DateTime<Utc>>,
    /// The leading whitespace-delimited token exactly as it appeared.
    pub timestamp_token: String,
    pub kind: EventKind,
    pub raw_line: String,
}

// ── Runs ──────────────────────────────────────────────────────────────────────

/// Outcome of a reconstructed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Fail,
}

/// One execution of a backup job inferred from its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    /// When the run started, if the start line carried a parseable timestamp.
    pub start_time: Option<DateTime<Utc>>,
    /// Raw timestamp token of the start line, kept for display.
    pub start_label: String,
    pub status: RunStatus,
    /// Wall-clock duration; `None` when either timestamp is unknown or the
    /// terminal event precedes the start.
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Option<Duration>,
    /// Message of the terminal line, at most [`RUN_NOTE_MAX_CHARS`] characters.
    pub note: String,
}

fn serialize_duration_secs<S: serde::Serializer>(
    d: &Option<Duration>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&(d.num_milliseconds() as f64 / 1000.0)),
        None => s.serialize_none(),
    }
}

// ── Artifacts ─────────────────────────────────────────────────────────────────

/// Storage location class an [`Artifact`] was listed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    Remote,
    HypervisorDisk,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Local => "local",
            Tier::Remote => "remote",
            Tier::HypervisorDisk => "hypervisor_disk",
        };
        f.write_str(s)
    }
}

/// One stored object: a backup archive or a virtual disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub size_bytes: u64,
    pub modified_time: Option<DateTime<Utc>>,
    pub source_tier: Tier,
    /// Full path for artifacts found by a recursive local scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Artifact {
    /// Build an artifact without a path.
    pub fn new(
        name: impl Into<String>,
        size_bytes: u64,
        modified_time: Option<DateTime<Utc>>,
        source_tier: Tier,
    ) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            modified_time,
            source_tier,
            path: None,
        }
    }
}

/// Estimated cost of keeping (and downloading once) a quantity of data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostEstimate {
    pub storage: f64,
    pub egress: f64,
}

/// An [`Artifact`] annotated with its cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostedArtifact {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub estimated_storage_cost: f64,
    pub estimated_egress_cost: f64,
}

/// Aggregate totals over one tier's artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TierSummary {
    pub count: u32,
    pub total_bytes: u64,
    pub total_storage_cost: f64,
    pub total_egress_cost: f64,
}

impl TierSummary {
    /// Accumulate one costed artifact into the running totals.
    pub fn add(&mut self, item: &CostedArtifact) {
        self.count += 1;
        self.total_bytes += item.artifact.size_bytes;
        self.total_storage_cost += item.estimated_storage_cost;
        self.total_egress_cost += item.estimated_egress_cost;
    }
}

/// The result of listing one tier: whatever was found, plus the reason the
/// source failed, if it did.
///
/// A listing with `error: Some(_)` is degraded, not fatal: `artifacts` is
/// then empty and the caller keeps rendering every other tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub tier: Tier,
    pub artifacts: Vec<Artifact>,
    pub error: Option<SourceError>,
}

impl Listing {
    pub fn ok(tier: Tier, artifacts: Vec<Artifact>) -> Self {
        Self {
            tier,
            artifacts,
            error: None,
        }
    }

    pub fn failed(tier: Tier, error: SourceError) -> Self {
        Self {
            tier,
            artifacts: Vec::new(),
            error: Some(error),
        }
    }

    /// Fold a provider result into a listing.
    pub fn from_result(tier: Tier, result: Result<Vec<Artifact>, SourceError>) -> Self {
        match result {
            Ok(artifacts) => Self::ok(tier, artifacts),
            Err(e) => Self::failed(tier, e),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

// ── Hypervisor guests ─────────────────────────────────────────────────────────

/// Virtualisation flavour of a hypervisor guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    /// Full virtual machine.
    Qemu,
    /// Container.
    Lxc,
}

/// A VM or container known to the hypervisor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Guest {
    pub id: String,
    pub name: String,
    pub status: String,
    pub kind: GuestKind,
    /// Sum of declared disk sizes in gigabytes.
    pub disk_gb: f64,
    pub est_storage: f64,
}

// ── Timers ────────────────────────────────────────────────────────────────────

/// Schedule of the timer that triggers a backup unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerInfo {
    pub unit: String,
    pub next: String,
    pub last: String,
}
