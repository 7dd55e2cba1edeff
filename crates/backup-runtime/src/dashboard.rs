//! Dashboard assembly.
//!
//! A [`Dashboard`] issues every lookup one snapshot needs at the same time,
//! waits for all of them, then folds the results into an immutable
//! [`DashboardSnapshot`]. Each lookup is bounded by its own deadline and a
//! failing source only blanks its own section.

use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use backup_core::error::{MonitorError, SourceError};
use backup_core::models::{Guest, GuestKind, Listing, Run, Tier, TimerInfo};
use backup_core::pricing::CostEstimator;
use backup_core::settings::{AppConfig, ScopeConfig};
use backup_core::time_utils::TimestampParser;
use backup_data::inventory::{
    build_guest, guest_artifact, list_local, list_local_recursive, parse_guest_list,
    recent_local,
};
use backup_data::log_parser::{render_tail, LogEventParser};
use backup_data::reconcile::{ReconciliationView, ScopeView, TierView};
use backup_data::runs::{RunHistory, RunReconstructor};
use backup_data::timers::{timer_for_service, unavailable_timer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::providers::{
    HypervisorReader, JournalLogSource, LogSource, ProxmoxHypervisor, RcloneLister, RemoteLister,
    SystemdTimers, TimerSource,
};

// ── View ──────────────────────────────────────────────────────────────────────

/// Which sections a snapshot contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Timers, run history, log tails and the newest local archives.
    Status,
    /// Cross-tier reconciliation and the dump scan.
    Backups,
    /// Run history only.
    Runs,
    /// Hypervisor guests and their disks.
    Vms,
    All,
}

impl View {
    fn wants_scopes(self) -> bool {
        matches!(self, View::Backups | View::All)
    }

    fn wants_runs(self) -> bool {
        matches!(self, View::Status | View::Runs | View::All)
    }

    fn wants_status(self) -> bool {
        matches!(self, View::Status | View::All)
    }

    fn wants_guests(self) -> bool {
        matches!(self, View::Vms | View::All)
    }
}

impl FromStr for View {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "status" => Ok(View::Status),
            "backups" => Ok(View::Backups),
            "runs" => Ok(View::Runs),
            "vms" => Ok(View::Vms),
            "all" => Ok(View::All),
            other => Err(MonitorError::Config(format!(
                "unknown view '{other}' (expected status, backups, runs, vms or all)"
            ))),
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Reconstructed history of one backup unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitHistory {
    pub unit: String,
    /// Newest-first; empty when the log source failed.
    pub runs: Vec<Run>,
    /// The newest successful runs, capped for display.
    pub successful: Vec<Run>,
    pub last_failure: Option<Run>,
    pub error: Option<SourceError>,
}

/// The newest log lines of one unit, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogTail {
    pub unit: String,
    /// Empty when the log source failed.
    pub text: String,
    pub error: Option<SourceError>,
}

/// The newest local archives of one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentArchives {
    pub scope: String,
    pub archives: TierView,
}

/// A guest-table query that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestError {
    pub kind: GuestKind,
    pub error: SourceError,
}

/// Hypervisor guests and their declared disks as a costed tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestInventory {
    pub guests: Vec<Guest>,
    pub disks: TierView,
    pub errors: Vec<GuestError>,
}

/// Everything one dashboard request returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub view: View,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<ScopeView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dumps: Option<TierView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_archives: Option<Vec<RecentArchives>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs: Option<Vec<UnitHistory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timers: Option<Vec<TimerInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogTail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guests: Option<GuestInventory>,
}

// ── Providers ─────────────────────────────────────────────────────────────────

/// The external sources a dashboard reads from.
#[derive(Clone)]
pub struct Providers {
    pub logs: Arc<dyn LogSource>,
    pub remote: Arc<dyn RemoteLister>,
    pub hypervisor: Arc<dyn HypervisorReader>,
    pub timers: Arc<dyn TimerSource>,
}

impl Providers {
    /// Subprocess-backed providers with the deadlines from `config`.
    pub fn production(config: &AppConfig) -> Self {
        let t = &config.timeouts;
        Self {
            logs: Arc::new(JournalLogSource::new(Duration::from_secs(t.log_secs))),
            remote: Arc::new(RcloneLister::new(
                config.remote.rclone_config.clone(),
                Duration::from_secs(t.listing_secs),
                TimestampParser::new(&config.timezone),
            )),
            hypervisor: Arc::new(ProxmoxHypervisor::new(Duration::from_secs(
                t.hypervisor_secs,
            ))),
            timers: Arc::new(SystemdTimers::new(Duration::from_secs(t.timer_secs))),
        }
    }
}

// ── Dashboard ─────────────────────────────────────────────────────────────────

/// Builds [`DashboardSnapshot`]s. Cheap to clone; holds no mutable state, so
/// repeated snapshots over unchanged sources are identical apart from
/// `generated_at`.
#[derive(Clone)]
pub struct Dashboard {
    config: Arc<AppConfig>,
    providers: Providers,
    reconstructor: RunReconstructor,
    /// Cross-tier scopes, capped at `ui.max_remote_items` per tier.
    scope_view: ReconciliationView,
    /// Single tiers that are already capped by their own scan limits.
    costing: ReconciliationView,
}

impl Dashboard {
    pub fn new(config: AppConfig, providers: Providers) -> Self {
        let timestamps = TimestampParser::new(&config.timezone);
        let reconstructor = RunReconstructor::new(
            LogEventParser::new(config.markers.clone(), timestamps),
            config.ui.journal_lines as usize,
        );
        let costing = ReconciliationView::new(CostEstimator::new(config.rates));
        let scope_view = costing.clone().with_max_items(config.ui.max_remote_items);
        Self {
            config: Arc::new(config),
            providers,
            reconstructor,
            scope_view,
            costing,
        }
    }

    /// Assemble the sections `view` asks for.
    pub async fn snapshot(&self, view: View) -> DashboardSnapshot {
        info!(?view, "building dashboard snapshot");

        // Guests feed the hypervisor tier of the backups view as well.
        let need_guests = view.wants_guests() || view.wants_scopes();

        let (scope_listings, dumps, recent, runs, timers, logs, guests) = tokio::join!(
            when(view.wants_scopes(), self.collect_scope_listings()),
            when(view.wants_scopes(), self.collect_dumps()),
            when(view.wants_status(), self.collect_recent_archives()),
            when(view.wants_runs(), self.collect_runs()),
            when(view.wants_status(), self.collect_timers()),
            when(view.wants_status(), self.collect_logs()),
            when(need_guests, self.collect_guests()),
        );

        let scopes = scope_listings.map(|listings| {
            listings
                .into_iter()
                .map(|(scope, local, remote)| {
                    let hypervisor = match (scope.name.as_str(), &guests) {
                        ("vms", Some((_, disks))) => Some(disks.clone()),
                        _ => None,
                    };
                    self.scope_view
                        .build_scope(scope.name, local, remote, hypervisor)
                })
                .collect()
        });

        DashboardSnapshot {
            generated_at: Utc::now(),
            view,
            scopes,
            dumps,
            recent_archives: recent,
            runs,
            timers,
            logs,
            guests: guests
                .filter(|_| view.wants_guests())
                .map(|(inventory, _)| inventory),
        }
    }

    // ── Sections ──────────────────────────────────────────────────────────────

    /// Local and remote listings of every scope, in scope order.
    async fn collect_scope_listings(&self) -> Vec<(ScopeConfig, Listing, Listing)> {
        let handles: Vec<_> = self
            .config
            .scopes()
            .into_iter()
            .map(|scope| {
                let this = self.clone();
                tokio::spawn(async move {
                    let (local, remote) =
                        tokio::join!(this.local_listing(&scope), this.remote_listing(&scope));
                    (scope, local, remote)
                })
            })
            .collect();
        join_ordered(handles, "scope listing").await
    }

    async fn local_listing(&self, scope: &ScopeConfig) -> Listing {
        let dir = scope.local_dir.clone();
        let pattern = self.config.paths.archive_pattern.clone();
        self.scan_local(scope.local_dir.clone(), move || list_local(&dir, &pattern))
            .await
    }

    async fn remote_listing(&self, scope: &ScopeConfig) -> Listing {
        let result = bounded(
            self.config.timeouts.listing_secs,
            self.providers.remote.list_remote(&scope.remote_target),
        )
        .await;
        Listing::from_result(Tier::Remote, result)
    }

    /// Recursive scan of the hypervisor dump roots.
    async fn collect_dumps(&self) -> TierView {
        let roots = self.config.paths.dump_roots.clone();
        let max = self.config.ui.max_dump_items;
        let context = roots.first().cloned().unwrap_or_default();
        let listing = self
            .scan_local(context, move || list_local_recursive(&roots, max))
            .await;
        self.costing.tier_view(listing)
    }

    async fn collect_recent_archives(&self) -> Vec<RecentArchives> {
        let mut out = Vec::new();
        for scope in self.config.scopes() {
            let dir = scope.local_dir.clone();
            let pattern = self.config.paths.archive_pattern.clone();
            let max = self.config.ui.recent_archives;
            let listing = self
                .scan_local(scope.local_dir.clone(), move || {
                    recent_local(&dir, &pattern, max)
                })
                .await;
            out.push(RecentArchives {
                scope: scope.name,
                archives: self.costing.tier_view(listing),
            });
        }
        out
    }

    async fn collect_runs(&self) -> Vec<UnitHistory> {
        let handles: Vec<_> = self
            .units()
            .into_iter()
            .map(|unit| {
                let this = self.clone();
                tokio::spawn(async move { this.unit_history(unit).await })
            })
            .collect();
        join_ordered(handles, "run history").await
    }

    async fn unit_history(&self, unit: String) -> UnitHistory {
        let fetched = bounded(
            self.config.timeouts.log_secs,
            self.providers
                .logs
                .fetch_recent_lines(&unit, self.config.ui.journal_lines),
        )
        .await;

        let (runs, error) = match fetched {
            Ok(lines) => (
                self.reconstructor
                    .reconstruct(&lines, self.config.ui.runs_per_unit),
                None,
            ),
            Err(e) => {
                warn!(unit = %unit, error = %e, "log source unavailable");
                (Vec::new(), Some(e))
            }
        };
        debug!(unit = %unit, runs = runs.len(), "run history reconstructed");

        UnitHistory {
            successful: runs.successful(self.config.ui.successful_runs_shown),
            last_failure: runs.last_failure().cloned(),
            unit,
            runs,
            error,
        }
    }

    async fn collect_timers(&self) -> Vec<TimerInfo> {
        let handles: Vec<_> = self
            .units()
            .into_iter()
            .map(|unit| {
                let this = self.clone();
                tokio::spawn(async move {
                    let timer = timer_for_service(&unit);
                    let result = bounded(
                        this.config.timeouts.timer_secs,
                        this.providers.timers.timer_info(&timer),
                    )
                    .await;
                    result.unwrap_or_else(|e| {
                        warn!(timer = %timer, error = %e, "timer unavailable");
                        unavailable_timer(&timer)
                    })
                })
            })
            .collect();
        join_ordered(handles, "timer query").await
    }

    async fn collect_logs(&self) -> Vec<LogTail> {
        let handles: Vec<_> = self
            .units()
            .into_iter()
            .map(|unit| {
                let this = self.clone();
                tokio::spawn(async move {
                    let ui = &this.config.ui;
                    let fetched = bounded(
                        this.config.timeouts.log_secs,
                        this.providers.logs.fetch_recent_lines(&unit, ui.tail_lines),
                    )
                    .await;
                    match fetched {
                        Ok(lines) => LogTail {
                            text: render_tail(&lines, ui.tail_chars),
                            unit,
                            error: None,
                        },
                        Err(e) => {
                            warn!(unit = %unit, error = %e, "log tail unavailable");
                            LogTail {
                                unit,
                                text: String::new(),
                                error: Some(e),
                            }
                        }
                    }
                })
            })
            .collect();
        join_ordered(handles, "log tail").await
    }

    /// Guests of both kinds plus their disks as a hypervisor-disk listing.
    async fn collect_guests(&self) -> (GuestInventory, Listing) {
        let (vms, containers) = tokio::join!(
            self.guests_of(GuestKind::Qemu),
            self.guests_of(GuestKind::Lxc)
        );

        let mut guests = Vec::new();
        let mut errors = Vec::new();
        for (kind, result) in [(GuestKind::Qemu, vms), (GuestKind::Lxc, containers)] {
            match result {
                Ok(mut found) => guests.append(&mut found),
                Err(error) => {
                    warn!(?kind, error = %error, "guest list unavailable");
                    errors.push(GuestError { kind, error });
                }
            }
        }

        // The disk tier only fails when no guest table could be read.
        let listing = match errors.first() {
            Some(first) if errors.len() == 2 => {
                Listing::failed(Tier::HypervisorDisk, first.error.clone())
            }
            _ => Listing::ok(
                Tier::HypervisorDisk,
                guests.iter().map(guest_artifact).collect(),
            ),
        };

        let inventory = GuestInventory {
            disks: self.costing.tier_view(listing.clone()),
            guests,
            errors,
        };
        (inventory, listing)
    }

    async fn guests_of(&self, kind: GuestKind) -> Result<Vec<Guest>, SourceError> {
        let table = bounded(
            self.config.timeouts.hypervisor_secs,
            self.providers.hypervisor.list_guests(kind),
        )
        .await?;

        let handles: Vec<_> = parse_guest_list(&table, kind)
            .into_iter()
            .map(|row| {
                let this = self.clone();
                tokio::spawn(async move {
                    let config = match bounded(this.config.timeouts.hypervisor_secs, async {
                        Ok::<_, SourceError>(
                            this.providers.hypervisor.read_disk_config(kind, &row.id).await,
                        )
                    })
                    .await
                    {
                        Ok(text) => text,
                        Err(e) => {
                            debug!(id = %row.id, error = %e, "guest config unavailable");
                            String::new()
                        }
                    };
                    let costs = CostEstimator::new(this.config.rates);
                    build_guest(row, kind, &config, &costs)
                })
            })
            .collect();
        Ok(join_ordered(handles, "guest config").await)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn units(&self) -> Vec<String> {
        self.config.scopes().into_iter().map(|s| s.service).collect()
    }

    /// Run a filesystem scan on the blocking pool under the local deadline.
    async fn scan_local<F>(&self, context: PathBuf, scan: F) -> Listing
    where
        F: FnOnce() -> Listing + Send + 'static,
    {
        let secs = self.config.timeouts.local_secs;
        match tokio::time::timeout(Duration::from_secs(secs), tokio::task::spawn_blocking(scan))
            .await
        {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                warn!(error = %e, "filesystem scan task failed");
                Listing::failed(
                    Tier::Local,
                    SourceError::Io {
                        path: context,
                        reason: e.to_string(),
                    },
                )
            }
            Err(_) => {
                warn!("filesystem scan of {} timed out", context.display());
                Listing::failed(Tier::Local, SourceError::Timeout { secs })
            }
        }
    }
}

/// Resolve `fut` if `enabled`, else skip it.
async fn when<T>(enabled: bool, fut: impl Future<Output = T>) -> Option<T> {
    if enabled {
        Some(fut.await)
    } else {
        None
    }
}

/// Bound a provider call by `secs`, independent of any deadline the provider
/// enforces itself.
async fn bounded<T>(
    secs: u64,
    fut: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .unwrap_or(Err(SourceError::Timeout { secs }))
}

/// Await spawned tasks in spawn order. A panicked task is logged and left out.
async fn join_ordered<T>(handles: Vec<JoinHandle<T>>, what: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(value) => out.push(value),
            Err(e) => warn!(error = %e, "{what} task failed"),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
