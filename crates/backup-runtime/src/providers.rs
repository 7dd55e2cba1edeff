//! Boundaries to the external systems the dashboard reads from.
//!
//! Each trait has one production implementation that shells out to the
//! usual tool (`journalctl`, `rclone`, `qm`/`pct`, `systemctl`) and one
//! in-memory double in [`testing`] that returns canned data.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use backup_core::error::SourceError;
use backup_core::models::{Artifact, GuestKind, TimerInfo};
use backup_core::time_utils::TimestampParser;
use backup_data::inventory::parse_remote_listing;
use backup_data::timers::parse_timer_properties;
use tracing::debug;

use crate::command::run_command;

// ── Traits ────────────────────────────────────────────────────────────────────

/// Source of service log lines.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// The newest `max_lines` lines of `unit`'s log, newest-first.
    async fn fetch_recent_lines(&self, unit: &str, max_lines: u32)
        -> Result<Vec<String>, SourceError>;
}

/// Lister for the remote object-storage tier.
#[async_trait]
pub trait RemoteLister: Send + Sync {
    async fn list_remote(&self, target: &str) -> Result<Vec<Artifact>, SourceError>;
}

/// Read-only view of the hypervisor.
#[async_trait]
pub trait HypervisorReader: Send + Sync {
    /// Raw guest table (`qm list` / `pct list` layout).
    async fn list_guests(&self, kind: GuestKind) -> Result<String, SourceError>;

    /// Raw config text of one guest; empty when it cannot be read.
    async fn read_disk_config(&self, kind: GuestKind, id: &str) -> String;
}

/// Service-manager timer schedules.
#[async_trait]
pub trait TimerSource: Send + Sync {
    async fn timer_info(&self, timer: &str) -> Result<TimerInfo, SourceError>;
}

// ── journalctl ────────────────────────────────────────────────────────────────

/// Reads unit logs with `journalctl --output short-iso`.
#[derive(Debug, Clone)]
pub struct JournalLogSource {
    timeout: Duration,
}

impl JournalLogSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LogSource for JournalLogSource {
    async fn fetch_recent_lines(
        &self,
        unit: &str,
        max_lines: u32,
    ) -> Result<Vec<String>, SourceError> {
        let max = max_lines.to_string();
        let out = run_command(
            "journalctl",
            &["-u", unit, "-n", max.as_str(), "--no-pager", "--output", "short-iso"],
            self.timeout,
        )
        .await?;
        // journalctl prints oldest-first.
        Ok(out.lines().rev().map(str::to_string).collect())
    }
}

// ── rclone ────────────────────────────────────────────────────────────────────

/// Lists a remote with `rclone lsjson --files-only`.
#[derive(Debug, Clone)]
pub struct RcloneLister {
    config_file: PathBuf,
    timeout: Duration,
    timestamps: TimestampParser,
}

impl RcloneLister {
    pub fn new(config_file: PathBuf, timeout: Duration, timestamps: TimestampParser) -> Self {
        Self {
            config_file,
            timeout,
            timestamps,
        }
    }
}

#[async_trait]
impl RemoteLister for RcloneLister {
    async fn list_remote(&self, target: &str) -> Result<Vec<Artifact>, SourceError> {
        let config = self.config_file.to_string_lossy();
        let out = run_command(
            "rclone",
            &["lsjson", target, "--config", &*config, "--files-only"],
            self.timeout,
        )
        .await?;
        let items = parse_remote_listing(&out, &self.timestamps)?;
        debug!(remote = target, count = items.len(), "remote listing parsed");
        Ok(items)
    }
}

// ── Proxmox ───────────────────────────────────────────────────────────────────

/// Queries guests with `qm` (VMs) and `pct` (containers).
#[derive(Debug, Clone)]
pub struct ProxmoxHypervisor {
    timeout: Duration,
}

impl ProxmoxHypervisor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn tool(kind: GuestKind) -> &'static str {
        match kind {
            GuestKind::Qemu => "qm",
            GuestKind::Lxc => "pct",
        }
    }
}

#[async_trait]
impl HypervisorReader for ProxmoxHypervisor {
    async fn list_guests(&self, kind: GuestKind) -> Result<String, SourceError> {
        run_command(Self::tool(kind), &["list"], self.timeout).await
    }

    async fn read_disk_config(&self, kind: GuestKind, id: &str) -> String {
        match run_command(Self::tool(kind), &["config", id], self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                debug!(id, error = %e, "guest config unavailable");
                String::new()
            }
        }
    }
}

// ── systemd ───────────────────────────────────────────────────────────────────

/// Reads timer schedules with `systemctl show`.
#[derive(Debug, Clone)]
pub struct SystemdTimers {
    timeout: Duration,
}

impl SystemdTimers {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TimerSource for SystemdTimers {
    async fn timer_info(&self, timer: &str) -> Result<TimerInfo, SourceError> {
        let out = run_command(
            "systemctl",
            &[
                "show",
                timer,
                "-p",
                "NextElapseUSecRealtime",
                "-p",
                "LastTriggerUSecRealtime",
                "-p",
                "Unit",
            ],
            self.timeout,
        )
        .await?;
        Ok(parse_timer_properties(timer, &out))
    }
}

// ── Test doubles ──────────────────────────────────────────────────────────────

/// Canned-data providers for exercising the engine without any external
/// system installed.
pub mod testing {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    /// Returns fixed lines per unit, optionally after a delay. Unknown units
    /// fail with `NotFound`.
    #[derive(Debug, Clone, Default)]
    pub struct StaticLogSource {
        units: HashMap<String, Result<Vec<String>, SourceError>>,
        delay: Option<Duration>,
    }

    impl StaticLogSource {
        /// `lines` must already be newest-first.
        pub fn with_lines(mut self, unit: &str, lines: &[&str]) -> Self {
            self.units.insert(
                unit.to_string(),
                Ok(lines.iter().map(|l| l.to_string()).collect()),
            );
            self
        }

        pub fn with_error(mut self, unit: &str, error: SourceError) -> Self {
            self.units.insert(unit.to_string(), Err(error));
            self
        }

        /// Sleep before answering, to simulate a hung journal.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl LogSource for StaticLogSource {
        async fn fetch_recent_lines(
            &self,
            unit: &str,
            max_lines: u32,
        ) -> Result<Vec<String>, SourceError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            match self.units.get(unit) {
                Some(Ok(lines)) => Ok(lines.iter().take(max_lines as usize).cloned().collect()),
                Some(Err(e)) => Err(e.clone()),
                None => Err(SourceError::NotFound(unit.to_string())),
            }
        }
    }

    /// Returns fixed listings per target, optionally after a delay.
    #[derive(Debug, Clone, Default)]
    pub struct StaticRemoteLister {
        targets: HashMap<String, Result<Vec<Artifact>, SourceError>>,
        delay: Option<Duration>,
    }

    impl StaticRemoteLister {
        pub fn with_listing(mut self, target: &str, items: Vec<Artifact>) -> Self {
            self.targets.insert(target.to_string(), Ok(items));
            self
        }

        pub fn with_error(mut self, target: &str, error: SourceError) -> Self {
            self.targets.insert(target.to_string(), Err(error));
            self
        }

        /// Sleep before answering, to simulate a slow remote.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl RemoteLister for StaticRemoteLister {
        async fn list_remote(&self, target: &str) -> Result<Vec<Artifact>, SourceError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            match self.targets.get(target) {
                Some(result) => result.clone(),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Fixed guest tables and configs.
    #[derive(Debug, Clone, Default)]
    pub struct StaticHypervisor {
        lists: HashMap<GuestKind, Result<String, SourceError>>,
        configs: HashMap<String, String>,
    }

    impl StaticHypervisor {
        pub fn with_list(mut self, kind: GuestKind, text: &str) -> Self {
            self.lists.insert(kind, Ok(text.to_string()));
            self
        }

        pub fn with_list_error(mut self, kind: GuestKind, error: SourceError) -> Self {
            self.lists.insert(kind, Err(error));
            self
        }

        pub fn with_config(mut self, id: &str, text: &str) -> Self {
            self.configs.insert(id.to_string(), text.to_string());
            self
        }
    }

    #[async_trait]
    impl HypervisorReader for StaticHypervisor {
        async fn list_guests(&self, kind: GuestKind) -> Result<String, SourceError> {
            self.lists
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::NotFound(format!("{kind:?}"))))
        }

        async fn read_disk_config(&self, _kind: GuestKind, id: &str) -> String {
            self.configs.get(id).cloned().unwrap_or_default()
        }
    }

    /// Fixed timer answers; unknown timers fail.
    #[derive(Debug, Clone, Default)]
    pub struct StaticTimers {
        timers: HashMap<String, TimerInfo>,
    }

    impl StaticTimers {
        pub fn with_timer(mut self, info: TimerInfo) -> Self {
            self.timers.insert(info.unit.clone(), info);
            self
        }
    }

    #[async_trait]
    impl TimerSource for StaticTimers {
        async fn timer_info(&self, timer: &str) -> Result<TimerInfo, SourceError> {
            self.timers
                .get(timer)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(timer.to_string()))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use backup_core::models::Tier;

    #[tokio::test]
    async fn test_static_log_source_respects_max_lines() {
        let src = StaticLogSource::default().with_lines("u", &["c", "b", "a"]);
        let lines = src.fetch_recent_lines("u", 2).await.unwrap();
        assert_eq!(lines, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_static_log_source_unknown_unit_fails() {
        let src = StaticLogSource::default();
        assert!(src.fetch_recent_lines("nope", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_static_remote_lister() {
        let lister = StaticRemoteLister::default()
            .with_listing("r:b/p", vec![Artifact::new("a", 1, None, Tier::Remote)])
            .with_error("r:b/x", SourceError::Timeout { secs: 12 });
        assert_eq!(lister.list_remote("r:b/p").await.unwrap().len(), 1);
        assert!(lister.list_remote("r:b/x").await.is_err());
        assert!(lister.list_remote("r:b/other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_hypervisor_missing_config_is_empty() {
        let hv = StaticHypervisor::default().with_list(GuestKind::Qemu, "VMID NAME STATUS");
        assert!(hv.list_guests(GuestKind::Qemu).await.is_ok());
        assert!(hv.list_guests(GuestKind::Lxc).await.is_err());
        assert_eq!(hv.read_disk_config(GuestKind::Qemu, "100").await, "");
    }

    #[tokio::test]
    async fn test_production_providers_degrade_when_tools_missing() {
        // Points at a config that cannot exist; whether or not rclone is
        // installed, the call must come back as an error rather than hang.
        let lister = RcloneLister::new(
            PathBuf::from("/nonexistent/rclone.conf"),
            Duration::from_secs(5),
            TimestampParser::default(),
        );
        assert!(lister.list_remote("missing-remote:bucket").await.is_err());
    }
}
