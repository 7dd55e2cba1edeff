use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};
use crate::models::LogMarkers;
use crate::pricing::CostRates;
use crate::time_utils::TimestampParser;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Backup inventory, run history and cost dashboard
#[derive(Parser, Debug, Clone)]
#[command(
    name = "backup-monitor",
    about = "Backup inventory, run history and cost dashboard",
    version
)]
pub struct Settings {
    /// Path to the YAML configuration file
    #[arg(long, env = "BACKUP_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Which part of the dashboard to produce
    #[arg(long, default_value = "all", value_parser = ["status", "backups", "runs", "vms", "all"])]
    pub view: String,

    /// Output format
    #[arg(long, default_value = "json", value_parser = ["json", "text"])]
    pub format: String,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Number of runs to reconstruct per service unit
    #[arg(long)]
    pub runs: Option<usize>,

    /// Timezone for log timestamps without an offset (overrides the config file)
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// Logging level
    #[arg(long, default_value = "WARNING", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse CLI arguments from the process environment.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Parse an explicit argument list and resolve flags that depend on each
    /// other.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Self {
        let mut settings = Settings::parse_from(args);
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Resolve the configuration path: `--config` when given, otherwise
    /// `~/.backup-monitor/config.yml`.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(AppConfig::default_path)
    }

    /// Load the configuration file and apply CLI overrides on top.
    ///
    /// `args` must be the same argument list the settings were parsed from;
    /// it is used to tell explicitly passed flags from defaults.
    pub fn resolve_config(&self, args: Vec<std::ffi::OsString>) -> Result<AppConfig> {
        let matches = Settings::command().get_matches_from(args);
        let mut config = AppConfig::load_from(&self.config_path())?;

        if is_arg_explicitly_set(&matches, "timezone") {
            config.timezone = self.timezone.clone();
        }
        if let Some(runs) = self.runs {
            config.ui.runs_per_unit = runs;
        }

        config.validate()?;
        Ok(config)
    }
}

// ── AppConfig (file) ───────────────────────────────────────────────────────────

/// Local paths and the systemd units that produce the backups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub local_configs: PathBuf,
    pub local_vms: PathBuf,
    /// Roots scanned recursively for hypervisor dump files.
    pub dump_roots: Vec<PathBuf>,
    pub configs_service: String,
    pub vms_service: String,
    /// Glob matched against archive file names in the flat local listings.
    pub archive_pattern: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            local_configs: PathBuf::from("/var/backups/proxmox-b2/configs"),
            local_vms: PathBuf::from("/var/backups/proxmox-b2/vms"),
            dump_roots: vec![
                PathBuf::from("/var/lib/vz/dump"),
                PathBuf::from("/mnt/thinner/backups"),
            ],
            configs_service: "proxmox-config-b2.service".to_string(),
            vms_service: "proxmox-vms-b2.service".to_string(),
            archive_pattern: "*.tar.gz".to_string(),
        }
    }
}

/// The object-storage remote that mirrors the local archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote name as known to the listing tool.
    pub remote: String,
    pub bucket: String,
    pub prefix_configs: String,
    pub prefix_vms: String,
    /// Configuration file handed to the listing tool.
    pub rclone_config: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            remote: "proxmox-b2".to_string(),
            bucket: String::new(),
            prefix_configs: "proxmox/configs".to_string(),
            prefix_vms: "proxmox/vms".to_string(),
            rclone_config: PathBuf::from("/root/.config/rclone/rclone.conf"),
        }
    }
}

impl RemoteConfig {
    /// Listing target `remote:bucket/prefix` with any trailing slash removed.
    pub fn target(&self, prefix: &str) -> String {
        format!("{}:{}/{}", self.remote, self.bucket, prefix)
            .trim_end_matches('/')
            .to_string()
    }
}

/// How much history and inventory to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Log lines fetched per unit for run reconstruction.
    pub journal_lines: u32,
    /// Runs reconstructed per unit.
    pub runs_per_unit: usize,
    /// Successful runs shown per unit in the status view.
    pub successful_runs_shown: usize,
    /// Newest local archives shown per scope in the status view.
    pub recent_archives: usize,
    /// Cap on remote items listed per scope (totals still cover everything).
    pub max_remote_items: usize,
    /// Cap on files returned by the recursive dump scan.
    pub max_dump_items: usize,
    /// Log lines shown per unit in the log tail panel.
    pub tail_lines: u32,
    /// Characters kept of each log tail before it is cut.
    pub tail_chars: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            journal_lines: 400,
            runs_per_unit: 12,
            successful_runs_shown: 6,
            recent_archives: 8,
            max_remote_items: 200,
            max_dump_items: 400,
            tail_lines: 50,
            tail_chars: 3000,
        }
    }
}

/// Per-source deadlines in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub listing_secs: u64,
    pub log_secs: u64,
    pub hypervisor_secs: u64,
    pub timer_secs: u64,
    /// Recursive filesystem scans.
    pub local_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            listing_secs: 15,
            log_secs: 8,
            hypervisor_secs: 15,
            timer_secs: 8,
            local_secs: 30,
        }
    }
}

/// Everything read from `config.yml`. Every section and key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub remote: RemoteConfig,
    pub rates: CostRates,
    pub ui: UiConfig,
    pub timeouts: TimeoutsConfig,
    /// Substrings that mark run boundaries in the unit logs.
    pub markers: LogMarkers,
    /// IANA zone for log timestamps that carry no offset, or `"auto"`.
    pub timezone: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            remote: RemoteConfig::default(),
            rates: CostRates::default(),
            ui: UiConfig::default(),
            timeouts: TimeoutsConfig::default(),
            markers: LogMarkers::default(),
            timezone: "UTC".to_string(),
        }
    }
}

/// One logical group of backups compared across tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeConfig {
    pub name: String,
    pub local_dir: PathBuf,
    pub remote_target: String,
    pub service: String,
}

impl AppConfig {
    /// Default location: `~/.backup-monitor/config.yml`.
    pub fn default_path() -> PathBuf {
        Self::default_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Default location rooted at `base_dir` (used for testing).
    pub fn default_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".backup-monitor").join("config.yml")
    }

    /// Load the configuration from `path`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is
    /// an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| MonitorError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values that would make every query meaningless.
    pub fn validate(&self) -> Result<()> {
        if !TimestampParser::validate_timezone(&self.timezone) {
            return Err(MonitorError::Config(format!(
                "unknown timezone: {}",
                self.timezone
            )));
        }
        if self.rates.storage_per_gb < 0.0 || self.rates.egress_per_gb < 0.0 {
            return Err(MonitorError::Config(
                "cost rates must not be negative".to_string(),
            ));
        }
        if self.markers.start.is_empty() {
            return Err(MonitorError::Config(
                "markers.start must name at least one marker".to_string(),
            ));
        }
        if self.ui.journal_lines == 0 {
            return Err(MonitorError::Config(
                "ui.journal_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The scopes compared across tiers: configuration archives and VM
    /// archives.
    pub fn scopes(&self) -> Vec<ScopeConfig> {
        vec![
            ScopeConfig {
                name: "configs".to_string(),
                local_dir: self.paths.local_configs.clone(),
                remote_target: self.remote.target(&self.remote.prefix_configs),
                service: self.paths.configs_service.clone(),
            },
            ScopeConfig {
                name: "vms".to_string(),
                local_dir: self.paths.local_vms.clone(),
                remote_target: self.remote.target(&self.remote.prefix_vms),
                service: self.paths.vms_service.clone(),
            },
        ]
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<OsString> {
        std::iter::once("backup-monitor")
            .chain(list.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
        let path = tmp.path().join("config.yml");
        std::fs::write(&path, body).expect("write config");
        path
    }

    // ── CLI ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let s = Settings::load_from_args(args(&[]));
        assert_eq!(s.view, "all");
        assert_eq!(s.format, "json");
        assert_eq!(s.log_level, "WARNING");
        assert!(s.runs.is_none());
        assert!(!s.pretty);
    }

    #[test]
    fn test_settings_debug_overrides_log_level() {
        let s = Settings::load_from_args(args(&["--debug", "--log-level", "ERROR"]));
        assert_eq!(s.log_level, "DEBUG");
    }

    #[test]
    fn test_settings_explicit_config_path() {
        let s = Settings::load_from_args(args(&["--config", "/etc/bm.yml"]));
        assert_eq!(s.config_path(), PathBuf::from("/etc/bm.yml"));
    }

    // ── AppConfig loading ────────────────────────────────────────────────────

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let cfg = AppConfig::load_from(&tmp.path().join("absent.yml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(
            &tmp,
            "remote:\n  bucket: my-bucket\nrates:\n  storage_per_gb: 0.006\nui:\n  journal_lines: 100\n",
        );
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.remote.bucket, "my-bucket");
        assert_eq!(cfg.remote.remote, "proxmox-b2");
        assert_eq!(cfg.rates.storage_per_gb, 0.006);
        assert_eq!(cfg.rates.egress_per_gb, 0.01);
        assert_eq!(cfg.ui.journal_lines, 100);
        assert_eq!(cfg.ui.runs_per_unit, 12);
        assert_eq!(cfg.ui.tail_lines, 50);
        assert_eq!(cfg.ui.tail_chars, 3000);
    }

    #[test]
    fn test_markers_from_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, "markers:\n  success: [\"Backup complete\"]\n");
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.markers.success, vec!["Backup complete".to_string()]);
        assert_eq!(cfg.markers.start, vec!["Starting".to_string()]);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, "paths: [unterminated");
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, MonitorError::Yaml { .. }));
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, "   \n");
        assert_eq!(AppConfig::load_from(&path).unwrap(), AppConfig::default());
    }

    // ── Validation ───────────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_bad_timezone() {
        let cfg = AppConfig {
            timezone: "Nowhere/Special".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_rates() {
        let mut cfg = AppConfig::default();
        cfg.rates.egress_per_gb = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(AppConfig::default().validate().is_ok());
    }

    // ── Remote targets and scopes ────────────────────────────────────────────

    #[test]
    fn test_remote_target_trims_trailing_slash() {
        let remote = RemoteConfig {
            bucket: "b".to_string(),
            ..RemoteConfig::default()
        };
        assert_eq!(remote.target("proxmox/configs"), "proxmox-b2:b/proxmox/configs");
        assert_eq!(remote.target(""), "proxmox-b2:b");
    }

    #[test]
    fn test_scopes() {
        let cfg = AppConfig::default();
        let scopes = cfg.scopes();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].name, "configs");
        assert_eq!(scopes[0].service, "proxmox-config-b2.service");
        assert_eq!(scopes[1].name, "vms");
        assert_eq!(scopes[1].remote_target, "proxmox-b2:/proxmox/vms");
    }

    // ── CLI overrides ────────────────────────────────────────────────────────

    #[test]
    fn test_resolve_config_cli_overrides_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, "timezone: Europe/Berlin\n");
        let path_str = path.to_str().unwrap();

        let a = args(&["--config", path_str]);
        let cfg = Settings::load_from_args(a.clone()).resolve_config(a).unwrap();
        assert_eq!(cfg.timezone, "Europe/Berlin");

        let a = args(&["--config", path_str, "--timezone", "Asia/Tokyo", "--runs", "3"]);
        let cfg = Settings::load_from_args(a.clone()).resolve_config(a).unwrap();
        assert_eq!(cfg.timezone, "Asia/Tokyo");
        assert_eq!(cfg.ui.runs_per_unit, 3);
    }
}
