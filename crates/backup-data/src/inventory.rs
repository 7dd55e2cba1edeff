//! Per-tier inventory collection.
//!
//! Normalises local directory listings, remote object listings and
//! hypervisor disk declarations into [`Artifact`] sequences. Nothing here
//! caches: every call re-reads its source, so two calls over unchanged data
//! return identical sequences.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use backup_core::error::SourceError;
use backup_core::models::{Artifact, Guest, GuestKind, Listing, Tier};
use backup_core::pricing::CostEstimator;
use backup_core::time_utils::TimestampParser;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

// ── Local tier ────────────────────────────────────────────────────────────────

/// List the files directly inside `dir` whose names match the glob
/// `pattern`, sorted by name.
///
/// A missing directory is an empty listing, not an error.
pub fn list_local(dir: &Path, pattern: &str) -> Listing {
    let matcher = match compile_pattern(pattern) {
        Ok(m) => m,
        Err(e) => return Listing::failed(Tier::Local, e),
    };

    if !dir.exists() {
        debug!("local directory does not exist: {}", dir.display());
        return Listing::ok(Tier::Local, Vec::new());
    }
    if let Err(e) = std::fs::read_dir(dir) {
        warn!("cannot read local directory {}: {}", dir.display(), e);
        return Listing::failed(
            Tier::Local,
            SourceError::Io {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            },
        );
    }

    let mut artifacts: Vec<Artifact> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && matcher.is_match(entry.file_name()))
        .filter_map(|entry| file_artifact(entry.path(), false))
        .collect();

    artifacts.sort_by(|a, b| a.name.cmp(&b.name));
    Listing::ok(Tier::Local, artifacts)
}

/// The newest `max_items` archives of [`list_local`], newest-modified-first.
pub fn recent_local(dir: &Path, pattern: &str, max_items: usize) -> Listing {
    let mut listing = list_local(dir, pattern);
    sort_newest_first(&mut listing.artifacts);
    listing.artifacts.truncate(max_items);
    listing
}

/// Every file below each of `roots` (any depth), newest-modified-first,
/// capped at `max_items`. Each artifact carries its full path.
///
/// Roots that do not exist are skipped.
pub fn list_local_recursive(roots: &[PathBuf], max_items: usize) -> Listing {
    let mut artifacts = Vec::new();

    for root in roots {
        if !root.exists() {
            debug!("scan root does not exist: {}", root.display());
            continue;
        }
        artifacts.extend(
            walkdir::WalkDir::new(root)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(e) => Some(e),
                    Err(err) => {
                        debug!("skipping unreadable entry under {}: {}", root.display(), err);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| file_artifact(entry.path(), true)),
        );
    }

    sort_newest_first(&mut artifacts);
    artifacts.truncate(max_items);
    Listing::ok(Tier::Local, artifacts)
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, SourceError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| SourceError::Malformed(format!("invalid pattern {pattern:?}: {e}")))
}

fn file_artifact(path: &Path, with_path: bool) -> Option<Artifact> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!("skipping {}: {}", path.display(), e);
            return None;
        }
    };
    let name = path.file_name()?.to_string_lossy().to_string();
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    let mut artifact = Artifact::new(name, metadata.len(), modified, Tier::Local);
    if with_path {
        artifact.path = Some(path.to_path_buf());
    }
    Some(artifact)
}

/// Newest first; unknown times last; ties broken by path then name so the
/// order is stable across calls.
fn sort_newest_first(artifacts: &mut [Artifact]) {
    artifacts.sort_by(|a, b| {
        let by_time = match (a.modified_time, b.modified_time) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.name.cmp(&b.name))
    });
}

// ── Remote tier ───────────────────────────────────────────────────────────────

/// One entry of an `rclone lsjson` listing.
#[derive(Debug, Deserialize)]
struct RemoteEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Size", default)]
    size: Option<i64>,
    #[serde(rename = "ModTime", default)]
    mod_time: Option<String>,
    #[serde(rename = "IsDir", default)]
    is_dir: Option<bool>,
}

/// Parse an `rclone lsjson` document into remote artifacts,
/// newest-modified-first.
///
/// Directories are skipped and negative or missing sizes (rclone's
/// "unknown") count as zero. An entry that cannot be read is skipped; only a
/// document that is not a JSON array fails.
pub fn parse_remote_listing(
    json: &str,
    timestamps: &TimestampParser,
) -> Result<Vec<Artifact>, SourceError> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(trimmed).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let mut artifacts: Vec<Artifact> = entries
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RemoteEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("skipping remote entry: {}", e);
                None
            }
        })
        .filter(|e| !e.is_dir.unwrap_or(false))
        .map(|e| {
            let size = e.size.and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
            let modified = e.mod_time.as_deref().and_then(|t| timestamps.parse(t));
            Artifact::new(e.name, size, modified, Tier::Remote)
        })
        .collect();

    sort_newest_first(&mut artifacts);
    Ok(artifacts)
}

// ── Hypervisor-disk tier ──────────────────────────────────────────────────────

fn disk_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"size=([0-9.]+)([MGT])").expect("regex is valid"))
}

/// Sum every `size=<value><unit>` declaration in a guest config, in GB.
///
/// `M` counts as 1/1024 GB, `T` as 1024 GB. Empty or unparsable config
/// yields `0.0`.
pub fn parse_disk_size_gb(config: &str) -> f64 {
    disk_size_regex()
        .captures_iter(config)
        .filter_map(|caps| {
            let value: f64 = match caps[1].parse() {
                Ok(v) => v,
                Err(_) => {
                    debug!("unparsable disk size {:?}", &caps[0]);
                    return None;
                }
            };
            Some(match &caps[2] {
                "T" => value * 1024.0,
                "M" => value / 1024.0,
                _ => value,
            })
        })
        .sum()
}

/// A row of the hypervisor's guest table before disk sizes are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestRow {
    pub id: String,
    pub name: String,
    pub status: String,
}

/// Parse `qm list` / `pct list` output.
///
/// The header line is skipped, as is any line with fewer than three columns.
/// VM tables are `VMID NAME STATUS ...`; container tables are
/// `VMID STATUS [LOCK] NAME`.
pub fn parse_guest_list(text: &str, kind: GuestKind) -> Vec<GuestRow> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            let (name, status) = match kind {
                GuestKind::Qemu => (parts[1], parts[2]),
                GuestKind::Lxc => (parts[parts.len() - 1], parts[1]),
            };
            Some(GuestRow {
                id: parts[0].to_string(),
                name: name.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

/// Combine a guest row with its config text.
pub fn build_guest(row: GuestRow, kind: GuestKind, config: &str, costs: &CostEstimator) -> Guest {
    let disk_gb = parse_disk_size_gb(config);
    Guest {
        id: row.id,
        name: row.name,
        status: row.status,
        kind,
        disk_gb,
        est_storage: costs.estimate_gb(disk_gb).storage,
    }
}

/// Express a guest's declared disks as a hypervisor-disk artifact.
pub fn guest_artifact(guest: &Guest) -> Artifact {
    let bytes = (guest.disk_gb * backup_core::pricing::BYTES_PER_GB).round().max(0.0) as u64;
    Artifact::new(
        format!("{} ({})", guest.name, guest.id),
        bytes,
        None,
        Tier::HypervisorDisk,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn write_file(dir: &Path, name: &str, bytes: usize, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![b'x'; bytes]).unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    fn names(listing: &Listing) -> Vec<&str> {
        listing.artifacts.iter().map(|a| a.name.as_str()).collect()
    }

    // ── list_local ────────────────────────────────────────────────────────────

    #[test]
    fn test_list_local_missing_dir_is_empty_not_error() {
        let listing = list_local(Path::new("/tmp/does-not-exist-backup-monitor-xyz"), "*.tar.gz");
        assert!(listing.artifacts.is_empty());
        assert!(listing.error.is_none());
    }

    #[test]
    fn test_list_local_filters_by_pattern_and_sorts_by_name() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "b.tar.gz", 10, 0);
        write_file(dir.path(), "a.tar.gz", 20, 0);
        write_file(dir.path(), "notes.txt", 5, 0);

        let listing = list_local(dir.path(), "*.tar.gz");
        assert_eq!(names(&listing), vec!["a.tar.gz", "b.tar.gz"]);
        assert_eq!(listing.artifacts[0].size_bytes, 20);
        assert!(listing.artifacts.iter().all(|a| a.source_tier == Tier::Local));
        assert!(listing.artifacts.iter().all(|a| a.modified_time.is_some()));
    }

    #[test]
    fn test_list_local_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir_all(&sub).unwrap();
        write_file(&sub, "deep.tar.gz", 1, 0);
        write_file(dir.path(), "top.tar.gz", 1, 0);

        let listing = list_local(dir.path(), "*.tar.gz");
        assert_eq!(names(&listing), vec!["top.tar.gz"]);
    }

    #[test]
    fn test_list_local_invalid_pattern_is_degraded() {
        let dir = TempDir::new().unwrap();
        let listing = list_local(dir.path(), "[unclosed");
        assert!(matches!(listing.error, Some(SourceError::Malformed(_))));
    }

    #[test]
    fn test_list_local_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.tar.gz", 3, 10);
        write_file(dir.path(), "b.tar.gz", 4, 5);
        assert_eq!(list_local(dir.path(), "*.tar.gz"), list_local(dir.path(), "*.tar.gz"));
    }

    // ── recent_local ──────────────────────────────────────────────────────────

    #[test]
    fn test_recent_local_newest_first_and_capped() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "old.tar.gz", 1, 300);
        write_file(dir.path(), "new.tar.gz", 1, 10);
        write_file(dir.path(), "mid.tar.gz", 1, 100);

        let listing = recent_local(dir.path(), "*.tar.gz", 2);
        assert_eq!(names(&listing), vec!["new.tar.gz", "mid.tar.gz"]);
    }

    // ── list_local_recursive ──────────────────────────────────────────────────

    #[test]
    fn test_recursive_scans_all_roots_newest_first() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let nested = a.path().join("x").join("y");
        std::fs::create_dir_all(&nested).unwrap();
        write_file(&nested, "deep.vma.zst", 8, 50);
        write_file(a.path(), "top.log", 2, 500);
        write_file(b.path(), "other.vma.zst", 4, 5);

        let roots = vec![
            a.path().to_path_buf(),
            PathBuf::from("/tmp/does-not-exist-backup-monitor-root"),
            b.path().to_path_buf(),
        ];
        let listing = list_local_recursive(&roots, 10);
        assert!(listing.error.is_none());
        assert_eq!(names(&listing), vec!["other.vma.zst", "deep.vma.zst", "top.log"]);
        assert_eq!(
            listing.artifacts[1].path.as_deref(),
            Some(nested.join("deep.vma.zst").as_path())
        );
    }

    #[test]
    fn test_recursive_cap() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write_file(dir.path(), &format!("f{i}"), 1, i * 10);
        }
        let listing = list_local_recursive(&[dir.path().to_path_buf()], 3);
        assert_eq!(names(&listing), vec!["f0", "f1", "f2"]);
    }

    #[test]
    fn test_recursive_no_roots() {
        let listing = list_local_recursive(&[], 10);
        assert!(listing.artifacts.is_empty());
        assert!(listing.error.is_none());
    }

    // ── parse_remote_listing ──────────────────────────────────────────────────

    #[test]
    fn test_remote_listing_sorted_newest_first() {
        let json = r#"[
            {"Path":"a.tar.gz","Name":"a.tar.gz","Size":100,"MimeType":"application/gzip","ModTime":"2024-01-01T00:00:00.000000000Z","IsDir":false},
            {"Path":"b.tar.gz","Name":"b.tar.gz","Size":200,"ModTime":"2024-02-01T00:00:00Z","IsDir":false},
            {"Path":"sub","Name":"sub","Size":-1,"ModTime":"2024-03-01T00:00:00Z","IsDir":true}
        ]"#;
        let items = parse_remote_listing(json, &TimestampParser::default()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "b.tar.gz");
        assert_eq!(items[1].size_bytes, 100);
        assert!(items.iter().all(|a| a.source_tier == Tier::Remote));
    }

    #[test]
    fn test_remote_listing_negative_size_is_zero() {
        let json = r#"[{"Name":"x","Size":-1,"ModTime":"bogus"}]"#;
        let items = parse_remote_listing(json, &TimestampParser::default()).unwrap();
        assert_eq!(items[0].size_bytes, 0);
        assert!(items[0].modified_time.is_none());
    }

    #[test]
    fn test_remote_listing_empty_output() {
        let items = parse_remote_listing("", &TimestampParser::default()).unwrap();
        assert!(items.is_empty());
        let items = parse_remote_listing("[]", &TimestampParser::default()).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_remote_listing_skips_unreadable_entries() {
        let json = r#"[
            {"Name":"good.tar.gz","Size":10,"ModTime":"2024-01-01T00:00:00Z","IsDir":false},
            {"Size":20,"ModTime":"2024-01-02T00:00:00Z","IsDir":false},
            {"Name":"null-size.tar.gz","Size":null,"ModTime":null},
            "not an object"
        ]"#;
        let items = parse_remote_listing(json, &TimestampParser::default()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "good.tar.gz");
        assert_eq!(items[0].size_bytes, 10);
        assert_eq!(items[1].name, "null-size.tar.gz");
        assert_eq!(items[1].size_bytes, 0);
        assert!(items[1].modified_time.is_none());
    }

    #[test]
    fn test_remote_listing_not_an_array_is_malformed() {
        let err = parse_remote_listing(r#"{"Name":"x"}"#, &TimestampParser::default())
            .unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn test_remote_listing_malformed() {
        let err = parse_remote_listing("{not json", &TimestampParser::default()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    // ── disk sizes ────────────────────────────────────────────────────────────

    #[test]
    fn test_disk_size_units() {
        let config = "boot: order=scsi0\n\
                      scsi0: local-lvm:vm-100-disk-0,size=32G\n\
                      scsi1: big:vm-100-disk-1,size=1T\n\
                      efidisk0: local-lvm:vm-100-disk-2,size=512M\n\
                      memory: 4096\n";
        let gb = parse_disk_size_gb(config);
        assert!((gb - (32.0 + 1024.0 + 0.5)).abs() < 1e-9, "gb = {gb}");
    }

    #[test]
    fn test_disk_size_fractional() {
        assert!((parse_disk_size_gb("rootfs: local:subvol,size=8.5G") - 8.5).abs() < 1e-9);
    }

    #[test]
    fn test_disk_size_missing_is_zero() {
        assert_eq!(parse_disk_size_gb(""), 0.0);
        assert_eq!(parse_disk_size_gb("memory: 2048\ncores: 2"), 0.0);
        assert_eq!(parse_disk_size_gb("scsi0: x,size=12K"), 0.0);
    }

    #[test]
    fn test_disk_size_skips_unparsable_value() {
        assert!((parse_disk_size_gb("a,size=1.2.3G\nb,size=4G") - 4.0).abs() < 1e-9);
    }

    // ── guest lists ───────────────────────────────────────────────────────────

    #[test]
    fn test_parse_qm_list() {
        let text = "      VMID NAME                 STATUS     MEM(MB)    BOOTDISK(GB) PID\n\
                    \x20      100 web                  running    4096              32.00 1234\n\
                    \x20      101 db                   stopped    8192              64.00 0\n";
        let rows = parse_guest_list(text, GuestKind::Qemu);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            GuestRow {
                id: "100".to_string(),
                name: "web".to_string(),
                status: "running".to_string()
            }
        );
        assert_eq!(rows[1].status, "stopped");
    }

    #[test]
    fn test_parse_pct_list_with_and_without_lock() {
        let text = "VMID       Status     Lock         Name\n\
                    200        running                 dns\n\
                    201        stopped    backup       files\n\
                    bad line\n";
        let rows = parse_guest_list(text, GuestKind::Lxc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "dns");
        assert_eq!(rows[0].status, "running");
        assert_eq!(rows[1].name, "files");
    }

    #[test]
    fn test_parse_guest_list_empty() {
        assert!(parse_guest_list("", GuestKind::Qemu).is_empty());
        assert!(parse_guest_list("VMID NAME STATUS", GuestKind::Qemu).is_empty());
    }

    #[test]
    fn test_build_guest_and_artifact() {
        let row = GuestRow {
            id: "100".to_string(),
            name: "web".to_string(),
            status: "running".to_string(),
        };
        let guest = build_guest(row, GuestKind::Qemu, "scsi0: x,size=2G", &CostEstimator::default());
        assert!((guest.disk_gb - 2.0).abs() < 1e-12);
        assert!((guest.est_storage - 0.01).abs() < 1e-12);

        let artifact = guest_artifact(&guest);
        assert_eq!(artifact.size_bytes, 2 * 1_073_741_824);
        assert_eq!(artifact.source_tier, Tier::HypervisorDisk);
        assert_eq!(artifact.name, "web (100)");
    }
}
