//! Plain-text rendering of a [`DashboardSnapshot`] for terminals and mail.

use std::fmt::Write;

use backup_core::formatting::{format_currency, format_duration};
use backup_core::models::{Run, RunStatus};
use backup_core::time_utils::format_display_time;
use backup_data::reconcile::{ScopeHealth, TierView};
use backup_runtime::dashboard::{DashboardSnapshot, UnitHistory};

pub fn render_text(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "backup-monitor report ({} UTC)",
        format_display_time(&snapshot.generated_at)
    );

    if let Some(timers) = &snapshot.timers {
        section(&mut out, "Timers");
        for t in timers {
            let _ = writeln!(out, "  {:<32} next: {}  last: {}", t.unit, t.next, t.last);
        }
    }

    if let Some(recent) = &snapshot.recent_archives {
        section(&mut out, "Recent local archives");
        for r in recent {
            tier_line(&mut out, &r.scope, &r.archives);
            for item in &r.archives.items {
                let when = item
                    .artifact
                    .modified_time
                    .as_ref()
                    .map(format_display_time)
                    .unwrap_or_else(|| "unknown".to_string());
                let _ = writeln!(out, "      {}  {}", when, item.artifact.name);
            }
        }
    }

    if let Some(runs) = &snapshot.runs {
        section(&mut out, "Runs");
        for unit in runs {
            unit_lines(&mut out, unit);
        }
    }

    if let Some(logs) = &snapshot.logs {
        section(&mut out, "Logs");
        for tail in logs {
            let _ = writeln!(out, "  -- {} --", tail.unit);
            match &tail.error {
                Some(e) => {
                    let _ = writeln!(out, "    log unavailable: {e}");
                }
                None => {
                    for line in tail.text.lines() {
                        let _ = writeln!(out, "    {line}");
                    }
                }
            }
        }
    }

    if let Some(scopes) = &snapshot.scopes {
        section(&mut out, "Backups");
        for scope in scopes {
            let health = match scope.health {
                ScopeHealth::Complete => "complete",
                ScopeHealth::Degraded => "degraded",
                ScopeHealth::Unavailable => "unavailable",
            };
            let _ = writeln!(out, "  {} [{}]", scope.scope, health);
            for tier in scope.tiers() {
                tier_line(&mut out, &tier.tier.to_string(), tier);
            }
            if let Some(missing) = &scope.local_only {
                if !missing.is_empty() {
                    let _ = writeln!(out, "    not uploaded: {}", missing.join(", "));
                }
            }
        }
    }

    if let Some(dumps) = &snapshot.dumps {
        section(&mut out, "Dumps");
        tier_line(&mut out, "dump roots", dumps);
    }

    if let Some(inv) = &snapshot.guests {
        section(&mut out, "Guests");
        for g in &inv.guests {
            let _ = writeln!(
                out,
                "  {:>5} {:<24} {:<8} {:>8.1} GB  {}/mo",
                g.id,
                g.name,
                g.status,
                g.disk_gb,
                format_currency(g.est_storage)
            );
        }
        for e in &inv.errors {
            let _ = writeln!(out, "  {:?} list unavailable: {}", e.kind, e.error);
        }
        tier_line(&mut out, "disks", &inv.disks);
    }

    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n== {title} ==");
}

fn tier_line(out: &mut String, label: &str, tier: &TierView) {
    match &tier.error {
        Some(e) => {
            let _ = writeln!(out, "    {label:<16} unavailable: {e}");
        }
        None => {
            let _ = writeln!(
                out,
                "    {:<16} {:>4} items  {:>10}  storage {}/mo  egress {}",
                label,
                tier.summary.count,
                tier.size_human,
                format_currency(tier.summary.total_storage_cost),
                format_currency(tier.summary.total_egress_cost)
            );
        }
    }
}

fn unit_lines(out: &mut String, unit: &UnitHistory) {
    let _ = writeln!(out, "  {}", unit.unit);
    if let Some(e) = &unit.error {
        let _ = writeln!(out, "    log unavailable: {e}");
        return;
    }
    if unit.runs.is_empty() {
        let _ = writeln!(out, "    no completed runs in window");
    }
    for run in &unit.runs {
        let _ = writeln!(out, "    {}", run_line(run));
    }
}

fn run_line(run: &Run) -> String {
    let start = run
        .start_time
        .as_ref()
        .map(format_display_time)
        .unwrap_or_else(|| run.start_label.clone());
    let status = match run.status {
        RunStatus::Ok => "OK  ",
        RunStatus::Fail => "FAIL",
    };
    format!(
        "{}  {}  {:>8}  {}",
        start,
        status,
        format_duration(run.duration),
        run.note
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_core::error::SourceError;
    use backup_core::models::{Artifact, Listing, Tier};
    use backup_data::reconcile::ReconciliationView;
    use backup_runtime::dashboard::{LogTail, View};
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot() -> DashboardSnapshot {
        DashboardSnapshot {
            generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            view: View::All,
            scopes: None,
            dumps: None,
            recent_archives: None,
            runs: None,
            timers: None,
            logs: None,
            guests: None,
        }
    }

    #[test]
    fn test_header_only_when_empty() {
        let text = render_text(&snapshot());
        assert_eq!(text, "backup-monitor report (2024-01-01 12:00:00 UTC)\n");
    }

    #[test]
    fn test_runs_section() {
        let run = Run {
            start_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            start_label: "2024-01-01T00:00:00+0000".to_string(),
            status: RunStatus::Ok,
            duration: Some(Duration::seconds(5)),
            note: "backup[1]: Done.".to_string(),
        };
        let mut snap = snapshot();
        snap.runs = Some(vec![
            UnitHistory {
                unit: "a.service".to_string(),
                runs: vec![run.clone()],
                successful: vec![run],
                last_failure: None,
                error: None,
            },
            UnitHistory {
                unit: "b.service".to_string(),
                runs: vec![],
                successful: vec![],
                last_failure: None,
                error: Some(SourceError::NotFound("journalctl".to_string())),
            },
        ]);

        let text = render_text(&snap);
        assert!(text.contains("== Runs =="));
        assert!(text.contains("2024-01-01 00:00:00  OK        5.0s  backup[1]: Done."));
        assert!(text.contains("log unavailable:"));
    }

    #[test]
    fn test_logs_section() {
        let mut snap = snapshot();
        snap.logs = Some(vec![LogTail {
            unit: "a.service".to_string(),
            text: "first\nsecond".to_string(),
            error: None,
        }]);
        let text = render_text(&snap);
        assert!(text.contains("== Logs =="));
        assert!(text.contains("  -- a.service --\n    first\n    second\n"));
    }

    #[test]
    fn test_failed_tier_is_marked() {
        let view = ReconciliationView::default();
        let mut snap = snapshot();
        snap.dumps = Some(view.tier_view(Listing::failed(
            Tier::Local,
            SourceError::Timeout { secs: 30 },
        )));
        let text = render_text(&snap);
        assert!(text.contains("dump roots"));
        assert!(text.contains("unavailable"));

        snap.dumps = Some(view.tier_view(Listing::ok(
            Tier::Local,
            vec![Artifact::new("a", 1_073_741_824, None, Tier::Local)],
        )));
        let text = render_text(&snap);
        assert!(text.contains("1.0 GB"));
        assert!(text.contains("$0.0050"));
    }
}
