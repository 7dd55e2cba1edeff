//! Timer schedule parsing.

use backup_core::models::TimerInfo;

const NOT_AVAILABLE: &str = "n/a";

/// Map a service unit to the timer that triggers it
/// (`foo.service` → `foo.timer`). Names without the suffix are returned
/// unchanged.
pub fn timer_for_service(service: &str) -> String {
    match service.strip_suffix(".service") {
        Some(stem) => format!("{stem}.timer"),
        None => service.to_string(),
    }
}

/// Parse the `key=value` property dump of
/// `systemctl show <timer> -p NextElapseUSecRealtime -p LastTriggerUSecRealtime -p Unit`.
///
/// Missing or empty values become `"n/a"`; the unit falls back to `timer`.
pub fn parse_timer_properties(timer: &str, text: &str) -> TimerInfo {
    let mut info = unavailable_timer(timer);
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "NextElapseUSecRealtime" if !value.is_empty() => info.next = value.to_string(),
            "LastTriggerUSecRealtime" if !value.is_empty() => info.last = value.to_string(),
            "Unit" if !value.is_empty() => info.unit = value.to_string(),
            _ => {}
        }
    }
    info
}

/// The placeholder shown when the service manager could not be queried.
pub fn unavailable_timer(timer: &str) -> TimerInfo {
    TimerInfo {
        unit: timer.to_string(),
        next: NOT_AVAILABLE.to_string(),
        last: NOT_AVAILABLE.to_string(),
    }
}
