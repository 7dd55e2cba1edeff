use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a configured timezone name, mapping `"auto"` to the system zone.
pub fn resolve_timezone_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    }
}

// ── TimestampParser ───────────────────────────────────────────────────────────

/// Parses the ISO-8601 timestamps found at the start of log lines and in
/// remote listings.
///
/// Timestamps that carry no offset are interpreted in the parser's default
/// timezone.
#[derive(Debug, Clone, Copy)]
pub struct TimestampParser {
    default_tz: Tz,
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

impl TimestampParser {
    /// Create a parser with the given IANA timezone name as the default for
    /// offset-less timestamps. `"auto"` selects the system timezone.
    ///
    /// An unrecognised name falls back to UTC and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let resolved = resolve_timezone_name(tz_name);
        let tz = resolved.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimestampParser: unrecognised timezone \"{}\", falling back to UTC",
                resolved
            );
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.eq_ignore_ascii_case("auto") || tz_name.parse::<Tz>().is_ok()
    }

    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// Parse an ISO-8601 timestamp into UTC.
    ///
    /// Accepts RFC 3339 (`Z` or `+hh:mm`), the compact `+hhmm` offset written
    /// by `journalctl --output short-iso`, and naive date-times. Returns
    /// `None` for anything else.
    pub fn parse(&self, s: &str) -> Option<DateTime<Utc>> {
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }

        const OFFSET_FMTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"];
        for fmt in OFFSET_FMTS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }

        const NAIVE_FMTS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ];
        for fmt in NAIVE_FMTS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                use chrono::TimeZone as _;
                if let chrono::LocalResult::Single(dt) = self.default_tz.from_local_datetime(&naive)
                {
                    return Some(dt.with_timezone(&Utc));
                }
            }
        }

        debug!("TimestampParser: could not parse timestamp \"{}\"", s);
        None
    }
}

/// Format a UTC instant the way the dashboard shows modification times.
pub fn format_display_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
