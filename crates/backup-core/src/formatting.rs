use chrono::Duration;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count using base-1024 units with one decimal place.
///
/// Values are divided by 1024 until they drop below 1024; anything at or
/// beyond 1024 TB is expressed in PB without further division.
///
/// # Examples
///
/// ```
/// use backup_core::formatting::human_size;
///
/// assert_eq!(human_size(0), "0.0 B");
/// assert_eq!(human_size(1024), "1.0 KB");
/// assert_eq!(human_size(1536), "1.5 KB");
/// assert_eq!(human_size(1024u64.pow(4)), "1.0 TB");
/// ```
pub fn human_size(bytes: u64) -> String {
    let mut num = bytes as f64;
    for unit in SIZE_UNITS {
        if num < 1024.0 {
            return format!("{:.1} {}", num, unit);
        }
        num /= 1024.0;
    }
    format!("{:.1} PB", num)
}

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use backup_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge exact midpoints up before rounding; binary floats sit just below them.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();
    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        // "0.50" -> ".50"
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format an estimated amount with four decimal places.
///
/// Backup cost estimates are usually fractions of a cent per archive, so two
/// decimals would round nearly everything to zero.
///
/// ```
/// use backup_core::formatting::format_currency;
///
/// assert_eq!(format_currency(0.005), "$0.0050");
/// assert_eq!(format_currency(1234.5), "$1,234.5000");
/// ```
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("$-{}", format_number(amount.abs(), 4))
    } else {
        format!("${}", format_number(amount, 4))
    }
}

/// Format a run duration as seconds with one decimal, or `"n/a"`.
///
/// ```
/// use backup_core::formatting::format_duration;
/// use chrono::Duration;
///
/// assert_eq!(format_duration(Some(Duration::milliseconds(5_000))), "5.0s");
/// assert_eq!(format_duration(None), "n/a");
/// ```
pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0),
        None => "n/a".to_string(),
    }
}

/// Truncate `text` to at most `max_chars` characters, respecting char
/// boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Appended to text cut by [`truncate_with_marker`].
pub const TRUNCATION_MARKER: &str = "\n...[truncated]...";

/// Cut `text` to `max_chars` characters and append [`TRUNCATION_MARKER`]
/// when anything was removed.
///
/// ```
/// use backup_core::formatting::truncate_with_marker;
///
/// assert_eq!(truncate_with_marker("abcdef", 3), "abc\n...[truncated]...");
/// assert_eq!(truncate_with_marker("abc", 3), "abc");
/// ```
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
