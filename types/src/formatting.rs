//! Human-readable formatting for durations and counts shown by the tools.

/// Format a seconds value compactly.
///
/// # Examples
/// ```
/// use zonekeeper_types::formatting::format_secs;
/// assert_eq!(format_secs(0.35), "0.35s");
/// assert_eq!(format_secs(5.0), "5s");
/// assert_eq!(format_secs(75.0), "1m 15s");
/// assert_eq!(format_secs(300.0), "5m");
/// ```
pub fn format_secs(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "-".to_string();
    }
    if secs < 60.0 {
        if secs.fract() == 0.0 {
            return format!("{}s", secs as u64);
        }
        let s = format!("{:.2}", secs);
        let s = s.trim_end_matches('0').trim_end_matches('.');
        return format!("{}s", s);
    }

    let total = secs.round() as u64;
    let (m, s) = (total / 60, total % 60);
    if s == 0 {
        format!("{}m", m)
    } else {
        format!("{}m {}s", m, s)
    }
}

/// Format a usage ratio like `"120/500"` with a percent suffix.
///
/// # Examples
/// ```
/// use zonekeeper_types::formatting::format_usage;
/// assert_eq!(format_usage(120, 500), "120/500 (24%)");
/// assert_eq!(format_usage(0, 0), "0/0");
/// ```
pub fn format_usage(used: usize, limit: usize) -> String {
    if limit == 0 {
        return format!("{}/{}", used, limit);
    }
    let pct = (used as f64 / limit as f64 * 100.0).round() as u64;
    format!("{}/{} ({}%)", used, limit, pct)
}
