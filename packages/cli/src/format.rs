// ABOUTME: Formatting helpers for token timestamps and remaining lifetimes
// ABOUTME: Converts epoch milliseconds into display strings for status output

use chrono::DateTime;

/// Format epoch milliseconds as a UTC timestamp
pub fn format_timestamp_ms(timestamp_ms: i64) -> String {
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "Invalid date".to_string(),
    }
}

/// Describe the time between `now_ms` and `expires_at_ms`
pub fn format_remaining(expires_at_ms: i64, now_ms: i64) -> String {
    let delta_secs = (expires_at_ms - now_ms) / 1000;
    if delta_secs < 0 {
        format!("expired {} ago", format_duration(-delta_secs))
    } else {
        format!("in {}", format_duration(delta_secs))
    }
}

fn format_duration(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, m) => format!("{}m", m),
        (h, m) => format!("{}h {}m", h, m),
    }
}
