//! Shared formatting helpers for CLI commands

use chrono::{DateTime, Local, Utc};
use std::time::Duration;

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let Ok(elapsed) = (now - at).to_std() else {
        return "in the future".to_string();
    };
    let seconds = elapsed.as_secs();

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format timestamp in local time ("2024-01-03 14:30:00")
pub fn format_absolute_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// "1500 ms", "10 s", "5 min"
pub fn format_interval(interval: Duration) -> String {
    let ms = interval.as_millis();
    if ms < 1000 || ms % 1000 != 0 {
        format!("{} ms", ms)
    } else if ms % 60_000 == 0 {
        format!("{} min", ms / 60_000)
    } else {
        format!("{} s", ms / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.50 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 14, 30, 0).unwrap();
        let ago = |secs: i64| format_relative_time(now - chrono::Duration::seconds(secs), now);

        assert_eq!(ago(5), "5 seconds ago");
        assert_eq!(ago(150), "2 minutes ago");
        assert_eq!(ago(7200), "2 hours ago");
        assert_eq!(ago(3 * 86400), "3 days ago");
        assert_eq!(ago(21 * 86400), "3 weeks ago");
        assert_eq!(ago(-10), "in the future");
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::from_millis(250)), "250 ms");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1500 ms");
        assert_eq!(format_interval(Duration::from_secs(10)), "10 s");
        assert_eq!(format_interval(Duration::from_secs(300)), "5 min");
    }
}
