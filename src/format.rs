//! Display formatting for recording lists.

use chrono::{DateTime, Datelike, Utc};

/// `m:ss`, e.g. `1:05`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Relative call date: `Today`, `Yesterday`, a weekday within the last
/// week, `Mon D` in the current year and `Mon D, YYYY` otherwise.
pub fn format_call_date(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now.date_naive() - date.date_naive()).num_days();
    match days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => date.format("%A").to_string(),
        _ if date.year() == now.year() => date.format("%b %-d").to_string(),
        _ => date.format("%b %-d, %Y").to_string(),
    }
}

/// 12-hour clock time, e.g. `3:04 PM`.
pub fn format_clock(date: DateTime<Utc>) -> String {
    date.format("%-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3600), "60:00");
        assert_eq!(format_duration(-3), "0:00");
    }

    #[test]
    fn relative_dates() {
        // Sunday
        let now = at(2026, 10, 18, 12, 0);
        assert_eq!(format_call_date(at(2026, 10, 18, 1, 0), now), "Today");
        assert_eq!(format_call_date(at(2026, 10, 17, 23, 59), now), "Yesterday");
        assert_eq!(format_call_date(at(2026, 10, 14, 9, 0), now), "Wednesday");
        assert_eq!(format_call_date(at(2026, 10, 11, 9, 0), now), "Oct 11");
        assert_eq!(format_call_date(at(2025, 12, 30, 9, 0), now), "Dec 30, 2025");
    }

    #[test]
    fn clock_times() {
        assert_eq!(format_clock(at(2026, 1, 1, 0, 5)), "12:05 AM");
        assert_eq!(format_clock(at(2026, 1, 1, 15, 4)), "3:04 PM");
    }
}
