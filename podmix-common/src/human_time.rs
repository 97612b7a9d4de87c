//! Human-readable time formatting
//!
//! Used for chapter markers in show notes and for duration fields in logs.

/// Format thresholds (seconds)
const SHORT_FORMAT_MAX: f64 = 100.0; // < 100s → X.XXs
const MEDIUM_FORMAT_MAX: f64 = 6000.0; // < 100m → M:SS.Xs
                                       // >= 100m → H:MM:SS

/// Format a duration for log output
///
/// # Examples
///
/// ```
/// use podmix_common::human_time::format_duration;
///
/// assert_eq!(format_duration(4.5), "4.50s");
/// assert_eq!(format_duration(330.0), "5:30.0");
/// assert_eq!(format_duration(7200.0), "2:00:00");
/// ```
pub fn format_duration(seconds: f64) -> String {
    let is_negative = seconds < 0.0;
    let abs_seconds = seconds.abs();

    let formatted = if abs_seconds < SHORT_FORMAT_MAX {
        format!("{:.2}s", abs_seconds)
    } else if abs_seconds < MEDIUM_FORMAT_MAX {
        let minutes = (abs_seconds / 60.0).floor();
        let secs = abs_seconds - minutes * 60.0;
        format!("{}:{:04.1}", minutes as u64, secs)
    } else {
        let whole = abs_seconds.round() as u64;
        format!("{}:{:02}:{:02}", whole / 3600, (whole % 3600) / 60, whole % 60)
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format an episode offset as a chapter marker
///
/// `MM:SS` below one hour, `H:MM:SS` from one hour on. Fractions are
/// truncated so a chapter never points past its real start.
///
/// # Examples
///
/// ```
/// use podmix_common::human_time::format_chapter_time;
///
/// assert_eq!(format_chapter_time(0.0), "00:00");
/// assert_eq!(format_chapter_time(75.9), "01:15");
/// assert_eq!(format_chapter_time(3723.0), "1:02:03");
/// ```
pub fn format_chapter_time(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = whole / 3600;
    let mins = (whole % 3600) / 60;
    let secs = whole % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_format() {
        assert_eq!(format_duration(0.0), "0.00s");
        assert_eq!(format_duration(99.0), "99.00s");
    }

    #[test]
    fn test_medium_format() {
        assert_eq!(format_duration(100.0), "1:40.0");
        assert_eq!(format_duration(5999.0), "99:59.0");
    }

    #[test]
    fn test_long_format() {
        assert_eq!(format_duration(6000.0), "1:40:00");
        assert_eq!(format_duration(3661.0 + 6000.0), "2:41:01");
    }

    #[test]
    fn test_negative_duration() {
        assert_eq!(format_duration(-1.5), "-1.50s");
    }

    #[test]
    fn test_chapter_time() {
        assert_eq!(format_chapter_time(59.999), "00:59");
        assert_eq!(format_chapter_time(600.0), "10:00");
        assert_eq!(format_chapter_time(3600.0), "1:00:00");
    }

    #[test]
    fn test_chapter_time_non_finite() {
        assert_eq!(format_chapter_time(f64::NAN), "00:00");
        assert_eq!(format_chapter_time(-3.0), "00:00");
    }
}
