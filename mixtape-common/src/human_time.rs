//! Human-readable elapsed time formatting for logs and status text

use std::time::Duration;

/// Format an elapsed duration for display
///
/// - under 100 seconds: `X.XXs`
/// - under 100 minutes: `M:SS`
/// - otherwise: `H:MM:SS`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mixtape_common::human_time::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_millis(4_250)), "4.25s");
/// assert_eq!(format_elapsed(Duration::from_secs(330)), "5:30");
/// assert_eq!(format_elapsed(Duration::from_secs(3661 * 2)), "2:02:02");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();

    if total < 100 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else if total < 6000 {
        format!("{}:{:02}", total / 60, total % 60)
    } else {
        format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    }
}

/// Parse an ffmpeg-style clock value (`HH:MM:SS.micro`) into a duration
///
/// Returns `None` for `N/A`, malformed input and values past `Duration::MAX`.
pub fn parse_clock(value: &str) -> Option<Duration> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}
