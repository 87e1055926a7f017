//! Human-readable timestamps for logs and reports.

use chrono::{DateTime, Local, Utc};

/// Format an epoch timestamp as local wall-clock time plus the remaining
/// duration relative to `now`, e.g. `"03:12 PM (in 00h 05m 40s)"`.
pub fn format_eta(now: f64, epoch: f64) -> String {
    let local: Option<DateTime<Local>> =
        DateTime::<Utc>::from_timestamp(epoch as i64, 0).map(|utc| utc.with_timezone(&Local));
    let clock = match local {
        Some(t) => t.format("%I:%M %p").to_string(),
        None => "??:??".to_string(),
    };

    let diff = epoch - now;
    let remaining = format_remaining(diff.abs());
    if diff >= 0.0 {
        format!("{clock} (in {remaining})")
    } else {
        format!("{clock} (OVERDUE by {remaining})")
    }
}

/// `"00h 05m 40s"` from a second count.
pub fn format_remaining(secs: f64) -> String {
    let total = secs.abs() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}h {minutes:02}m {seconds:02}s")
}
