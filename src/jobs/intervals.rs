//! Interval settings and the time arithmetic the jobs schedule by.
//!
//! Intervals are stored in the settings table as `[d.]hh:mm:ss` strings
//! (`"10:00"`-style shorthands are rejected, plain seconds are accepted), and
//! last-run timestamps as RFC 3339.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FAST_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_SLOW_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("Invalid interval '{0}': expected [d.]hh:mm:ss or whole seconds")]
    Format(String),

    #[error("Interval '{0}' must be greater than zero")]
    Zero(String),

    #[error("Invalid timestamp '{0}': expected RFC 3339")]
    Timestamp(String),
}

/// Parse a stored interval.
///
/// # Examples
///
/// ```
/// use rssward::jobs::intervals::parse_interval;
/// use std::time::Duration;
///
/// assert_eq!(parse_interval("00:10:00").unwrap(), Duration::from_secs(600));
/// assert_eq!(parse_interval("1.00:00:00").unwrap(), Duration::from_secs(86_400));
/// assert_eq!(parse_interval("90").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_interval(raw: &str) -> Result<Duration, IntervalError> {
    fn field(value: &str, max: u64) -> Option<u64> {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value.parse::<u64>().ok().filter(|n| *n <= max)
    }

    let value = raw.trim();
    let invalid = || IntervalError::Format(raw.to_string());

    let total = match value.split(':').collect::<Vec<_>>().as_slice() {
        [seconds] => field(seconds, u64::MAX),
        [head, minutes, seconds] => {
            let (days, hours) = match head.split_once('.') {
                Some((days, hours)) => (field(days, u64::MAX), field(hours, 23)),
                None => (Some(0), field(head, 23)),
            };
            // Fractional seconds are accepted and dropped
            let seconds = match seconds.split_once('.') {
                Some((whole, fraction)) => field(fraction, u64::MAX).and_then(|_| field(whole, 59)),
                None => field(seconds, 59),
            };
            match (days, hours, field(minutes, 59), seconds) {
                (Some(d), Some(h), Some(m), Some(s)) => d
                    .checked_mul(86_400)
                    .and_then(|d| d.checked_add(h * 3_600 + m * 60 + s)),
                _ => None,
            }
        }
        _ => None,
    }
    .ok_or_else(invalid)?;

    if total == 0 {
        return Err(IntervalError::Zero(raw.to_string()));
    }
    Ok(Duration::from_secs(total))
}

/// Inverse of [`parse_interval`]; sub-second precision is dropped.
pub fn format_interval(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, minutes, seconds) = (rest / 3_600, rest % 3_600 / 60, rest % 60);

    if days > 0 {
        format!("{}.{:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IntervalError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| IntervalError::Timestamp(raw.to_string()))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// When a job last run at `last` next becomes due. Never-run jobs are due
/// immediately.
pub fn due_at(last: Option<DateTime<Utc>>, interval: Duration) -> Option<DateTime<Utc>> {
    last.map(|last| last.checked_add_signed(to_delta(interval)).unwrap_or(DateTime::<Utc>::MAX_UTC))
}

/// How long until a job last run at `last` is due; zero means run now.
pub fn time_until_due(last: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> Duration {
    match due_at(last, interval) {
        Some(due) if due > now => (due - now).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

/// How far back a partial refresh looks, given the whole percentage of the
/// slow cycle still remaining.
///
/// The thresholds are tested by divisibility, not by range: 60% remaining
/// looks back 3 days while 59% looks back 2 hours. Ticks landing on round
/// percentages periodically widen the net.
pub fn lookback_window(remaining_percent: u64) -> TimeDelta {
    if remaining_percent % 30 == 0 {
        TimeDelta::days(3)
    } else if remaining_percent % 15 == 0 {
        TimeDelta::days(1)
    } else if remaining_percent % 10 == 0 {
        TimeDelta::hours(12)
    } else if remaining_percent % 5 == 0 {
        TimeDelta::hours(6)
    } else {
        TimeDelta::hours(2)
    }
}

/// What one refresh tick should check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    /// Slow cycle is due: check every feed source.
    Full,
    /// Check feed sources updated at or after `since`.
    Partial { since: DateTime<Utc>, remaining_percent: u64 },
}

/// Decide the tick's refresh plan from the slow cycle's state.
pub fn plan_refresh(
    slow_interval: Duration,
    last_slow_refresh: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> RefreshPlan {
    let Some(due) = due_at(last_slow_refresh, slow_interval) else {
        return RefreshPlan::Full;
    };
    if due <= now {
        return RefreshPlan::Full;
    }

    let remaining = (due - now).to_std().unwrap_or(Duration::ZERO);
    let remaining_percent = (remaining.as_millis() * 100)
        .checked_div(slow_interval.as_millis())
        .map_or(0, |pct| pct as u64);

    RefreshPlan::Partial {
        since: now - lookback_window(remaining_percent),
        remaining_percent,
    }
}
