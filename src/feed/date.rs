use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Parses a feed date string.
///
/// Atom uses RFC 3339 (`2024-01-02T03:04:05Z`), RSS uses RFC 2822
/// (`Tue, 02 Jan 2024 03:04:05 GMT`). Both are accepted by either reader,
/// since feeds in the wild mix them freely. A zone-less ISO timestamp is
/// taken as UTC. Results are truncated to whole seconds so they survive
/// storage unchanged.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .map(|dt| dt.trunc_subsecs(0))
}

/// Current time at the same precision as parsed dates.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
