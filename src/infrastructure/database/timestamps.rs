use chrono::{DateTime, TimeZone, Utc};

const MILLIS_THRESHOLD: i64 = 10_000_000_000;

fn utc_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now)
}

pub fn utc_from_epoch_seconds_lossy(ts: i64) -> DateTime<Utc> {
    if ts.abs() >= MILLIS_THRESHOLD
        && let Some(dt) = Utc.timestamp_opt(ts / 1000, 0).single()
    {
        log::warn!("Coerced milliseconds timestamp to seconds (ts={ts})");
        return dt;
    }

    if let Some(dt) = Utc.timestamp_opt(ts, 0).single() {
        return dt;
    }

    log::warn!("Invalid epoch seconds timestamp (ts={ts}); falling back to epoch");
    utc_epoch()
}

/// Registry rows persist `start_time` as RFC 3339 text. A malformed value
/// must not make an entire listing unreadable.
pub fn utc_from_rfc3339_lossy(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(err) => {
            log::warn!("Invalid RFC 3339 timestamp '{raw}' in store ({err}); falling back to epoch");
            utc_epoch()
        }
    }
}
