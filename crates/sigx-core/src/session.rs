//! Trading session boundaries.
//!
//! A session is a UTC day shifted by a configurable reset hour: with
//! `reset_hour = 21` a session runs 21:00 UTC to 21:00 UTC next day.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

const DAY_MS: u64 = 86_400_000;

fn to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_default()
}

/// Start (Unix ms) of the session containing `now_ms`.
#[must_use]
pub fn session_start_ms(now_ms: u64, reset_hour: u32) -> u64 {
    let reset_hour = reset_hour.min(23);
    let dt = to_datetime(now_ms);
    let day_start = dt
        .date_naive()
        .and_hms_opt(reset_hour, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(dt);
    let start = if dt.hour() < reset_hour {
        day_start - Duration::days(1)
    } else {
        day_start
    };
    start.timestamp_millis().max(0) as u64
}

/// Start (Unix ms) of the session after the one containing `now_ms`.
#[must_use]
pub fn next_session_start_ms(now_ms: u64, reset_hour: u32) -> u64 {
    session_start_ms(now_ms, reset_hour) + DAY_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(y: i32, m: u32, d: u32, h: u32, min: u32) -> u64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .timestamp_millis() as u64
    }

    #[test]
    fn test_midnight_reset() {
        let now = ms(2024, 3, 5, 15, 30);
        assert_eq!(session_start_ms(now, 0), ms(2024, 3, 5, 0, 0));
        assert_eq!(next_session_start_ms(now, 0), ms(2024, 3, 6, 0, 0));
    }

    #[test]
    fn test_offset_reset_before_hour() {
        let now = ms(2024, 3, 5, 10, 0);
        assert_eq!(session_start_ms(now, 21), ms(2024, 3, 4, 21, 0));
    }

    #[test]
    fn test_offset_reset_after_hour() {
        let now = ms(2024, 3, 5, 22, 0);
        assert_eq!(session_start_ms(now, 21), ms(2024, 3, 5, 21, 0));
        assert_eq!(next_session_start_ms(now, 21), ms(2024, 3, 6, 21, 0));
    }
}
