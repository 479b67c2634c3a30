// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and parsing.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};
use std::time::Duration;

/// Length of Strava's short-term rate limit window.
const STRAVA_WINDOW_MINUTES: u32 = 15;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a timestamp as Garmin Connect reports it (`startTimeGMT`).
///
/// Garmin uses `2024-05-01 07:30:00` in list endpoints and occasionally an
/// ISO form with a `T` separator; both are UTC.
pub fn parse_garmin_gmt(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().trim_end_matches('Z');
    if value.is_empty() {
        return None;
    }
    let format = if value.contains('T') {
        "%Y-%m-%dT%H:%M:%S%.f"
    } else {
        "%Y-%m-%d %H:%M:%S%.f"
    };
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Time remaining until Strava's next 15-minute quota boundary.
///
/// Strava resets its short-term counters at :00, :15, :30 and :45 past the hour.
pub fn until_next_quarter_hour(now: DateTime<Utc>) -> Duration {
    let minute_in_window = now.minute() % STRAVA_WINDOW_MINUTES;
    let elapsed = u64::from(minute_in_window) * 60 + u64::from(now.second());
    let window = u64::from(STRAVA_WINDOW_MINUTES) * 60;
    Duration::from_secs(window - elapsed)
}
