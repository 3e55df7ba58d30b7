use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 1;
pub const MAX_LOOKBACK_DAYS: u32 = 7;

/// Calendar date before `now` in `tz`.
pub fn yesterday_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    let today = now.with_timezone(&tz).date_naive();
    today.pred_opt().unwrap_or(today)
}

pub fn clamp_lookback(days: i64) -> u32 {
    days.clamp(1, MAX_LOOKBACK_DAYS as i64) as u32
}

/// Dates `yesterday - (days - 1) ..= yesterday`, oldest first.
pub fn lookback_window(tz: Tz, now: DateTime<Utc>, days: u32) -> Vec<NaiveDate> {
    let yesterday = yesterday_in(tz, now);
    let days = clamp_lookback(days as i64);
    (0..days)
        .rev()
        .map(|offset| yesterday - Duration::days(offset as i64))
        .collect()
}
