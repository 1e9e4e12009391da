//! Wall-clock arithmetic for the daily trigger.
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};

/// The first occurrence of `at` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// The trigger after `previous`, never earlier than the next one after `now`.
/// A wake-up slightly before `previous` still moves on to the next day.
pub fn following_run(previous: NaiveDateTime, now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    next_run_after(previous.max(now), at)
}

/// Time to sleep from `now` until the local wall-clock time `next`.
///
/// A trigger time that falls into a DST gap is read as UTC.
pub fn delay_until<Tz: TimeZone>(now: &DateTime<Tz>, next: NaiveDateTime) -> Duration {
    let timezone = now.timezone();
    let next = timezone
        .from_local_datetime(&next)
        .earliest()
        .unwrap_or_else(|| timezone.from_utc_datetime(&next));
    (next - now.clone()).to_std().unwrap_or(Duration::ZERO)
}
