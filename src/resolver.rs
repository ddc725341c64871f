// Computes the next wall-clock instant at which an alarm should fire.
//
// All functions work on naive local date-times so they stay pure and testable;
// turning the result into epoch milliseconds is the clock's job (see `local_to_millis`).
use crate::model::{Alarm, RepeatDays};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Weekday};

/// Today at `hour:minute:00`, or tomorrow if that instant is not strictly after `now`.
pub fn resolve_one_shot(hour: u32, minute: u32, now: NaiveDateTime) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour % 24, minute % 60, 0).unwrap_or(NaiveTime::MIN);
    let target = now.date().and_time(time);
    if target > now {
        target
    } else {
        target + Duration::days(1)
    }
}

/// Walks forward from `base` one day at a time until the weekday matches.
/// `base` itself is returned when it already falls on `weekday`.
pub fn resolve_for_weekday(base: NaiveDateTime, weekday: Weekday) -> NaiveDateTime {
    let mut candidate = base;
    while candidate.weekday() != weekday {
        candidate += Duration::days(1);
    }
    candidate
}

/// Every upcoming trigger of an alarm: a single one-shot entry, or one entry per repeat day.
pub fn occurrences(alarm: &Alarm, now: NaiveDateTime) -> Vec<(Option<Weekday>, NaiveDateTime)> {
    occurrences_at(alarm.hour, alarm.minute, alarm.repeat_days, now)
}

/// Same as [`occurrences`] for a bare time and repeat set.
pub fn occurrences_at(
    hour: u32,
    minute: u32,
    days: RepeatDays,
    now: NaiveDateTime,
) -> Vec<(Option<Weekday>, NaiveDateTime)> {
    let base = resolve_one_shot(hour, minute, now);
    if days.is_empty() {
        return vec![(None, base)];
    }
    days.iter()
        .map(|day| (Some(day), resolve_for_weekday(base, day)))
        .collect()
}

/// Earliest upcoming trigger of an alarm, ignoring its enabled flag.
pub fn next_occurrence(alarm: &Alarm, now: NaiveDateTime) -> NaiveDateTime {
    occurrences(alarm, now)
        .into_iter()
        .map(|(_, at)| at)
        .min()
        .unwrap_or_else(|| resolve_one_shot(alarm.hour, alarm.minute, now))
}

/// The enabled alarm that rings first, with its fire time.
pub fn next_alarm(alarms: &[Alarm], now: NaiveDateTime) -> Option<(&Alarm, NaiveDateTime)> {
    alarms
        .iter()
        .filter(|a| a.enabled)
        .map(|a| (a, next_occurrence(a, now)))
        .min_by_key(|(_, at)| *at)
}

/// Converts a local wall-clock instant to epoch milliseconds in `tz`.
///
/// Ambiguous instants (DST fold) take the earlier mapping. Instants inside a
/// DST gap do not exist; they map to the first minute after the gap.
pub fn local_to_millis<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> i64 {
    let mut probe = naive;
    // Gaps are at most a couple of hours wide.
    for _ in 0..(3 * 60) {
        if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
            return dt.timestamp_millis();
        }
        probe += Duration::minutes(1);
    }
    naive.and_utc().timestamp_millis()
}
