// Tests for mapping stored alarms onto exact timers.
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use daycall::model::{Alarm, RepeatDays, TriggerKey};
use daycall::platform::memory::MemoryPlatform;
use daycall::ports::DeferredTaskService;
use daycall::reminder::{REMINDER_TAG, ReminderScheduler, reminder_key};
use daycall::scheduler::{AlarmScheduler, ScheduleOutcome};

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    // March 2025: the 10th is a Monday.
    NaiveDate::from_ymd_opt(2025, 3, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn setup(now: NaiveDateTime) -> (MemoryPlatform, AlarmScheduler) {
    let mem = MemoryPlatform::new(now);
    let reminders = ReminderScheduler::new(
        mem.tasks.clone(),
        mem.clock.clone(),
        mem.notifier.clone(),
        chrono::Duration::minutes(15),
    );
    let scheduler = AlarmScheduler::new(mem.timers.clone(), mem.clock.clone(), reminders);
    (mem, scheduler)
}

fn stored(id: i64, alarm: Alarm) -> Alarm {
    Alarm { id, ..alarm }
}

#[test]
fn test_one_shot_arms_single_timer() {
    let (mem, scheduler) = setup(at(10, 7, 5));
    let alarm = stored(1, Alarm::new(7, 0));

    let outcome = scheduler.schedule_alarm(&alarm);

    assert!(outcome.is_scheduled());
    let armed = mem.timers.armed();
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].key, TriggerKey::OneShot(1));
    // 07:05 is past 07:00, so tomorrow.
    assert_eq!(
        armed[0].fire_at_ms,
        at(11, 7, 0).and_utc().timestamp_millis()
    );
    assert_eq!(armed[0].payload.repeat_day, None);
}

#[test]
fn test_mon_tue_mask_arms_two_and_disable_cancels_exactly_those() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let mut alarm = stored(4, Alarm::new(7, 0).with_repeat(RepeatDays::decode(0b0000011)));

    let outcome = scheduler.schedule_alarm(&alarm);
    assert_eq!(outcome.armed().len(), 2);

    let armed = mem.timers.armed_for(4);
    assert_eq!(armed.len(), 2);
    // Tuesday tomorrow, Monday next week.
    assert_eq!(armed[0].key, TriggerKey::Weekly(4, Weekday::Tue));
    assert_eq!(armed[0].fire_at_ms, at(11, 7, 0).and_utc().timestamp_millis());
    assert_eq!(armed[1].key, TriggerKey::Weekly(4, Weekday::Mon));
    assert_eq!(armed[1].fire_at_ms, at(17, 7, 0).and_utc().timestamp_millis());

    mem.timers.clear_log();
    alarm.enabled = false;
    assert_eq!(scheduler.schedule_alarm(&alarm), ScheduleOutcome::Disabled);

    let mut cancelled = mem.timers.cancelled();
    cancelled.sort_by_key(|k| k.request_code());
    assert_eq!(
        cancelled,
        vec![
            TriggerKey::Weekly(4, Weekday::Mon),
            TriggerKey::Weekly(4, Weekday::Tue)
        ]
    );
    assert!(mem.timers.armed().is_empty());
}

#[test]
fn test_editing_days_drops_old_timers() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let before = stored(2, Alarm::new(6, 30).with_repeat(RepeatDays::decode(0b0011111)));
    scheduler.schedule_alarm(&before);
    assert_eq!(mem.timers.armed_for(2).len(), 5);

    let after = Alarm {
        repeat_days: RepeatDays::from_days([Weekday::Sat]),
        ..before
    };
    scheduler.schedule_alarm(&after);

    let armed = mem.timers.armed_for(2);
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].key, TriggerKey::Weekly(2, Weekday::Sat));
    assert_eq!(scheduler.armed_keys(2), vec![TriggerKey::Weekly(2, Weekday::Sat)]);
}

#[test]
fn test_permission_denied_arms_nothing() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    mem.timers.set_permitted(false);

    let alarm = stored(3, Alarm::new(9, 0).with_repeat(RepeatDays::EVERY_DAY));
    let outcome = scheduler.schedule_alarm(&alarm);

    assert_eq!(outcome, ScheduleOutcome::PermissionDenied);
    assert!(mem.timers.armed().is_empty());
    assert!(mem.tasks.pending().is_empty());
}

#[test]
fn test_partial_failure_is_reported() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    mem.timers.fail_schedules(true);

    let alarm = stored(5, Alarm::new(9, 0).with_repeat(RepeatDays::decode(0b11)));
    match scheduler.schedule_alarm(&alarm) {
        ScheduleOutcome::Failed { armed, errors } => {
            assert!(armed.is_empty());
            assert_eq!(errors.len(), 2);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_reminder_queued_before_nearest_occurrence() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let alarm = stored(6, Alarm::new(9, 0));
    scheduler.schedule_alarm(&alarm);

    let task = mem.tasks.get(&reminder_key(6)).expect("reminder queued");
    assert!(task.has_tag(REMINDER_TAG));
    // 09:00 - 15 min - 08:00
    assert_eq!(task.delay_ms, 45 * 60 * 1000);
}

#[test]
fn test_reminder_skipped_inside_lead_window() {
    let (mem, scheduler) = setup(at(10, 8, 50));
    scheduler.schedule_alarm(&stored(7, Alarm::new(9, 0)));

    assert_eq!(mem.timers.armed().len(), 1);
    assert!(mem.tasks.get(&reminder_key(7)).is_none());
}

#[test]
fn test_cancel_without_history_uses_current_days() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let alarm = stored(8, Alarm::new(7, 0).with_repeat(RepeatDays::from_days([Weekday::Wed])));

    let keys = scheduler.cancel_alarm(&alarm);
    assert_eq!(
        keys,
        vec![TriggerKey::OneShot(8), TriggerKey::Weekly(8, Weekday::Wed)]
    );
    assert_eq!(mem.timers.cancelled().len(), 2);
}

#[test]
fn test_sweep_cancels_every_possible_key() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    scheduler.sweep_alarm(9);
    assert_eq!(mem.timers.cancelled(), TriggerKey::all_for(9));
}

#[test]
fn test_reschedule_all_skips_disabled() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let mut off = stored(1, Alarm::new(7, 0));
    off.enabled = false;
    let on = stored(2, Alarm::new(7, 30).with_repeat(RepeatDays::decode(0b1100000)));

    let results = scheduler.reschedule_all(&[off, on]);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 2);
    assert!(mem.timers.armed_for(1).is_empty());
    assert_eq!(mem.timers.armed_for(2).len(), 2);
}

#[test]
fn test_reschedule_into_lead_window_drops_old_reminder() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let alarm = stored(1, Alarm::new(9, 0));
    scheduler.schedule_alarm(&alarm);
    assert!(mem.tasks.get(&reminder_key(1)).is_some());

    // Moved to 08:55 at 08:50: the new reminder time has already passed.
    mem.clock.set(at(10, 8, 50));
    let moved = Alarm { minute: 55, hour: 8, ..alarm };
    assert!(scheduler.schedule_alarm(&moved).is_scheduled());

    assert!(mem.tasks.get(&reminder_key(1)).is_none());
    let armed = mem.timers.armed_for(1);
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].fire_at_ms, at(10, 8, 55).and_utc().timestamp_millis());
}

#[test]
fn test_permission_revoked_clears_previous_schedule() {
    let (mem, scheduler) = setup(at(10, 8, 0));
    let alarm = stored(2, Alarm::new(9, 0).with_repeat(RepeatDays::decode(0b11)));
    scheduler.schedule_alarm(&alarm);
    assert_eq!(mem.timers.armed_for(2).len(), 2);

    mem.timers.set_permitted(false);
    let edited = Alarm { hour: 10, ..alarm };
    assert_eq!(scheduler.schedule_alarm(&edited), ScheduleOutcome::PermissionDenied);

    assert!(mem.timers.armed().is_empty());
    assert!(mem.tasks.get(&reminder_key(2)).is_none());
    assert!(scheduler.armed_keys(2).is_empty());
}
