//! Maps stored alarms onto OS-level exact timers.
//!
//! A one-shot alarm owns a single timer keyed by its id; a repeating alarm owns
//! one timer per selected weekday. Whenever an alarm is edited, toggled or
//! deleted, its old timers are cancelled before new ones are armed. The
//! scheduler never re-arms a fired timer by itself: the fire handler, boot
//! handler or app start calls [`AlarmScheduler::schedule_alarm`] again.
use crate::error::PlatformError;
use crate::model::{Alarm, AlarmId, ScheduledTrigger, TriggerKey, TriggerPayload};
use crate::ports::{Clock, ExactTimerService};
use crate::reminder::ReminderScheduler;
use crate::resolver;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of a scheduling request. Nothing here is an error the caller must
/// handle; the variants exist so callers can surface problems if they want to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Every timer for the alarm is armed.
    Scheduled(Vec<ScheduledTrigger>),
    /// The alarm is disabled; its timers were cancelled.
    Disabled,
    /// Exact timers are not permitted. Nothing was armed.
    PermissionDenied,
    /// Some or all timers could not be armed.
    Failed {
        armed: Vec<ScheduledTrigger>,
        errors: Vec<PlatformError>,
    },
}

impl ScheduleOutcome {
    pub fn armed(&self) -> &[ScheduledTrigger] {
        match self {
            ScheduleOutcome::Scheduled(t) => t,
            ScheduleOutcome::Failed { armed, .. } => armed,
            _ => &[],
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled(_))
    }
}

pub struct AlarmScheduler {
    timers: Arc<dyn ExactTimerService>,
    clock: Arc<dyn Clock>,
    reminders: ReminderScheduler,
    /// Keys armed by this process, per alarm.
    armed: Mutex<HashMap<AlarmId, Vec<TriggerKey>>>,
}

impl AlarmScheduler {
    pub fn new(
        timers: Arc<dyn ExactTimerService>,
        clock: Arc<dyn Clock>,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            timers,
            clock,
            reminders,
            armed: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<AlarmId, Vec<TriggerKey>>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    /// Keys currently armed for an alarm by this scheduler.
    pub fn armed_keys(&self, alarm_id: AlarmId) -> Vec<TriggerKey> {
        self.registry().get(&alarm_id).cloned().unwrap_or_default()
    }

    /// Alarms this scheduler currently holds timers for.
    pub fn armed_alarm_ids(&self) -> Vec<AlarmId> {
        self.registry().keys().copied().collect()
    }

    /// (Re)arms every timer for `alarm`, replacing whatever was armed before.
    pub fn schedule_alarm(&self, alarm: &Alarm) -> ScheduleOutcome {
        log::debug!(
            "Scheduling alarm {}: enabled={}, time={:02}:{:02}, repeat={}",
            alarm.id,
            alarm.enabled,
            alarm.hour,
            alarm.minute,
            alarm.repeat_days
        );

        if !alarm.enabled {
            self.cancel_alarm(alarm);
            return ScheduleOutcome::Disabled;
        }

        // The previous schedule goes even when the new one cannot be armed.
        self.cancel_armed(alarm.id);

        if !self.timers.can_schedule_exact() {
            log::error!(
                "Exact alarm permission not granted, alarm {} was not scheduled",
                alarm.id
            );
            return ScheduleOutcome::PermissionDenied;
        }

        let now = self.clock.now_local();
        let mut armed = Vec::new();
        let mut errors = Vec::new();
        let mut nearest = None;

        for (day, at) in resolver::occurrences(alarm, now) {
            let key = match day {
                Some(d) => TriggerKey::Weekly(alarm.id, d),
                None => TriggerKey::OneShot(alarm.id),
            };
            let trigger = ScheduledTrigger {
                key,
                fire_at_ms: self.clock.to_epoch_millis(at),
                payload: TriggerPayload::for_alarm(alarm, day),
            };

            match self.timers.schedule(&trigger) {
                Ok(()) => {
                    log::debug!(
                        "Armed {} (code {}) for '{}' at {}",
                        key,
                        key.request_code(),
                        alarm.display_label(),
                        at
                    );
                    nearest = Some(nearest.map_or(at, |n: chrono::NaiveDateTime| n.min(at)));
                    armed.push(trigger);
                }
                Err(e) => {
                    log::error!("Failed to arm {} for alarm {}: {}", key, alarm.id, e);
                    errors.push(e);
                }
            }
        }

        self.registry()
            .insert(alarm.id, armed.iter().map(|t| t.key).collect());

        if let Some(at) = nearest {
            self.reminders.schedule(alarm, at);
        }

        if errors.is_empty() {
            ScheduleOutcome::Scheduled(armed)
        } else {
            ScheduleOutcome::Failed { armed, errors }
        }
    }

    /// Cancels the alarm's timers and its pending reminder. Returns the keys
    /// a cancel was issued for.
    ///
    /// Uses the keys this process armed; after a restart (nothing recorded) it
    /// falls back to the keys implied by the alarm's current repeat days.
    pub fn cancel_alarm(&self, alarm: &Alarm) -> Vec<TriggerKey> {
        log::debug!("Cancelling alarm {}", alarm.id);
        let keys = self.registry().remove(&alarm.id).unwrap_or_else(|| {
            let mut keys = vec![TriggerKey::OneShot(alarm.id)];
            keys.extend(
                alarm
                    .repeat_days
                    .iter()
                    .map(|d| TriggerKey::Weekly(alarm.id, d)),
            );
            keys
        });
        self.cancel_keys(&keys);
        self.reminders.cancel(alarm.id);
        keys
    }

    /// Cancels every key an alarm id could own, whatever its stored repeat days.
    /// Used for cleanup of records whose history is unknown.
    pub fn sweep_alarm(&self, alarm_id: AlarmId) {
        self.registry().remove(&alarm_id);
        self.cancel_keys(&TriggerKey::all_for(alarm_id));
        self.reminders.cancel(alarm_id);
    }

    /// Schedules every enabled alarm (boot, package update, clock change).
    pub fn reschedule_all(&self, alarms: &[Alarm]) -> Vec<(AlarmId, ScheduleOutcome)> {
        let enabled: Vec<&Alarm> = alarms.iter().filter(|a| a.enabled).collect();
        log::info!("Rescheduling {} enabled alarms", enabled.len());
        enabled
            .into_iter()
            .map(|a| (a.id, self.schedule_alarm(a)))
            .collect()
    }

    /// Cancels the timers this process armed for the alarm and its reminder.
    fn cancel_armed(&self, alarm_id: AlarmId) {
        let keys = self.registry().remove(&alarm_id);
        if let Some(keys) = keys {
            self.cancel_keys(&keys);
        }
        self.reminders.cancel(alarm_id);
    }

    fn cancel_keys(&self, keys: &[TriggerKey]) {
        for key in keys {
            if let Err(e) = self.timers.cancel(*key) {
                log::warn!("Failed to cancel {}: {}", key, e);
            }
        }
    }
}
