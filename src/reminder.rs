// "Alarm coming up" notifications posted a fixed lead time before an alarm.
use crate::error::WorkResult;
use crate::model::{Alarm, AlarmId};
use crate::ports::{
    AlarmNotification, Clock, DeferredTask, DeferredTaskService, DeferredWork, NotificationPoster,
    NotificationPriority,
};
use crate::store::AlarmStore;
use chrono::NaiveDateTime;
use std::sync::Arc;

pub const REMINDER_TAG: &str = "reminder";

/// Reminder notifications use their own id range so they never replace a
/// ringing notification (whose id is the alarm id).
pub const REMINDER_NOTIFICATION_OFFSET: i64 = 100_000;

pub fn reminder_key(alarm_id: AlarmId) -> String {
    format!("reminder_{}", alarm_id)
}

pub struct ReminderScheduler {
    tasks: Arc<dyn DeferredTaskService>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationPoster>,
    lead: chrono::Duration,
}

impl ReminderScheduler {
    pub fn new(
        tasks: Arc<dyn DeferredTaskService>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationPoster>,
        lead: chrono::Duration,
    ) -> Self {
        Self {
            tasks,
            clock,
            notifier,
            lead,
        }
    }

    /// Queues the reminder for `occurrence`. Returns false when the reminder
    /// time has already passed or the queue refused the task.
    pub fn schedule(&self, alarm: &Alarm, occurrence: NaiveDateTime) -> bool {
        let remind_at = occurrence - self.lead;
        let delay_ms = self.clock.to_epoch_millis(remind_at) - self.clock.now_millis();

        if delay_ms <= 0 {
            log::debug!(
                "Reminder time {} has already passed for alarm {}",
                remind_at,
                alarm.id
            );
            return false;
        }

        let key = reminder_key(alarm.id);
        let task = DeferredTask::new(
            key.clone(),
            delay_ms,
            DeferredWork::Reminder { alarm_id: alarm.id },
        )
        .tagged(REMINDER_TAG)
        .tagged(key);

        match self.tasks.enqueue(task) {
            Ok(()) => {
                log::debug!(
                    "Reminder for alarm {} scheduled at {} ({} min from now)",
                    alarm.id,
                    remind_at,
                    delay_ms / 60_000
                );
                true
            }
            Err(e) => {
                log::warn!("Failed to schedule reminder for alarm {}: {}", alarm.id, e);
                false
            }
        }
    }

    pub fn cancel(&self, alarm_id: AlarmId) {
        if let Err(e) = self.tasks.cancel_by_tag(&reminder_key(alarm_id)) {
            log::warn!("Failed to cancel reminder for alarm {}: {}", alarm_id, e);
        }
    }

    pub fn cancel_all(&self) {
        if let Err(e) = self.tasks.cancel_by_tag(REMINDER_TAG) {
            log::warn!("Failed to cancel reminders: {}", e);
        }
    }

    /// Runs a due reminder task. A deleted or disabled alarm is a quiet success.
    pub fn run(&self, store: &AlarmStore, alarm_id: AlarmId) -> WorkResult {
        let Some(alarm) = store.get(alarm_id) else {
            log::debug!("Reminder for deleted alarm {} dropped", alarm_id);
            return WorkResult::Success;
        };
        if !alarm.enabled {
            return WorkResult::Success;
        }

        let notification = AlarmNotification {
            id: REMINDER_NOTIFICATION_OFFSET + alarm.id,
            title: "Upcoming alarm".to_string(),
            body: format!(
                "{} rings at {}",
                alarm.display_label(),
                alarm.formatted_time()
            ),
            priority: NotificationPriority::Default,
            full_screen: false,
            ongoing: false,
        };

        match self.notifier.post(&notification) {
            Ok(()) => WorkResult::Success,
            Err(e) => {
                log::warn!("Failed to post reminder for alarm {}: {}", alarm.id, e);
                WorkResult::Retry
            }
        }
    }
}
