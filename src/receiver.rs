// Entry point for everything the platform calls back with.
use crate::error::WorkResult;
use crate::model::{AlarmId, TriggerPayload};
use crate::ports::{Clock, DeferredTask, DeferredWork};
use crate::reliability::ReliabilityEvaluator;
use crate::scheduler::ScheduleOutcome;
use crate::sequencer::{TriggerFallbackSequencer, TriggerRun};
use crate::service::AlarmService;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// An exact timer went off.
    TimerFired(TriggerPayload),
    /// A deferred task came due.
    DeferredTaskDue(DeferredTask),
    BootCompleted,
    PackageReplaced,
    /// Wall clock, date or time zone changed.
    TimeChanged,
    /// The alarm store was modified by another process.
    StoreChanged,
    /// The user dismissed the ringing alarm.
    Dismiss(AlarmId),
    Shutdown,
}

pub enum Handled {
    Ringing(TriggerRun),
    /// Timer for an alarm that no longer exists or is disabled.
    Ignored,
    Work(WorkResult),
    Rescheduled(Vec<(AlarmId, ScheduleOutcome)>),
    Dismissed(bool),
    Stop,
}

pub struct AlarmReceiver {
    service: Arc<AlarmService>,
    sequencer: TriggerFallbackSequencer,
    reliability: Arc<ReliabilityEvaluator>,
    clock: Arc<dyn Clock>,
}

impl AlarmReceiver {
    pub fn new(
        service: Arc<AlarmService>,
        sequencer: TriggerFallbackSequencer,
        reliability: Arc<ReliabilityEvaluator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            sequencer,
            reliability,
            clock,
        }
    }

    pub fn service(&self) -> &Arc<AlarmService> {
        &self.service
    }

    pub fn sequencer(&self) -> &TriggerFallbackSequencer {
        &self.sequencer
    }

    /// Handles one event. Ringing needs a tokio runtime, see
    /// [`TriggerFallbackSequencer::trigger`].
    pub fn handle(&self, event: PlatformEvent) -> Handled {
        match event {
            PlatformEvent::TimerFired(payload) => self.on_timer_fired(payload),
            PlatformEvent::DeferredTaskDue(task) => Handled::Work(self.on_task_due(&task)),
            PlatformEvent::BootCompleted => {
                log::info!("Boot completed, rescheduling alarms");
                Handled::Rescheduled(self.service.restore_all())
            }
            PlatformEvent::PackageReplaced => {
                log::info!("App updated, rescheduling alarms");
                Handled::Rescheduled(self.service.restore_all())
            }
            PlatformEvent::TimeChanged => {
                log::info!("System time changed, rescheduling alarms");
                Handled::Rescheduled(self.service.restore_all())
            }
            PlatformEvent::StoreChanged => {
                log::info!("Alarm store changed, syncing timers");
                Handled::Rescheduled(self.service.sync_with_store())
            }
            PlatformEvent::Dismiss(id) => Handled::Dismissed(self.sequencer.dismiss(id)),
            PlatformEvent::Shutdown => Handled::Stop,
        }
    }

    fn on_timer_fired(&self, payload: TriggerPayload) -> Handled {
        log::debug!(
            "Timer fired for alarm {} (repeat day {:?})",
            payload.alarm_id,
            payload.repeat_day
        );

        let stored = self.service.store().get(payload.alarm_id);
        let Some(alarm) = stored.filter(|a| a.enabled) else {
            log::warn!(
                "Ignoring timer for missing or disabled alarm {}",
                payload.alarm_id
            );
            return Handled::Ignored;
        };

        let weekly = payload.repeat_day.is_some();
        let run = self.sequencer.trigger(payload);

        // The fired weekly timer is spent; arm next week's.
        if weekly {
            self.service.scheduler().schedule_alarm(&alarm);
        }
        // A backup that finds this alarm ringing will not requeue itself, so
        // the next occurrence's backup is queued here. If nothing reached the
        // user the pending backup stays in place to ring instead.
        let backup = self.service.backup();
        if alarm.is_repeating() && backup.is_enabled() && !run.report.nothing_reached_user() {
            backup.schedule(&alarm);
        }
        Handled::Ringing(run)
    }

    pub fn on_task_due(&self, task: &DeferredTask) -> WorkResult {
        log::debug!("Running deferred task {} (attempt {})", task.key, task.attempt + 1);
        match &task.work {
            DeferredWork::BackupTrigger(payload) => self.service.backup().run(payload),
            DeferredWork::Reminder { alarm_id } => self
                .service
                .scheduler()
                .reminders()
                .run(self.service.store(), *alarm_id),
            DeferredWork::ReliabilityCheck => self.reliability.run_check(self.clock.now_millis()),
        }
    }
}
