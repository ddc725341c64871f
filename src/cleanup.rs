// Repair tools for stray timers and tasks ("alarm rang although I deleted it").
use crate::backup::BACKUP_TAG;
use crate::reliability::RELIABILITY_CHECK_TAG;
use crate::service::AlarmService;
use crate::ports::DeferredTaskService;
use std::fmt::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub swept: usize,
    pub rescheduled: usize,
}

pub struct CleanupUtility {
    service: Arc<AlarmService>,
    tasks: Arc<dyn DeferredTaskService>,
}

impl CleanupUtility {
    pub fn new(service: Arc<AlarmService>, tasks: Arc<dyn DeferredTaskService>) -> Self {
        Self { service, tasks }
    }

    /// Drops backup and reliability tasks, cancels every possible timer of
    /// disabled alarms and re-arms the enabled ones.
    pub fn perform_full_cleanup(&self) -> CleanupReport {
        log::info!("Starting full alarm cleanup");

        for tag in [BACKUP_TAG, RELIABILITY_CHECK_TAG] {
            if let Err(e) = self.tasks.cancel_by_tag(tag) {
                log::warn!("Failed to cancel '{}' tasks: {}", tag, e);
            }
        }

        let alarms = self.service.store().alarms();
        let (enabled, disabled): (Vec<_>, Vec<_>) = alarms.into_iter().partition(|a| a.enabled);
        log::debug!(
            "Found {} enabled alarms, {} disabled alarms",
            enabled.len(),
            disabled.len()
        );

        for alarm in &disabled {
            self.service.scheduler().sweep_alarm(alarm.id);
        }
        let rescheduled = self.service.scheduler().reschedule_all(&enabled).len();

        log::info!("Cleanup completed");
        CleanupReport {
            swept: disabled.len(),
            rescheduled,
        }
    }

    /// Cancels every deferred task, whatever it is.
    pub fn emergency_cleanup(&self) {
        log::warn!("Emergency cleanup: cancelling all deferred tasks");
        if let Err(e) = self.tasks.cancel_all() {
            log::error!("Emergency cleanup failed: {}", e);
        }
    }

    pub fn debug_info(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== ALARM DEBUG INFO ===");

        let pending = self.tasks.pending();
        let backups: Vec<_> = pending.iter().filter(|t| t.has_tag(BACKUP_TAG)).collect();
        let _ = writeln!(out, "Pending deferred tasks: {}", pending.len());
        let _ = writeln!(out, "Active backup tasks: {}", backups.len());
        for task in &pending {
            let _ = writeln!(
                out,
                "  Task: {}, due in {}s, attempt {}, tags [{}]",
                task.key,
                task.delay_ms / 1000,
                task.attempt,
                task.tags.join(", ")
            );
        }

        let alarms = self.service.store().alarms();
        let enabled = alarms.iter().filter(|a| a.enabled).count();
        let _ = writeln!(out, "Stored alarms: {}", alarms.len());
        let _ = writeln!(out, "Enabled alarms: {}", enabled);
        let _ = writeln!(out, "Disabled alarms: {}", alarms.len() - enabled);
        for alarm in &alarms {
            let armed = self.service.scheduler().armed_keys(alarm.id);
            let _ = writeln!(
                out,
                "  Alarm {}: {:02}:{:02}, enabled={}, repeat={}, label={}, armed timers={}",
                alarm.id,
                alarm.hour,
                alarm.minute,
                alarm.enabled,
                alarm.repeat_days,
                alarm.display_label(),
                armed.len()
            );
        }
        out
    }
}
