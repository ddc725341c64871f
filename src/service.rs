// Alarm lifecycle operations shared by the CLI and the daemon.
//
// Every mutation goes to the store first, then timers and backup tasks are
// brought in line with the stored record.
use crate::backup::{self, BackupTriggerPath};
use crate::context::AppContext;
use crate::model::{Alarm, AlarmId};
use crate::scheduler::{AlarmScheduler, ScheduleOutcome};
use crate::store::AlarmStore;
use anyhow::{Result, anyhow};
use std::sync::Arc;

pub struct AlarmService {
    ctx: Arc<dyn AppContext>,
    store: Arc<AlarmStore>,
    scheduler: AlarmScheduler,
    backup: BackupTriggerPath,
}

impl AlarmService {
    pub fn new(
        ctx: Arc<dyn AppContext>,
        store: Arc<AlarmStore>,
        scheduler: AlarmScheduler,
        backup: BackupTriggerPath,
    ) -> Self {
        Self {
            ctx,
            store,
            scheduler,
            backup,
        }
    }

    pub fn store(&self) -> &Arc<AlarmStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &AlarmScheduler {
        &self.scheduler
    }

    pub fn backup(&self) -> &BackupTriggerPath {
        &self.backup
    }

    fn arm(&self, alarm: &Alarm) -> ScheduleOutcome {
        self.backup.cancel(alarm.id);
        let outcome = self.scheduler.schedule_alarm(alarm);
        if alarm.enabled {
            self.backup.schedule(alarm);
        }
        outcome
    }

    pub fn create_alarm(&self, alarm: Alarm) -> Result<(Alarm, ScheduleOutcome)> {
        let stored = self.store.insert(alarm)?;
        log::info!("Created alarm {} ({})", stored.id, stored);
        let outcome = self.arm(&stored);
        Ok((stored, outcome))
    }

    /// Replaces an alarm. Timers of the previous version are cancelled first,
    /// so dropping a repeat day also drops its timer.
    pub fn update_alarm(&self, alarm: Alarm) -> Result<(Alarm, ScheduleOutcome)> {
        let previous = self
            .store
            .get(alarm.id)
            .ok_or_else(|| anyhow!("Alarm {} not found", alarm.id))?;
        let stored = self.store.update(alarm)?;
        self.scheduler.cancel_alarm(&previous);
        log::info!("Updated alarm {} ({})", stored.id, stored);
        let outcome = self.arm(&stored);
        Ok((stored, outcome))
    }

    pub fn set_enabled(&self, id: AlarmId, enabled: bool) -> Result<(Alarm, ScheduleOutcome)> {
        let mut alarm = self
            .store
            .get(id)
            .ok_or_else(|| anyhow!("Alarm {} not found", id))?;
        alarm.enabled = enabled;
        let stored = self.store.update(alarm)?;
        let outcome = self.arm(&stored);
        Ok((stored, outcome))
    }

    /// Removes an alarm together with its timers, reminder and backup task.
    pub fn delete_alarm(&self, id: AlarmId) -> Result<Option<Alarm>> {
        let Some(alarm) = self.store.get(id) else {
            return Ok(None);
        };
        self.scheduler.cancel_alarm(&alarm);
        self.backup.cancel(id);
        let removed = self.store.delete(id)?;
        log::info!("Deleted alarm {}", id);
        Ok(removed)
    }

    /// Arms every stored alarm again without touching unrelated tasks.
    /// Used after boot, app update and clock changes.
    pub fn restore_all(&self) -> Vec<(AlarmId, ScheduleOutcome)> {
        let alarms = self.store.alarms();
        let results = self.scheduler.reschedule_all(&alarms);
        if self.backup.is_enabled() {
            for alarm in alarms.iter().filter(|a| a.enabled) {
                self.backup.schedule(alarm);
            }
        }
        results
    }

    /// Brings timers in line with a store that was edited elsewhere: alarms
    /// that vanished lose every timer and task, the rest are re-armed.
    pub fn sync_with_store(&self) -> Vec<(AlarmId, ScheduleOutcome)> {
        let alarms = self.store.alarms();
        for id in self.scheduler.armed_alarm_ids() {
            if !alarms.iter().any(|a| a.id == id) {
                log::info!("Alarm {} was removed, cancelling its timers", id);
                self.scheduler.sweep_alarm(id);
                self.backup.cancel(id);
            }
        }
        for alarm in alarms.iter().filter(|a| !a.enabled) {
            self.scheduler.cancel_alarm(alarm);
            self.backup.cancel(alarm.id);
        }
        self.restore_all()
    }

    /// Cancels every backup task and every timer, then arms enabled alarms
    /// from scratch.
    pub fn force_reschedule_all(&self) -> Vec<(AlarmId, ScheduleOutcome)> {
        log::info!("Force rescheduling all alarms");
        self.backup.cancel_all();
        let alarms = self.store.alarms();
        for alarm in &alarms {
            self.scheduler.cancel_alarm(alarm);
        }
        let results = self.scheduler.reschedule_all(&alarms);
        if self.backup.is_enabled() {
            for alarm in alarms.iter().filter(|a| a.enabled) {
                self.backup.schedule(alarm);
            }
        }
        results
    }

    pub fn enable_backup_system(&self) -> Result<usize> {
        backup::set_backup_enabled(self.ctx.as_ref(), true)?;
        let queued = self
            .store
            .alarms()
            .iter()
            .filter(|a| a.enabled)
            .filter(|a| self.backup.schedule(a))
            .count();
        log::info!("Backup alarm system enabled, {} tasks queued", queued);
        Ok(queued)
    }

    pub fn disable_backup_system(&self) -> Result<()> {
        backup::set_backup_enabled(self.ctx.as_ref(), false)?;
        self.backup.cancel_all();
        log::info!("Backup alarm system disabled");
        Ok(())
    }
}
