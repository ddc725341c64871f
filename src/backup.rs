// Optional second trigger path through the deferred task queue.
//
// When enabled, every alarm also gets a deferred task due at its next
// occurrence. If the exact timer did its job the ringing session is already
// active and the task does nothing; otherwise it rings the alarm itself.
use crate::config::Config;
use crate::context::AppContext;
use crate::error::WorkResult;
use crate::model::{Alarm, AlarmId, ChallengeType, DEFAULT_SOUND, RepeatDays, TriggerPayload};
use crate::ports::{Clock, DeferredTask, DeferredTaskService, DeferredWork, PortResult};
use crate::resolver;
use crate::sequencer::TriggerFallbackSequencer;
use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BACKUP_TAG: &str = "backup_alarm";
pub const BACKUP_LABEL_SUFFIX: &str = " (Backup)";

pub fn backup_key(alarm_id: AlarmId) -> String {
    format!("backup_alarm_{}", alarm_id)
}

/// Everything a backup task needs to ring without reading the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPayload {
    pub alarm_id: AlarmId,
    pub label: String,
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub repeat_days: RepeatDays,
}

impl BackupPayload {
    pub fn for_alarm(alarm: &Alarm) -> Self {
        Self {
            alarm_id: alarm.id,
            label: alarm.display_label().to_string(),
            hour: alarm.hour,
            minute: alarm.minute,
            repeat_days: alarm.repeat_days,
        }
    }

    pub fn next_occurrence(&self, now: NaiveDateTime) -> NaiveDateTime {
        resolver::occurrences_at(self.hour, self.minute, self.repeat_days, now)
            .into_iter()
            .map(|(_, at)| at)
            .min()
            .unwrap_or_else(|| resolver::resolve_one_shot(self.hour, self.minute, now))
    }

    /// Trigger data for the backup ring. Sound and challenge are the defaults
    /// so a broken custom sound cannot silence the backup too.
    pub fn trigger_payload(&self) -> TriggerPayload {
        TriggerPayload {
            alarm_id: self.alarm_id,
            label: format!("{}{}", self.label, BACKUP_LABEL_SUFFIX),
            sound: DEFAULT_SOUND.to_string(),
            audio_file: None,
            challenge: ChallengeType::default(),
            repeat_day: None,
        }
    }
}

/// Persists the backup opt-in flag.
pub fn set_backup_enabled(ctx: &dyn AppContext, enabled: bool) -> Result<()> {
    let mut config = Config::load_or_default(ctx)?;
    config.backup_alarms_enabled = enabled;
    config.save(ctx)
}

pub struct BackupTriggerPath {
    tasks: Arc<dyn DeferredTaskService>,
    clock: Arc<dyn Clock>,
    ctx: Arc<dyn AppContext>,
    sequencer: TriggerFallbackSequencer,
}

impl BackupTriggerPath {
    pub fn new(
        tasks: Arc<dyn DeferredTaskService>,
        clock: Arc<dyn Clock>,
        ctx: Arc<dyn AppContext>,
        sequencer: TriggerFallbackSequencer,
    ) -> Self {
        Self {
            tasks,
            clock,
            ctx,
            sequencer,
        }
    }

    /// Reads the opt-in flag from the config file on every call.
    pub fn is_enabled(&self) -> bool {
        match Config::load_or_default(self.ctx.as_ref()) {
            Ok(cfg) => cfg.backup_alarms_enabled,
            Err(e) => {
                log::warn!("Could not read backup preference: {}", e);
                false
            }
        }
    }

    /// Queues the backup task for the alarm's next occurrence, replacing any
    /// pending one. Returns whether a task was queued.
    pub fn schedule(&self, alarm: &Alarm) -> bool {
        if !alarm.enabled || !self.is_enabled() {
            return false;
        }
        match self.enqueue(BackupPayload::for_alarm(alarm)) {
            Ok(queued) => queued,
            Err(e) => {
                log::warn!("Failed to schedule backup for alarm {}: {}", alarm.id, e);
                false
            }
        }
    }

    fn enqueue(&self, payload: BackupPayload) -> PortResult<bool> {
        let at = payload.next_occurrence(self.clock.now_local());
        let delay_ms = self.clock.to_epoch_millis(at) - self.clock.now_millis();
        if delay_ms <= 0 {
            return Ok(false);
        }

        let key = backup_key(payload.alarm_id);
        let alarm_id = payload.alarm_id;
        let task = DeferredTask::new(key.clone(), delay_ms, DeferredWork::BackupTrigger(payload))
            .tagged(BACKUP_TAG)
            .tagged(key);
        self.tasks.enqueue(task)?;

        log::debug!(
            "Scheduled backup for alarm {} at {} (delay: {}ms)",
            alarm_id,
            at,
            delay_ms
        );
        Ok(true)
    }

    pub fn cancel(&self, alarm_id: AlarmId) {
        if let Err(e) = self.tasks.cancel_by_key(&backup_key(alarm_id)) {
            log::warn!("Failed to cancel backup for alarm {}: {}", alarm_id, e);
        }
    }

    pub fn cancel_all(&self) {
        if let Err(e) = self.tasks.cancel_by_tag(BACKUP_TAG) {
            log::warn!("Failed to cancel backup tasks: {}", e);
        }
    }

    /// Runs a due backup task. A backup that finds an alarm already sounding
    /// does nothing; the main trigger path queues the next one in that case.
    pub fn run(&self, payload: &BackupPayload) -> WorkResult {
        if self.sequencer.session().is_ringing() {
            log::debug!(
                "Alarm {} already ringing, backup not needed",
                payload.alarm_id
            );
            return WorkResult::Success;
        }

        log::warn!(
            "Main trigger did not ring alarm {}, ringing backup '{}'",
            payload.alarm_id,
            payload.label
        );
        let report = self.sequencer.trigger(payload.trigger_payload()).detach();
        if report.nothing_reached_user() {
            return WorkResult::Retry;
        }

        // The alarm has rung; from here on a failure must not trigger a retry.
        if !payload.repeat_days.is_empty()
            && self.is_enabled()
            && let Err(e) = self.enqueue(payload.clone())
        {
            log::error!(
                "Failed to queue next backup for alarm {}: {}",
                payload.alarm_id,
                e
            );
        }
        WorkResult::Success
    }
}
