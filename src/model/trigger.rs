// Transient OS-level timers derived from stored alarms. Never persisted.
use super::alarm::{Alarm, AlarmId, ChallengeType};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one armed timer. Keys are unique per (alarm, weekday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKey {
    OneShot(AlarmId),
    Weekly(AlarmId, Weekday),
}

impl TriggerKey {
    pub fn alarm_id(&self) -> AlarmId {
        match self {
            TriggerKey::OneShot(id) | TriggerKey::Weekly(id, _) => *id,
        }
    }

    pub fn weekday(&self) -> Option<Weekday> {
        match self {
            TriggerKey::OneShot(_) => None,
            TriggerKey::Weekly(_, day) => Some(*day),
        }
    }

    /// Integer request code in the platform convention: `id` for one-shot timers,
    /// `id * 10 + weekday` (Monday = 1) for weekly ones. Only used for logging;
    /// two different keys can share a code.
    pub fn request_code(&self) -> i64 {
        match self {
            TriggerKey::OneShot(id) => *id,
            TriggerKey::Weekly(id, day) => id * 10 + day.number_from_monday() as i64,
        }
    }

    /// Every key an alarm could ever have armed: one-shot plus the seven weekdays.
    pub fn all_for(id: AlarmId) -> Vec<TriggerKey> {
        let mut keys = vec![TriggerKey::OneShot(id)];
        let mut day = Weekday::Mon;
        for _ in 0..7 {
            keys.push(TriggerKey::Weekly(id, day));
            day = day.succ();
        }
        keys
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKey::OneShot(id) => write!(f, "alarm-{}", id),
            TriggerKey::Weekly(id, day) => write!(f, "alarm-{}-{}", id, day),
        }
    }
}

/// Data delivered with a fired timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub alarm_id: AlarmId,
    pub label: String,
    pub sound: String,
    pub audio_file: Option<String>,
    pub challenge: ChallengeType,
    pub repeat_day: Option<Weekday>,
}

impl TriggerPayload {
    pub fn for_alarm(alarm: &Alarm, repeat_day: Option<Weekday>) -> Self {
        Self {
            alarm_id: alarm.id,
            label: alarm.display_label().to_string(),
            sound: alarm.sound.clone(),
            audio_file: alarm.audio_file.clone(),
            challenge: alarm.challenge,
            repeat_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub key: TriggerKey,
    pub fire_at_ms: i64,
    pub payload: TriggerPayload,
}
