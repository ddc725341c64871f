// Process-wide "an alarm is currently sounding" flag.
//
// Shared by the trigger sequencer (sets it when audio starts) and the backup
// path (reads it to suppress a duplicate trigger). Cloning shares the cell.
// Nothing is persisted: after a restart the session reads as not ringing.
use crate::model::AlarmId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

const NO_ALARM: i64 = -1;

#[derive(Debug, Clone, Default)]
pub struct RingingSession {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    ringing: AtomicBool,
    alarm_id: AtomicI64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            ringing: AtomicBool::new(false),
            alarm_id: AtomicI64::new(NO_ALARM),
        }
    }
}

impl RingingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ringing(&self) -> bool {
        self.inner.ringing.load(Ordering::SeqCst)
    }

    /// Alarm currently sounding, if any.
    pub fn current(&self) -> Option<AlarmId> {
        if !self.is_ringing() {
            return None;
        }
        match self.inner.alarm_id.load(Ordering::SeqCst) {
            NO_ALARM => None,
            id => Some(id),
        }
    }

    /// Marks `alarm_id` as sounding. Only one alarm is tracked at a time, so a
    /// second alarm takes over the session; the replaced id is returned.
    pub fn start(&self, alarm_id: AlarmId) -> Option<AlarmId> {
        let was_ringing = self.inner.ringing.swap(true, Ordering::SeqCst);
        let previous = self.inner.alarm_id.swap(alarm_id, Ordering::SeqCst);
        if !was_ringing || previous == NO_ALARM || previous == alarm_id {
            return None;
        }
        log::warn!(
            "Alarm {} started while alarm {} was still ringing; it now owns the session",
            alarm_id,
            previous
        );
        Some(previous)
    }

    pub fn clear(&self) {
        self.inner.ringing.store(false, Ordering::SeqCst);
        self.inner.alarm_id.store(NO_ALARM, Ordering::SeqCst);
    }
}
