//! Platform services the alarm engine depends on.
//!
//! Every trait here is a thin seam over something the host OS owns: exact
//! timers, deferred background work, notifications, audio, wake locks, the
//! full-screen ringing UI and permission queries. Calls are fire-and-forget:
//! a successful return means "request accepted", not "it happened". Callbacks
//! (fired timers, due tasks) come back as [`crate::receiver::PlatformEvent`]s.
//!
//! `platform::memory` holds recording implementations for tests and
//! `platform::desktop` the tokio-backed ones used by the daemon.
use crate::backup::BackupPayload;
use crate::error::PlatformError;
use crate::model::{AlarmId, ScheduledTrigger, TriggerKey, TriggerPayload};
use chrono::NaiveDateTime;
use std::time::Duration;

pub type PortResult<T = ()> = Result<T, PlatformError>;

/// Wall clock in the device's local time zone.
pub trait Clock: Send + Sync {
    fn now_local(&self) -> NaiveDateTime;
    fn now_millis(&self) -> i64;
    /// Maps a local wall-clock instant to epoch milliseconds.
    fn to_epoch_millis(&self, local: NaiveDateTime) -> i64;
}

/// Wake-capable exact timer service (the platform alarm manager).
pub trait ExactTimerService: Send + Sync {
    /// Whether the OS currently allows exact timers for this app.
    fn can_schedule_exact(&self) -> bool;
    /// Arms (or replaces) the timer identified by `trigger.key`.
    fn schedule(&self, trigger: &ScheduledTrigger) -> PortResult;
    /// Cancels a timer by key. Cancelling an unknown key is not an error.
    fn cancel(&self, key: TriggerKey) -> PortResult;
}

/// Work a deferred task performs when it comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredWork {
    BackupTrigger(BackupPayload),
    Reminder { alarm_id: AlarmId },
    ReliabilityCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredTask {
    /// Unique key; enqueueing a task with an existing key replaces it.
    pub key: String,
    pub tags: Vec<String>,
    pub delay_ms: i64,
    pub work: DeferredWork,
    /// Number of previous runs that ended in `WorkResult::Retry`.
    pub attempt: u32,
}

impl DeferredTask {
    pub fn new(key: impl Into<String>, delay_ms: i64, work: DeferredWork) -> Self {
        Self {
            key: key.into(),
            tags: Vec::new(),
            delay_ms,
            work,
            attempt: 0,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Deferred background work queue, persisted by the host across restarts.
pub trait DeferredTaskService: Send + Sync {
    fn enqueue(&self, task: DeferredTask) -> PortResult;
    fn cancel_by_key(&self, key: &str) -> PortResult;
    fn cancel_by_tag(&self, tag: &str) -> PortResult;
    fn cancel_all(&self) -> PortResult;
    /// Snapshot of tasks not yet run.
    fn pending(&self) -> Vec<DeferredTask>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPriority {
    Default,
    High,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmNotification {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    /// May take over the screen when the device is locked.
    pub full_screen: bool,
    pub ongoing: bool,
}

pub trait NotificationPoster: Send + Sync {
    fn post(&self, notification: &AlarmNotification) -> PortResult;
    fn cancel(&self, id: i64) -> PortResult;
}

/// Foreground service that loops the alarm sound.
pub trait AudioService: Send + Sync {
    fn start(&self, payload: &TriggerPayload) -> PortResult;
    fn stop(&self) -> PortResult;
    fn is_playing(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeLockId(pub u64);

pub trait PowerService: Send + Sync {
    /// Forces the screen and CPU awake. The lock expires by itself after `timeout`.
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> PortResult<WakeLockId>;
    fn release_wake_lock(&self, id: WakeLockId) -> PortResult;
}

/// How hard to push the ringing screen to the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStyle {
    /// New task, clear top, single top, no animation, reorder to front.
    Aggressive,
    /// New task only.
    Minimal,
}

/// Full-screen "alarm ringing" UI.
pub trait RingingScreen: Send + Sync {
    fn launch(&self, payload: &TriggerPayload, style: LaunchStyle) -> PortResult;
    fn is_device_locked(&self) -> bool;
}

pub trait PermissionProbe: Send + Sync {
    fn exact_alarm_permission_granted(&self) -> bool;
    fn is_ignoring_battery_optimizations(&self) -> bool;
}
