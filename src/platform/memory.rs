// In-process port implementations that record every call.
//
// Each fake exposes switches to make the next calls fail, so tests can walk
// the error paths without a real OS behind them.
use super::{Platform, lock};
use crate::error::PlatformError;
use crate::model::{AlarmId, ScheduledTrigger, TriggerKey, TriggerPayload};
use crate::ports::{
    AlarmNotification, AudioService, Clock, DeferredTask, DeferredTaskService, ExactTimerService,
    LaunchStyle, NotificationPoster, PermissionProbe, PortResult, PowerService, RingingScreen,
    WakeLockId,
};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A clock that only moves when told to. Local time is treated as UTC.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now_local(&self) -> NaiveDateTime {
        *lock(&self.now)
    }

    fn now_millis(&self) -> i64 {
        self.to_epoch_millis(self.now_local())
    }

    fn to_epoch_millis(&self, local: NaiveDateTime) -> i64 {
        local.and_utc().timestamp_millis()
    }
}

#[derive(Debug)]
pub struct MemoryTimerService {
    permitted: AtomicBool,
    fail_schedule: AtomicBool,
    armed: Mutex<HashMap<TriggerKey, ScheduledTrigger>>,
    cancelled: Mutex<Vec<TriggerKey>>,
}

impl Default for MemoryTimerService {
    fn default() -> Self {
        Self {
            permitted: AtomicBool::new(true),
            fail_schedule: AtomicBool::new(false),
            armed: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn fail_schedules(&self, fail: bool) {
        self.fail_schedule.store(fail, Ordering::SeqCst);
    }

    /// Armed timers, earliest first.
    pub fn armed(&self) -> Vec<ScheduledTrigger> {
        let mut out: Vec<_> = lock(&self.armed).values().cloned().collect();
        out.sort_by_key(|t| (t.fire_at_ms, t.key.request_code()));
        out
    }

    pub fn armed_for(&self, alarm_id: AlarmId) -> Vec<ScheduledTrigger> {
        self.armed()
            .into_iter()
            .filter(|t| t.key.alarm_id() == alarm_id)
            .collect()
    }

    /// Every cancel call received, in order, including unknown keys.
    pub fn cancelled(&self) -> Vec<TriggerKey> {
        lock(&self.cancelled).clone()
    }

    pub fn clear_log(&self) {
        lock(&self.cancelled).clear();
    }

    /// Removes and returns an armed timer as if it had fired.
    pub fn fire(&self, key: TriggerKey) -> Option<ScheduledTrigger> {
        lock(&self.armed).remove(&key)
    }
}

impl ExactTimerService for MemoryTimerService {
    fn can_schedule_exact(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    fn schedule(&self, trigger: &ScheduledTrigger) -> PortResult {
        if !self.can_schedule_exact() {
            return Err(PlatformError::PermissionDenied(
                "exact alarms not allowed".to_string(),
            ));
        }
        if self.fail_schedule.load(Ordering::SeqCst) {
            return Err(PlatformError::rejected("timer service refused"));
        }
        lock(&self.armed).insert(trigger.key, trigger.clone());
        Ok(())
    }

    fn cancel(&self, key: TriggerKey) -> PortResult {
        lock(&self.armed).remove(&key);
        lock(&self.cancelled).push(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<Vec<DeferredTask>>,
    fail: AtomicBool,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_enqueues(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<DeferredTask> {
        lock(&self.tasks).iter().find(|t| t.key == key).cloned()
    }

    /// Removes a pending task as if it had come due.
    pub fn take(&self, key: &str) -> Option<DeferredTask> {
        let mut tasks = lock(&self.tasks);
        let pos = tasks.iter().position(|t| t.key == key)?;
        Some(tasks.remove(pos))
    }

    pub fn with_tag(&self, tag: &str) -> Vec<DeferredTask> {
        lock(&self.tasks)
            .iter()
            .filter(|t| t.has_tag(tag))
            .cloned()
            .collect()
    }
}

impl DeferredTaskService for MemoryTaskQueue {
    fn enqueue(&self, task: DeferredTask) -> PortResult {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("task queue offline"));
        }
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| t.key != task.key);
        tasks.push(task);
        Ok(())
    }

    fn cancel_by_key(&self, key: &str) -> PortResult {
        lock(&self.tasks).retain(|t| t.key != key);
        Ok(())
    }

    fn cancel_by_tag(&self, tag: &str) -> PortResult {
        lock(&self.tasks).retain(|t| !t.has_tag(tag));
        Ok(())
    }

    fn cancel_all(&self) -> PortResult {
        lock(&self.tasks).clear();
        Ok(())
    }

    fn pending(&self) -> Vec<DeferredTask> {
        lock(&self.tasks).clone()
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifier {
    posted: Mutex<Vec<AlarmNotification>>,
    cancelled: Mutex<Vec<i64>>,
    fail: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn posted(&self) -> Vec<AlarmNotification> {
        lock(&self.posted).clone()
    }

    pub fn cancelled(&self) -> Vec<i64> {
        lock(&self.cancelled).clone()
    }
}

impl NotificationPoster for MemoryNotifier {
    fn post(&self, notification: &AlarmNotification) -> PortResult {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::PermissionDenied(
                "notifications blocked".to_string(),
            ));
        }
        lock(&self.posted).push(notification.clone());
        Ok(())
    }

    fn cancel(&self, id: i64) -> PortResult {
        lock(&self.cancelled).push(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAudio {
    playing: AtomicBool,
    fail_start: AtomicBool,
    starts: Mutex<Vec<TriggerPayload>>,
    stops: AtomicUsize,
}

impl MemoryAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_starts(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Simulates the OS killing (or reviving) playback behind our back.
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn starts(&self) -> Vec<TriggerPayload> {
        lock(&self.starts).clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioService for MemoryAudio {
    fn start(&self, payload: &TriggerPayload) -> PortResult {
        lock(&self.starts).push(payload.clone());
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("audio service not started"));
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> PortResult {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPower {
    next_id: AtomicU64,
    fail: AtomicBool,
    acquired: Mutex<Vec<(String, Duration)>>,
    released: Mutex<Vec<WakeLockId>>,
}

impl MemoryPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> Vec<(String, Duration)> {
        lock(&self.acquired).clone()
    }

    pub fn released(&self) -> Vec<WakeLockId> {
        lock(&self.released).clone()
    }
}

impl PowerService for MemoryPower {
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> PortResult<WakeLockId> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("power service unavailable"));
        }
        lock(&self.acquired).push((tag.to_string(), timeout));
        Ok(WakeLockId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn release_wake_lock(&self, id: WakeLockId) -> PortResult {
        lock(&self.released).push(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryScreen {
    locked: AtomicBool,
    fail_aggressive: AtomicBool,
    fail_all: AtomicBool,
    launches: Mutex<Vec<(AlarmId, LaunchStyle)>>,
}

impl MemoryScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Background activity start restrictions: only the minimal launch works.
    pub fn fail_aggressive(&self, fail: bool) {
        self.fail_aggressive.store(fail, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Successful launches, in order.
    pub fn launches(&self) -> Vec<(AlarmId, LaunchStyle)> {
        lock(&self.launches).clone()
    }
}

impl RingingScreen for MemoryScreen {
    fn launch(&self, payload: &TriggerPayload, style: LaunchStyle) -> PortResult {
        if self.fail_all.load(Ordering::SeqCst)
            || (style == LaunchStyle::Aggressive && self.fail_aggressive.load(Ordering::SeqCst))
        {
            return Err(PlatformError::rejected(format!(
                "{:?} launch blocked",
                style
            )));
        }
        lock(&self.launches).push((payload.alarm_id, style));
        Ok(())
    }

    fn is_device_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct StaticPermissions {
    exact_alarm: AtomicBool,
    battery_exempt: AtomicBool,
}

impl StaticPermissions {
    pub fn new(exact_alarm: bool, battery_exempt: bool) -> Self {
        Self {
            exact_alarm: AtomicBool::new(exact_alarm),
            battery_exempt: AtomicBool::new(battery_exempt),
        }
    }

    pub fn set_exact_alarm(&self, granted: bool) {
        self.exact_alarm.store(granted, Ordering::SeqCst);
    }

    pub fn set_battery_exempt(&self, exempt: bool) {
        self.battery_exempt.store(exempt, Ordering::SeqCst);
    }
}

impl PermissionProbe for StaticPermissions {
    fn exact_alarm_permission_granted(&self) -> bool {
        self.exact_alarm.load(Ordering::SeqCst)
    }

    fn is_ignoring_battery_optimizations(&self) -> bool {
        self.battery_exempt.load(Ordering::SeqCst)
    }
}

/// Every memory fake, with concrete types kept for inspection.
#[derive(Clone)]
pub struct MemoryPlatform {
    pub clock: Arc<FixedClock>,
    pub timers: Arc<MemoryTimerService>,
    pub tasks: Arc<MemoryTaskQueue>,
    pub notifier: Arc<MemoryNotifier>,
    pub audio: Arc<MemoryAudio>,
    pub power: Arc<MemoryPower>,
    pub screen: Arc<MemoryScreen>,
    pub permissions: Arc<StaticPermissions>,
}

impl MemoryPlatform {
    /// All permissions granted, clock at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            clock: Arc::new(FixedClock::new(now)),
            timers: Arc::new(MemoryTimerService::new()),
            tasks: Arc::new(MemoryTaskQueue::new()),
            notifier: Arc::new(MemoryNotifier::new()),
            audio: Arc::new(MemoryAudio::new()),
            power: Arc::new(MemoryPower::new()),
            screen: Arc::new(MemoryScreen::new()),
            permissions: Arc::new(StaticPermissions::new(true, true)),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            clock: self.clock.clone(),
            timers: self.timers.clone(),
            tasks: self.tasks.clone(),
            notifier: self.notifier.clone(),
            audio: self.audio.clone(),
            power: self.power.clone(),
            screen: self.screen.clone(),
            permissions: self.permissions.clone(),
        }
    }
}
