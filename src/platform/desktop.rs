// Port implementations for a desktop daemon.
//
// Timers and deferred tasks are tokio tasks that sleep and then push a
// `PlatformEvent` onto the engine's channel. They only live as long as the
// process, which is why the daemon restores everything on start.
use super::lock;
use crate::error::PlatformError;
use crate::model::{ScheduledTrigger, TriggerKey, TriggerPayload};
use crate::ports::{
    AlarmNotification, AudioService, Clock, DeferredTask, DeferredTaskService, ExactTimerService,
    LaunchStyle, NotificationPoster, NotificationPriority, PermissionProbe, PortResult,
    PowerService, RingingScreen, WakeLockId,
};
use crate::receiver::PlatformEvent;
use crate::resolver::local_to_millis;
use chrono::{Local, NaiveDateTime, Utc};
use notify_rust::Notification;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn to_epoch_millis(&self, local: NaiveDateTime) -> i64 {
        local_to_millis(&Local, local)
    }
}

fn runtime() -> PortResult<Handle> {
    Handle::try_current().map_err(|e| PlatformError::unavailable(e.to_string()))
}

fn delay_until(clock: &dyn Clock, fire_at_ms: i64) -> Duration {
    Duration::from_millis((fire_at_ms - clock.now_millis()).max(0) as u64)
}

pub struct TokioTimerService {
    events: mpsc::Sender<PlatformEvent>,
    clock: Arc<dyn Clock>,
    armed: Mutex<HashMap<TriggerKey, JoinHandle<()>>>,
}

impl TokioTimerService {
    pub fn new(events: mpsc::Sender<PlatformEvent>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events,
            clock,
            armed: Mutex::new(HashMap::new()),
        }
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.armed).values().filter(|h| !h.is_finished()).count()
    }
}

impl ExactTimerService for TokioTimerService {
    fn can_schedule_exact(&self) -> bool {
        true
    }

    fn schedule(&self, trigger: &ScheduledTrigger) -> PortResult {
        let rt = runtime()?;
        let delay = delay_until(self.clock.as_ref(), trigger.fire_at_ms);
        let events = self.events.clone();
        let payload = trigger.payload.clone();

        let handle = rt.spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(PlatformEvent::TimerFired(payload)).await.is_err() {
                log::warn!("Engine stopped before a timer could be delivered");
            }
        });

        if let Some(previous) = lock(&self.armed).insert(trigger.key, handle) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel(&self, key: TriggerKey) -> PortResult {
        if let Some(handle) = lock(&self.armed).remove(&key) {
            handle.abort();
        }
        Ok(())
    }
}

struct QueuedTask {
    generation: u64,
    task: DeferredTask,
    handle: JoinHandle<()>,
}

type TaskMap = Arc<Mutex<HashMap<String, QueuedTask>>>;

pub struct TokioTaskQueue {
    events: mpsc::Sender<PlatformEvent>,
    tasks: TaskMap,
    generation: AtomicU64,
}

impl TokioTaskQueue {
    pub fn new(events: mpsc::Sender<PlatformEvent>) -> Self {
        Self {
            events,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    fn cancel_where(&self, pred: impl Fn(&QueuedTask) -> bool) {
        lock(&self.tasks).retain(|_, q| {
            if pred(q) {
                q.handle.abort();
                false
            } else {
                true
            }
        });
    }
}

impl DeferredTaskService for TokioTaskQueue {
    fn enqueue(&self, task: DeferredTask) -> PortResult {
        let rt = runtime()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let delay = Duration::from_millis(task.delay_ms.max(0) as u64);
        let events = self.events.clone();
        let tasks = self.tasks.clone();
        let key = task.key.clone();
        let due = task.clone();

        // Held across the spawn so a zero-delay task cannot fire before it is registered.
        let mut map = lock(&self.tasks);
        let handle = rt.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = lock(&tasks);
                // A replacement enqueued under the same key owns the slot now.
                if map.get(&key).is_some_and(|q| q.generation == generation) {
                    map.remove(&key);
                }
            }
            if events.send(PlatformEvent::DeferredTaskDue(due)).await.is_err() {
                log::warn!("Engine stopped before task '{}' could run", key);
            }
        });

        let queued = QueuedTask {
            generation,
            task,
            handle,
        };
        if let Some(previous) = map.insert(queued.task.key.clone(), queued) {
            previous.handle.abort();
        }
        Ok(())
    }

    fn cancel_by_key(&self, key: &str) -> PortResult {
        self.cancel_where(|q| q.task.key == key);
        Ok(())
    }

    fn cancel_by_tag(&self, tag: &str) -> PortResult {
        self.cancel_where(|q| q.task.has_tag(tag));
        Ok(())
    }

    fn cancel_all(&self) -> PortResult {
        self.cancel_where(|_| true);
        Ok(())
    }

    fn pending(&self) -> Vec<DeferredTask> {
        let mut out: Vec<_> = lock(&self.tasks).values().map(|q| q.task.clone()).collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

/// Desktop notifications through the session's notification daemon.
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl NotificationPoster for DesktopNotifier {
    fn post(&self, notification: &AlarmNotification) -> PortResult {
        log::info!("[notification] {}: {}", notification.title, notification.body);
        if !self.enabled {
            return Ok(());
        }

        let summary = notification.title.clone();
        let body = notification.body.clone();
        let timeout = match notification.priority {
            NotificationPriority::Max => notify_rust::Timeout::Never,
            _ => notify_rust::Timeout::Default,
        };
        // The D-Bus round trip blocks; keep it off the runtime.
        std::thread::spawn(move || {
            if let Err(e) = Notification::new()
                .summary(&summary)
                .body(&body)
                .appname("DayCall")
                .timeout(timeout)
                .show()
            {
                log::warn!("Desktop notification failed: {}", e);
            }
        });
        Ok(())
    }

    fn cancel(&self, id: i64) -> PortResult {
        log::debug!("Notification {} withdrawn", id);
        Ok(())
    }
}

/// Stand-in for an audio service: rings the terminal bell and logs.
#[derive(Debug, Default)]
pub struct ConsoleAudio {
    playing: AtomicBool,
}

impl AudioService for ConsoleAudio {
    fn start(&self, payload: &TriggerPayload) -> PortResult {
        let source = payload.audio_file.as_deref().unwrap_or(&payload.sound);
        eprintln!("\x07");
        log::info!("Playing '{}' for alarm {}", source, payload.alarm_id);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> PortResult {
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

/// Desktops keep running while the daemon is up; wake locks are bookkeeping only.
#[derive(Debug, Default)]
pub struct NoopPower {
    next: AtomicU64,
}

impl PowerService for NoopPower {
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> PortResult<WakeLockId> {
        let id = WakeLockId(self.next.fetch_add(1, Ordering::SeqCst));
        log::debug!("Wake lock {:?} '{}' for {:?}", id, tag, timeout);
        Ok(id)
    }

    fn release_wake_lock(&self, id: WakeLockId) -> PortResult {
        log::debug!("Wake lock {:?} released", id);
        Ok(())
    }
}

/// Prints the ringing alarm to stdout.
#[derive(Debug, Default)]
pub struct ConsoleScreen;

impl RingingScreen for ConsoleScreen {
    fn launch(&self, payload: &TriggerPayload, style: LaunchStyle) -> PortResult {
        if style == LaunchStyle::Aggressive {
            println!(
                "⏰ {} [alarm {}] challenge: {} (dismiss with Ctrl-C)",
                payload.label, payload.alarm_id, payload.challenge
            );
        }
        Ok(())
    }

    fn is_device_locked(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct DesktopPermissions;

impl PermissionProbe for DesktopPermissions {
    fn exact_alarm_permission_granted(&self) -> bool {
        true
    }

    fn is_ignoring_battery_optimizations(&self) -> bool {
        true
    }
}
