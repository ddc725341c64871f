// Wires the engine together and runs its event loop.
use crate::backup::BackupTriggerPath;
use crate::cleanup::CleanupUtility;
use crate::config::Config;
use crate::context::AppContext;
use crate::error::WorkResult;
use crate::platform::Platform;
use crate::ports::{DeferredTask, DeferredTaskService, DeferredWork};
use crate::receiver::{AlarmReceiver, Handled, PlatformEvent};
use crate::reliability::{RELIABILITY_CHECK_TAG, ReliabilityEvaluator};
use crate::reminder::ReminderScheduler;
use crate::ringing::RingingSession;
use crate::scheduler::AlarmScheduler;
use crate::sequencer::{TriggerFallbackSequencer, TriggerReport};
use crate::service::AlarmService;
use crate::store::AlarmStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub const EVENT_QUEUE_SIZE: usize = 32;
pub const STORE_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum EngineMessage {
    /// An alarm started ringing; carries the immediate steps' report.
    Ringing(TriggerReport),
    Rescheduled(usize),
}

/// Every engine component, built once per process.
pub struct Engine {
    pub platform: Platform,
    pub session: RingingSession,
    pub sequencer: TriggerFallbackSequencer,
    pub service: Arc<AlarmService>,
    pub reliability: Arc<ReliabilityEvaluator>,
    pub receiver: Arc<AlarmReceiver>,
    pub cleanup: CleanupUtility,
}

impl Engine {
    pub fn new(
        ctx: Arc<dyn AppContext>,
        config: &Config,
        store: Arc<AlarmStore>,
        platform: Platform,
    ) -> Self {
        let session = RingingSession::new();
        let sequencer = TriggerFallbackSequencer::new(
            platform.power.clone(),
            platform.audio.clone(),
            platform.screen.clone(),
            platform.notifier.clone(),
            session.clone(),
            config.trigger_timings(),
        );
        let reminders = ReminderScheduler::new(
            platform.tasks.clone(),
            platform.clock.clone(),
            platform.notifier.clone(),
            config.reminder_lead(),
        );
        let scheduler =
            AlarmScheduler::new(platform.timers.clone(), platform.clock.clone(), reminders);
        let backup = BackupTriggerPath::new(
            platform.tasks.clone(),
            platform.clock.clone(),
            ctx.clone(),
            sequencer.clone(),
        );
        let service = Arc::new(AlarmService::new(ctx.clone(), store, scheduler, backup));
        let reliability = Arc::new(ReliabilityEvaluator::new(
            platform.permissions.clone(),
            platform.timers.clone(),
            ctx,
        ));
        let receiver = Arc::new(AlarmReceiver::new(
            service.clone(),
            sequencer.clone(),
            reliability.clone(),
            platform.clock.clone(),
        ));
        let cleanup = CleanupUtility::new(service.clone(), platform.tasks.clone());

        Self {
            platform,
            session,
            sequencer,
            service,
            reliability,
            receiver,
            cleanup,
        }
    }

    /// Queues the next periodic reliability check.
    pub fn schedule_reliability_check(&self, config: &Config) {
        schedule_reliability_check(self.platform.tasks.as_ref(), config);
    }
}

fn schedule_reliability_check(tasks: &dyn DeferredTaskService, config: &Config) {
    if let Err(e) = tasks.enqueue(reliability_check_task(config)) {
        log::warn!("Failed to schedule reliability check: {}", e);
    }
}

pub fn reliability_check_task(config: &Config) -> DeferredTask {
    let delay_ms = config.reliability_check_interval_mins.max(1) as i64 * 60_000;
    DeferredTask::new(RELIABILITY_CHECK_TAG, delay_ms, DeferredWork::ReliabilityCheck)
        .tagged(RELIABILITY_CHECK_TAG)
}

/// The host queue's retry policy: linear backoff, bounded attempts.
/// Returns `None` once the task has used up its retries.
pub fn retry_task(task: &DeferredTask, config: &Config) -> Option<DeferredTask> {
    let attempt = task.attempt + 1;
    if attempt > config.max_task_retries {
        return None;
    }
    let mut next = task.clone();
    next.attempt = attempt;
    next.delay_ms = (config.retry_backoff_secs * attempt as u64 * 1000) as i64;
    Some(next)
}

/// Spawns the engine loop. Events are handled one at a time, in order.
/// The loop ends on `PlatformEvent::Shutdown` or when every sender is gone.
pub fn spawn_engine(
    receiver: Arc<AlarmReceiver>,
    tasks: Arc<dyn DeferredTaskService>,
    config: Config,
    mut rx: mpsc::Receiver<PlatformEvent>,
    ui_sender: Option<mpsc::Sender<EngineMessage>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let due = match &event {
                PlatformEvent::DeferredTaskDue(task) => Some(task.clone()),
                _ => None,
            };

            let message = match receiver.handle(event) {
                Handled::Stop => {
                    log::info!("Engine shutting down");
                    break;
                }
                Handled::Ringing(run) => Some(EngineMessage::Ringing(run.detach())),
                Handled::Rescheduled(results) => Some(EngineMessage::Rescheduled(results.len())),
                Handled::Work(result) => {
                    if let Some(task) = due {
                        settle_task(tasks.as_ref(), &config, &task, result);
                    }
                    None
                }
                Handled::Ignored | Handled::Dismissed(_) => None,
            };

            if let (Some(msg), Some(ui_tx)) = (message, &ui_sender) {
                let _ = ui_tx.send(msg).await;
            }
        }
    })
}

fn settle_task(
    tasks: &dyn DeferredTaskService,
    config: &Config,
    task: &DeferredTask,
    result: WorkResult,
) {
    let finished = match result {
        WorkResult::Success => true,
        WorkResult::Failure => {
            log::error!("Task {} failed permanently", task.key);
            true
        }
        WorkResult::Retry => match retry_task(task, config) {
            Some(next) => {
                log::warn!(
                    "Task {} will be retried in {}s (attempt {})",
                    task.key,
                    next.delay_ms / 1000,
                    next.attempt + 1
                );
                if let Err(e) = tasks.enqueue(next) {
                    log::error!("Failed to requeue task {}: {}", task.key, e);
                }
                false
            }
            None => {
                log::error!("Task {} gave up after {} retries", task.key, task.attempt);
                true
            }
        },
    };

    if finished && task.work == DeferredWork::ReliabilityCheck {
        schedule_reliability_check(tasks, config);
    }
}

/// Polls the alarm file so edits made by the CLI reach a running daemon.
pub fn spawn_store_watcher(
    store: Arc<AlarmStore>,
    events: mpsc::Sender<PlatformEvent>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.reload() {
                Ok(true) => {
                    if events.send(PlatformEvent::StoreChanged).await.is_err() {
                        break;
                    }
                }
                Ok(false) => {}
                Err(e) => log::warn!("Failed to reload alarm store: {}", e),
            }
        }
    })
}
