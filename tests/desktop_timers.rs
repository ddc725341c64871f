// Tests for the tokio-backed timers and task queue used by the daemon.
use chrono::NaiveDate;
use daycall::model::{Alarm, ScheduledTrigger, TriggerKey, TriggerPayload};
use daycall::platform::desktop::{TokioTaskQueue, TokioTimerService};
use daycall::platform::memory::FixedClock;
use daycall::ports::{Clock, DeferredTask, DeferredTaskService, DeferredWork, ExactTimerService};
use daycall::receiver::PlatformEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn clock() -> Arc<FixedClock> {
    let now = NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(7, 0, 0)
        .unwrap();
    Arc::new(FixedClock::new(now))
}

fn trigger(clock: &FixedClock, id: i64, secs: i64) -> ScheduledTrigger {
    let alarm = Alarm {
        id,
        ..Alarm::new(7, 0)
    };
    ScheduledTrigger {
        key: TriggerKey::OneShot(id),
        fire_at_ms: clock.now_millis() + secs * 1000,
        payload: TriggerPayload::for_alarm(&alarm, None),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timer_delivers_payload_when_due() {
    let clock = clock();
    let (tx, mut rx) = mpsc::channel(4);
    let timers = TokioTimerService::new(tx, clock.clone());

    timers.schedule(&trigger(&clock, 1, 60)).unwrap();
    assert_eq!(timers.armed_count(), 1);

    assert!(timeout(Duration::from_secs(59), rx.recv()).await.is_err());
    match rx.recv().await {
        Some(PlatformEvent::TimerFired(payload)) => assert_eq!(payload.alarm_id, 1),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_timer_never_fires() {
    let clock = clock();
    let (tx, mut rx) = mpsc::channel(4);
    let timers = TokioTimerService::new(tx, clock.clone());

    timers.schedule(&trigger(&clock, 2, 5)).unwrap();
    timers.cancel(TriggerKey::OneShot(2)).unwrap();

    assert!(timeout(Duration::from_secs(60), rx.recv()).await.is_err());
    assert_eq!(timers.armed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rescheduling_replaces_previous_timer() {
    let clock = clock();
    let (tx, mut rx) = mpsc::channel(4);
    let timers = TokioTimerService::new(tx, clock.clone());

    timers.schedule(&trigger(&clock, 3, 5)).unwrap();
    timers.schedule(&trigger(&clock, 3, 30)).unwrap();

    assert!(timeout(Duration::from_secs(20), rx.recv()).await.is_err());
    assert!(matches!(rx.recv().await, Some(PlatformEvent::TimerFired(_))));
    assert!(timeout(Duration::from_secs(60), rx.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_task_queue_delivers_and_forgets() {
    let (tx, mut rx) = mpsc::channel(4);
    let queue = TokioTaskQueue::new(tx);

    queue
        .enqueue(DeferredTask::new("check", 1_000, DeferredWork::ReliabilityCheck).tagged("periodic"))
        .unwrap();
    assert_eq!(queue.pending().len(), 1);

    match rx.recv().await {
        Some(PlatformEvent::DeferredTaskDue(task)) => assert_eq!(task.key, "check"),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(queue.pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_task_queue_cancel_by_tag_and_key() {
    let (tx, mut rx) = mpsc::channel(4);
    let queue = TokioTaskQueue::new(tx);

    for (key, tag) in [("a", "backup"), ("b", "backup"), ("c", "reminder")] {
        let task = DeferredTask::new(key, 10_000, DeferredWork::Reminder { alarm_id: 1 }).tagged(tag);
        queue.enqueue(task).unwrap();
    }

    queue.cancel_by_tag("backup").unwrap();
    let keys: Vec<_> = queue.pending().into_iter().map(|t| t.key).collect();
    assert_eq!(keys, vec!["c".to_string()]);

    queue.cancel_by_key("c").unwrap();
    assert!(queue.pending().is_empty());
    assert!(timeout(Duration::from_secs(60), rx.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_replaced_task_fires_once() {
    let (tx, mut rx) = mpsc::channel(4);
    let queue = TokioTaskQueue::new(tx);

    queue
        .enqueue(DeferredTask::new("r", 5_000, DeferredWork::Reminder { alarm_id: 1 }))
        .unwrap();
    queue
        .enqueue(DeferredTask::new("r", 20_000, DeferredWork::Reminder { alarm_id: 2 }))
        .unwrap();
    assert_eq!(queue.pending().len(), 1);

    match rx.recv().await {
        Some(PlatformEvent::DeferredTaskDue(task)) => {
            assert_eq!(task.work, DeferredWork::Reminder { alarm_id: 2 })
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(timeout(Duration::from_secs(60), rx.recv()).await.is_err());
}
