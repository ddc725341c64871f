// Tests for the reliability evaluator and the state it keeps on disk.
use chrono::NaiveDate;
use daycall::backup::set_backup_enabled;
use daycall::context::{AppContext, StandardContext, TestContext};
use daycall::error::WorkResult;
use daycall::platform::memory::MemoryPlatform;
use daycall::reliability::{ReliabilityEvaluator, ReliabilityState};
use serial_test::serial;
use std::sync::Arc;

fn evaluator(ctx: Arc<dyn AppContext>) -> (MemoryPlatform, ReliabilityEvaluator) {
    let now = NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap();
    let mem = MemoryPlatform::new(now);
    let eval = ReliabilityEvaluator::new(mem.permissions.clone(), mem.timers.clone(), ctx);
    (mem, eval)
}

#[test]
fn test_fresh_install_is_nearly_reliable() {
    let (_mem, eval) = evaluator(Arc::new(TestContext::new()));
    let status = eval.evaluate();

    assert!(status.exact_alarm_permission);
    assert!(status.battery_optimization_disabled);
    assert!(!status.backup_alarms_enabled);
    assert!(!status.is_fully_reliable());
    assert!((status.score() - 0.9).abs() < 1e-9);
    assert_eq!(status.last_checked_ms, 0);
}

#[test]
fn test_flags_are_read_live() {
    let ctx: Arc<dyn AppContext> = Arc::new(TestContext::new());
    let (mem, eval) = evaluator(ctx.clone());

    set_backup_enabled(ctx.as_ref(), true).unwrap();
    assert!(eval.evaluate().is_fully_reliable());
    assert!((eval.evaluate().score() - 1.0).abs() < 1e-9);

    mem.permissions.set_battery_exempt(false);
    let status = eval.evaluate();
    assert!(!status.battery_optimization_disabled);
    assert!(status.is_battery_optimized);
    assert!((status.score() - 0.6).abs() < 1e-9);
    assert_eq!(status.problems().len(), 2);

    mem.timers.set_permitted(false);
    mem.permissions.set_exact_alarm(false);
    let status = eval.evaluate();
    assert!(!status.can_schedule_exact_alarms);
    assert!(!eval.permission_status().all_granted());
    assert!((status.score() - 0.1).abs() < 1e-9);
}

#[test]
fn test_run_check_records_its_time() {
    let ctx: Arc<dyn AppContext> = Arc::new(TestContext::new());
    let (mem, eval) = evaluator(ctx.clone());
    mem.permissions.set_exact_alarm(false);

    assert_eq!(eval.run_check(1_741_590_000_000), WorkResult::Success);

    assert_eq!(
        ReliabilityState::load(ctx.as_ref()).last_checked_ms,
        1_741_590_000_000
    );
    assert_eq!(eval.evaluate().last_checked_ms, 1_741_590_000_000);
}

#[test]
#[serial]
fn test_state_survives_process_restart() {
    let root = std::env::temp_dir().join(format!("daycall_restart_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);

    {
        let ctx: Arc<dyn AppContext> = Arc::new(StandardContext::new(Some(root.clone())));
        let (_mem, eval) = evaluator(ctx.clone());
        set_backup_enabled(ctx.as_ref(), true).unwrap();
        eval.run_check(42_000);
    }

    let ctx: Arc<dyn AppContext> = Arc::new(StandardContext::new(Some(root.clone())));
    let (_mem, eval) = evaluator(ctx);
    let status = eval.evaluate();

    let _ = std::fs::remove_dir_all(&root);
    assert!(status.backup_alarms_enabled);
    assert_eq!(status.last_checked_ms, 42_000);
}
