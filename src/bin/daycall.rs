use anyhow::Result;
use daycall::cli::{self, Args, Command};
use daycall::config::Config;
use daycall::context::{AppContext, StandardContext};
use daycall::model::Alarm;
use daycall::platform::Platform;
use daycall::platform::desktop::{
    ConsoleAudio, ConsoleScreen, DesktopNotifier, DesktopPermissions, NoopPower, SystemClock,
    TokioTaskQueue, TokioTimerService,
};
use daycall::receiver::PlatformEvent;
use daycall::resolver;
use daycall::scheduler::ScheduleOutcome;
use daycall::store::AlarmStore;
use daycall::system::{self, EVENT_QUEUE_SIZE, Engine, EngineMessage};
use simplelog::{
    ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::env;
use std::fs::OpenOptions;
use std::sync::Arc;
use tokio::sync::mpsc;

fn init_logging(ctx: &dyn AppContext, config: &Config, verbose: bool, daemon: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config.log_level_filter()
    };
    let log_config = simplelog::Config::default();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if daemon
        && let Some(path) = ctx.get_log_path()
    {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => loggers.push(WriteLogger::new(level, log_config, file)),
            Err(e) => eprintln!("Could not open log file {}: {}", path.display(), e),
        }
    }

    // Only fails if a logger is already installed.
    let _ = CombinedLogger::init(loggers);
}

fn report(alarm: &Alarm, outcome: &ScheduleOutcome) {
    match outcome {
        ScheduleOutcome::Scheduled(triggers) => {
            println!("{}  ({} timer(s) armed)", alarm, triggers.len())
        }
        ScheduleOutcome::Disabled => println!("{}  (disabled)", alarm),
        ScheduleOutcome::PermissionDenied => {
            println!("{}  (NOT scheduled: exact alarms not permitted)", alarm)
        }
        ScheduleOutcome::Failed { armed, errors } => println!(
            "{}  ({} armed, {} failed: {})",
            alarm,
            armed.len(),
            errors.len(),
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw: Vec<String> = env::args().collect();
    let binary = raw.first().cloned().unwrap_or_else(|| "daycall".to_string());
    let Args {
        root,
        verbose,
        command,
    } = cli::parse_args(&raw)?;

    if command == Command::Help {
        cli::print_help(&binary);
        return Ok(());
    }

    let ctx: Arc<dyn AppContext> = Arc::new(StandardContext::new(root));
    let config = Config::load_or_default(ctx.as_ref())?;
    init_logging(ctx.as_ref(), &config, verbose, command == Command::Run);

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let clock = Arc::new(SystemClock);
    let tasks = Arc::new(TokioTaskQueue::new(event_tx.clone()));
    let platform = Platform {
        clock: clock.clone(),
        timers: Arc::new(TokioTimerService::new(event_tx.clone(), clock.clone())),
        tasks: tasks.clone(),
        notifier: Arc::new(DesktopNotifier::new(config.desktop_notifications)),
        audio: Arc::new(ConsoleAudio::default()),
        power: Arc::new(NoopPower::default()),
        screen: Arc::new(ConsoleScreen),
        permissions: Arc::new(DesktopPermissions),
    };
    let store = Arc::new(AlarmStore::open(ctx.as_ref())?);
    let engine = Engine::new(ctx.clone(), &config, store.clone(), platform);
    let service = engine.service.clone();

    match command {
        Command::Help => {}
        Command::List => {
            let alarms = store.alarms();
            if alarms.is_empty() {
                println!("No alarms. Add one with: {} add 07:00", binary);
            }
            for alarm in alarms {
                println!("{}", alarm);
            }
        }
        Command::Add(new) => {
            let mut alarm = Alarm::new(new.hour, new.minute).with_repeat(new.days);
            alarm.label = new.label;
            alarm.sound = new.sound.unwrap_or_else(|| config.default_sound.clone());
            alarm.challenge = new.challenge.unwrap_or(config.default_challenge);
            let (stored, outcome) = service.create_alarm(alarm)?;
            report(&stored, &outcome);
        }
        Command::Remove(id) => match service.delete_alarm(id)? {
            Some(alarm) => println!("Removed {}", alarm),
            None => println!("No alarm with id {}", id),
        },
        Command::Enable(id) => {
            let (stored, outcome) = service.set_enabled(id, true)?;
            report(&stored, &outcome);
        }
        Command::Disable(id) => {
            let (stored, outcome) = service.set_enabled(id, false)?;
            report(&stored, &outcome);
        }
        Command::Next => {
            let alarms = store.alarms();
            let now = chrono::Local::now().naive_local();
            match resolver::next_alarm(&alarms, now) {
                Some((alarm, at)) => {
                    let mins = (at - now).num_minutes();
                    println!(
                        "{} rings {} (in {}h {:02}m)",
                        alarm.display_label(),
                        at.format("%a %Y-%m-%d %H:%M"),
                        mins / 60,
                        mins % 60
                    );
                }
                None => println!("No enabled alarms."),
            }
        }
        Command::Status => {
            let status = engine.reliability.evaluate();
            println!("Reliability score: {:.0}%", status.score() * 100.0);
            println!(
                "Fully reliable:    {}",
                if status.is_fully_reliable() { "yes" } else { "no" }
            );
            for problem in status.problems() {
                println!("  - {}", problem);
            }
            if status.last_checked_ms > 0
                && let Some(at) = chrono::DateTime::from_timestamp_millis(status.last_checked_ms)
            {
                println!(
                    "Last check:        {}",
                    at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Backup(on) => {
            if on {
                let queued = service.enable_backup_system()?;
                println!("Backup triggers enabled ({} queued for this session).", queued);
            } else {
                service.disable_backup_system()?;
                println!("Backup triggers disabled.");
            }
        }
        Command::Cleanup => {
            let report = engine.cleanup.perform_full_cleanup();
            println!(
                "Swept {} disabled alarm(s), re-armed {} enabled alarm(s).",
                report.swept, report.rescheduled
            );
        }
        Command::Debug => print!("{}", engine.cleanup.debug_info()),
        Command::Run => {
            let (ui_tx, mut ui_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
            let handle = system::spawn_engine(
                engine.receiver.clone(),
                tasks,
                config.clone(),
                event_rx,
                Some(ui_tx),
            );

            // Nothing survives a restart on desktop: treat start-up like a boot.
            event_tx.send(PlatformEvent::BootCompleted).await?;
            engine.schedule_reliability_check(&config);
            let _watcher = system::spawn_store_watcher(
                store.clone(),
                event_tx.clone(),
                system::STORE_POLL_INTERVAL,
            );
            log::info!("DayCall daemon running with {} alarm(s)", store.len());

            loop {
                tokio::select! {
                    msg = ui_rx.recv() => match msg {
                        Some(EngineMessage::Ringing(report)) => {
                            if report.failures() > 0 {
                                log::warn!("Alarm {} rang with {} failed step(s)", report.alarm_id, report.failures());
                            }
                        }
                        Some(EngineMessage::Rescheduled(n)) => log::info!("{} alarm(s) armed", n),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        if let Some(id) = engine.session.current() {
                            event_tx.send(PlatformEvent::Dismiss(id)).await?;
                            println!("Alarm {} dismissed. Press Ctrl-C again to quit.", id);
                            continue;
                        }
                        event_tx.send(PlatformEvent::Shutdown).await?;
                        break;
                    }
                }
            }
            handle.await?;
        }
    }

    Ok(())
}
