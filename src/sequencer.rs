//! Turns one fired trigger into a ringing alarm.
//!
//! Each step is attempted regardless of how the previous ones went, since any
//! single mechanism (screen launch, audio service, notification) can be
//! blocked by the OS. Two delayed self-checks run afterwards on the tokio
//! runtime and repair what they can.
use crate::config::TriggerTimings;
use crate::error::PlatformError;
use crate::model::AlarmId;
use crate::model::TriggerPayload;
use crate::ports::{
    AlarmNotification, AudioService, LaunchStyle, NotificationPoster, NotificationPriority,
    PortResult, PowerService, RingingScreen,
};
use crate::ringing::RingingSession;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const WAKE_LOCK_TAG: &str = "daycall:alarm_trigger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    WakeDevice,
    StartAudio,
    LaunchActivity,
    PostNotification,
    ReleaseWakeLock,
    RelaunchCheck,
    AudioCheck,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::WakeDevice => "wake device",
            Step::StartAudio => "start audio",
            Step::LaunchActivity => "launch ringing screen",
            Step::PostNotification => "post notification",
            Step::ReleaseWakeLock => "release wake lock",
            Step::RelaunchCheck => "relaunch check",
            Step::AudioCheck => "audio check",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Nothing needed doing (device unlocked, audio still playing, alarm dismissed).
    Skipped,
    /// The primary attempt failed with this error and the fallback succeeded.
    Recovered(PlatformError),
    Failed(PlatformError),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerReport {
    pub alarm_id: AlarmId,
    pub steps: Vec<(Step, StepOutcome)>,
}

impl TriggerReport {
    fn new(alarm_id: AlarmId) -> Self {
        Self {
            alarm_id,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        if let StepOutcome::Failed(e) = &outcome {
            log::error!("Alarm {}: {} failed: {}", self.alarm_id, step, e);
        }
        self.steps.push((step, outcome));
    }

    /// Outcome of the first run of `step`, if it ran.
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|(_, o)| o.is_failure()).count()
    }

    /// True when the user has no way at all to notice the alarm.
    pub fn nothing_reached_user(&self) -> bool {
        [Step::StartAudio, Step::LaunchActivity, Step::PostNotification]
            .iter()
            .all(|s| self.outcome(*s).is_some_and(StepOutcome::is_failure))
    }
}

/// A trigger in flight: the immediate steps already ran, the delayed ones
/// are still pending on the runtime.
pub struct TriggerRun {
    pub report: TriggerReport,
    follow_ups: Vec<JoinHandle<(Step, StepOutcome)>>,
}

impl TriggerRun {
    /// Waits for the delayed steps and returns the complete report.
    pub async fn settle(self) -> TriggerReport {
        let mut report = self.report;
        for handle in self.follow_ups {
            match handle.await {
                Ok((step, outcome)) => report.record(step, outcome),
                Err(e) => log::warn!("Trigger follow-up task did not finish: {}", e),
            }
        }
        report
    }

    /// Lets the delayed steps run on their own.
    pub fn detach(self) -> TriggerReport {
        self.report
    }
}

struct Ports {
    power: Arc<dyn PowerService>,
    audio: Arc<dyn AudioService>,
    screen: Arc<dyn RingingScreen>,
    notifier: Arc<dyn NotificationPoster>,
    session: RingingSession,
    timings: TriggerTimings,
}

impl Ports {
    fn launch(&self, payload: &TriggerPayload) -> StepOutcome {
        match self.screen.launch(payload, LaunchStyle::Aggressive) {
            Ok(()) => StepOutcome::Done,
            Err(first) => {
                log::warn!(
                    "Aggressive launch failed for alarm {}: {}, trying minimal launch",
                    payload.alarm_id,
                    first
                );
                match self.screen.launch(payload, LaunchStyle::Minimal) {
                    Ok(()) => StepOutcome::Recovered(first),
                    Err(e) => StepOutcome::Failed(e),
                }
            }
        }
    }

    fn start_audio(&self, payload: &TriggerPayload) -> StepOutcome {
        outcome(self.audio.start(payload))
    }

    /// Still the alarm the user has to deal with?
    fn still_ringing(&self, alarm_id: AlarmId) -> bool {
        self.session.current() == Some(alarm_id)
    }
}

fn outcome(result: PortResult) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Done,
        Err(e) => StepOutcome::Failed(e),
    }
}

/// Notification shown while an alarm rings. Its id is the alarm id.
pub fn ringing_notification(payload: &TriggerPayload) -> AlarmNotification {
    AlarmNotification {
        id: payload.alarm_id,
        title: "Alarm".to_string(),
        body: payload.label.clone(),
        priority: NotificationPriority::Max,
        full_screen: true,
        ongoing: true,
    }
}

#[derive(Clone)]
pub struct TriggerFallbackSequencer {
    ports: Arc<Ports>,
}

impl TriggerFallbackSequencer {
    pub fn new(
        power: Arc<dyn PowerService>,
        audio: Arc<dyn AudioService>,
        screen: Arc<dyn RingingScreen>,
        notifier: Arc<dyn NotificationPoster>,
        session: RingingSession,
        timings: TriggerTimings,
    ) -> Self {
        Self {
            ports: Arc::new(Ports {
                power,
                audio,
                screen,
                notifier,
                session,
                timings,
            }),
        }
    }

    pub fn session(&self) -> &RingingSession {
        &self.ports.session
    }

    /// Runs the trigger sequence for `payload`. Must be called from within a
    /// tokio runtime; the delayed steps are spawned onto it.
    pub fn trigger(&self, payload: TriggerPayload) -> TriggerRun {
        let ports = &self.ports;
        let mut report = TriggerReport::new(payload.alarm_id);
        let mut follow_ups = Vec::new();

        log::info!(
            "Triggering alarm {} '{}'",
            payload.alarm_id,
            payload.label
        );

        match ports
            .power
            .acquire_wake_lock(WAKE_LOCK_TAG, ports.timings.wake_lock_timeout)
        {
            Ok(lock) => {
                report.record(Step::WakeDevice, StepOutcome::Done);
                let p = self.ports.clone();
                follow_ups.push(tokio::spawn(async move {
                    tokio::time::sleep(p.timings.wake_lock_release_after).await;
                    (
                        Step::ReleaseWakeLock,
                        outcome(p.power.release_wake_lock(lock)),
                    )
                }));
            }
            Err(e) => report.record(Step::WakeDevice, StepOutcome::Failed(e)),
        }

        // The session is marked even if audio fails: the alarm is in progress
        // and the audio check below will try again.
        report.record(Step::StartAudio, ports.start_audio(&payload));
        ports.session.start(payload.alarm_id);

        report.record(Step::LaunchActivity, ports.launch(&payload));

        report.record(
            Step::PostNotification,
            outcome(ports.notifier.post(&ringing_notification(&payload))),
        );

        if report.nothing_reached_user() {
            log::error!(
                "Alarm {} could not reach the user through any channel",
                payload.alarm_id
            );
        }

        let p = self.ports.clone();
        let relaunch_payload = payload.clone();
        follow_ups.push(tokio::spawn(async move {
            tokio::time::sleep(p.timings.relaunch_check_after).await;
            let result = if !p.still_ringing(relaunch_payload.alarm_id) {
                StepOutcome::Skipped
            } else if p.screen.is_device_locked() {
                log::debug!(
                    "Device still locked, relaunching alarm {}",
                    relaunch_payload.alarm_id
                );
                p.launch(&relaunch_payload)
            } else {
                StepOutcome::Skipped
            };
            (Step::RelaunchCheck, result)
        }));

        let p = self.ports.clone();
        follow_ups.push(tokio::spawn(async move {
            tokio::time::sleep(p.timings.audio_check_after).await;
            let result = if !p.still_ringing(payload.alarm_id) || p.audio.is_playing() {
                StepOutcome::Skipped
            } else {
                log::warn!("Audio not playing for alarm {}, restarting", payload.alarm_id);
                p.start_audio(&payload)
            };
            (Step::AudioCheck, result)
        }));

        TriggerRun { report, follow_ups }
    }

    /// The user dealt with the ringing alarm. Returns false if `alarm_id`
    /// was not the one sounding.
    pub fn dismiss(&self, alarm_id: AlarmId) -> bool {
        let ports = &self.ports;
        if ports.session.current() != Some(alarm_id) {
            log::debug!("Dismiss for alarm {} ignored, it is not ringing", alarm_id);
            return false;
        }

        if let Err(e) = ports.audio.stop() {
            log::warn!("Failed to stop audio for alarm {}: {}", alarm_id, e);
        }
        ports.session.clear();
        if let Err(e) = ports.notifier.cancel(alarm_id) {
            log::warn!("Failed to cancel notification for alarm {}: {}", alarm_id, e);
        }
        log::info!("Alarm {} dismissed", alarm_id);
        true
    }
}
