// Handles configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::model::ChallengeType;
use crate::storage::LocalStorage;
use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

fn default_true() -> bool {
    true
}
fn default_reminder_lead() -> u32 {
    15
}
fn default_wake_lock_secs() -> u64 {
    30
}
fn default_wake_lock_release_secs() -> u64 {
    25
}
fn default_relaunch_check_secs() -> u64 {
    5
}
fn default_audio_check_secs() -> u64 {
    10
}
fn default_reliability_interval() -> u32 {
    15
}
fn default_sound() -> String {
    crate::model::DEFAULT_SOUND.to_string()
}
fn default_retry_backoff_secs() -> u64 {
    30
}
fn default_max_task_retries() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Opt-in second trigger path through the deferred task queue.
    #[serde(default)]
    pub backup_alarms_enabled: bool,

    #[serde(default = "default_reminder_lead")]
    pub reminder_lead_mins: u32,

    #[serde(default = "default_wake_lock_secs")]
    pub wake_lock_secs: u64,
    #[serde(default = "default_wake_lock_release_secs")]
    pub wake_lock_release_secs: u64,
    #[serde(default = "default_relaunch_check_secs")]
    pub relaunch_check_secs: u64,
    #[serde(default = "default_audio_check_secs")]
    pub audio_check_secs: u64,

    #[serde(default = "default_reliability_interval")]
    pub reliability_check_interval_mins: u32,

    #[serde(default = "default_sound")]
    pub default_sound: String,
    #[serde(default)]
    pub default_challenge: ChallengeType,

    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub desktop_notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_alarms_enabled: false,
            reminder_lead_mins: 15,
            wake_lock_secs: 30,
            wake_lock_release_secs: 25,
            relaunch_check_secs: 5,
            audio_check_secs: 10,
            reliability_check_interval_mins: 15,
            default_sound: default_sound(),
            default_challenge: ChallengeType::default(),
            retry_backoff_secs: 30,
            max_task_retries: 3,
            log_level: "info".to_string(),
            desktop_notifications: true,
        }
    }
}

/// Delays used by the trigger sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTimings {
    pub wake_lock_timeout: Duration,
    pub wake_lock_release_after: Duration,
    pub relaunch_check_after: Duration,
    pub audio_check_after: Duration,
}

impl Default for TriggerTimings {
    fn default() -> Self {
        Config::default().trigger_timings()
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Loads the config, falling back to defaults when the file is absent.
    /// Parse errors are still reported.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(c) => Ok(c),
            Err(e) if Self::is_missing_config_error(&e) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Whether an error returned by `load` means the file was simply missing.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn reminder_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reminder_lead_mins as i64)
    }

    pub fn trigger_timings(&self) -> TriggerTimings {
        TriggerTimings {
            wake_lock_timeout: Duration::from_secs(self.wake_lock_secs),
            wake_lock_release_after: Duration::from_secs(
                self.wake_lock_release_secs.min(self.wake_lock_secs),
            ),
            relaunch_check_after: Duration::from_secs(self.relaunch_check_secs),
            audio_check_after: Duration::from_secs(self.audio_check_secs),
        }
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;

    #[test]
    fn test_missing_file_detected() {
        let ctx = TestContext::new();
        let err = Config::load(&ctx).unwrap_err();
        assert!(Config::is_missing_config_error(&err));
        assert_eq!(Config::load_or_default(&ctx).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let ctx = TestContext::new();
        let path = ctx.get_config_file_path().unwrap();
        fs::write(&path, "backup_alarms_enabled = true\nreminder_lead_mins = 5\n").unwrap();

        let cfg = Config::load(&ctx).unwrap();
        assert!(cfg.backup_alarms_enabled);
        assert_eq!(cfg.reminder_lead_mins, 5);
        assert_eq!(cfg.wake_lock_secs, 30);
        assert_eq!(cfg.default_challenge, ChallengeType::Math);
    }

    #[test]
    fn test_save_roundtrip() {
        let ctx = TestContext::new();
        let cfg = Config {
            backup_alarms_enabled: true,
            default_challenge: ChallengeType::Typing,
            ..Config::default()
        };
        cfg.save(&ctx).unwrap();
        assert_eq!(Config::load(&ctx).unwrap(), cfg);
    }

    #[test]
    fn test_bad_toml_is_not_missing() {
        let ctx = TestContext::new();
        fs::write(ctx.get_config_file_path().unwrap(), "reminder_lead_mins = \"x\"").unwrap();
        let err = Config::load_or_default(&ctx).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_release_never_after_timeout() {
        let cfg = Config {
            wake_lock_secs: 10,
            wake_lock_release_secs: 25,
            ..Config::default()
        };
        assert_eq!(
            cfg.trigger_timings().wake_lock_release_after,
            Duration::from_secs(10)
        );
    }
}
