//! Reliability diagnostics: how likely is an alarm to actually ring?
//!
//! The score is a weighted sum of permission and capability flags and is
//! meant for display only. Nothing in the engine branches on it.
use crate::config::Config;
use crate::context::AppContext;
use crate::error::WorkResult;
use crate::ports::{ExactTimerService, PermissionProbe};
use crate::storage::LocalStorage;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const RELIABILITY_CHECK_TAG: &str = "reliability_check";

pub const WEIGHT_EXACT_ALARM_PERMISSION: f64 = 0.3;
pub const WEIGHT_BATTERY_EXEMPTION: f64 = 0.3;
pub const WEIGHT_CAN_SCHEDULE_EXACT: f64 = 0.2;
pub const WEIGHT_NOT_BATTERY_OPTIMIZED: f64 = 0.1;
pub const WEIGHT_BACKUP_ENABLED: f64 = 0.1;

/// Snapshot of the flags that decide whether alarms can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReliabilityStatus {
    pub exact_alarm_permission: bool,
    pub battery_optimization_disabled: bool,
    pub can_schedule_exact_alarms: bool,
    pub is_battery_optimized: bool,
    pub backup_alarms_enabled: bool,
    /// Epoch millis of the last periodic check, 0 if none ran yet.
    pub last_checked_ms: i64,
}

impl ReliabilityStatus {
    pub fn is_fully_reliable(&self) -> bool {
        self.exact_alarm_permission
            && self.battery_optimization_disabled
            && self.can_schedule_exact_alarms
            && !self.is_battery_optimized
            && self.backup_alarms_enabled
    }

    /// Weighted score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        let mut score = 0.0;
        if self.exact_alarm_permission {
            score += WEIGHT_EXACT_ALARM_PERMISSION;
        }
        if self.battery_optimization_disabled {
            score += WEIGHT_BATTERY_EXEMPTION;
        }
        if self.can_schedule_exact_alarms {
            score += WEIGHT_CAN_SCHEDULE_EXACT;
        }
        if !self.is_battery_optimized {
            score += WEIGHT_NOT_BATTERY_OPTIMIZED;
        }
        if self.backup_alarms_enabled {
            score += WEIGHT_BACKUP_ENABLED;
        }
        score.clamp(0.0, 1.0)
    }

    /// Human-readable list of what is holding the score down.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.exact_alarm_permission {
            out.push("Exact alarm permission not granted");
        }
        if !self.battery_optimization_disabled {
            out.push("Battery optimization exemption not granted");
        }
        if !self.can_schedule_exact_alarms {
            out.push("System refuses exact alarms");
        }
        if self.is_battery_optimized {
            out.push("App is battery optimized, alarms may be delayed");
        }
        if !self.backup_alarms_enabled {
            out.push("Backup alarms disabled");
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionStatus {
    pub exact_alarm_granted: bool,
    pub battery_optimization_disabled: bool,
}

impl PermissionStatus {
    pub fn all_granted(&self) -> bool {
        self.exact_alarm_granted && self.battery_optimization_disabled
    }
}

/// Bookkeeping persisted between checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityState {
    #[serde(default)]
    pub last_checked_ms: i64,
}

impl ReliabilityState {
    pub fn load(ctx: &dyn AppContext) -> Self {
        ctx.get_reliability_state_path()
            .and_then(|p| LocalStorage::read_json(&p).ok().flatten())
            .unwrap_or_default()
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx
            .get_reliability_state_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine reliability state path"))?;
        LocalStorage::write_json(&path, self)
    }
}

pub struct ReliabilityEvaluator {
    permissions: Arc<dyn PermissionProbe>,
    timers: Arc<dyn ExactTimerService>,
    ctx: Arc<dyn AppContext>,
}

impl ReliabilityEvaluator {
    pub fn new(
        permissions: Arc<dyn PermissionProbe>,
        timers: Arc<dyn ExactTimerService>,
        ctx: Arc<dyn AppContext>,
    ) -> Self {
        Self {
            permissions,
            timers,
            ctx,
        }
    }

    pub fn permission_status(&self) -> PermissionStatus {
        PermissionStatus {
            exact_alarm_granted: self.permissions.exact_alarm_permission_granted(),
            battery_optimization_disabled: self.permissions.is_ignoring_battery_optimizations(),
        }
    }

    /// Reads every flag afresh. No caching, no side effects.
    pub fn evaluate(&self) -> ReliabilityStatus {
        let permissions = self.permission_status();
        let backup_alarms_enabled = match Config::load_or_default(self.ctx.as_ref()) {
            Ok(cfg) => cfg.backup_alarms_enabled,
            Err(e) => {
                log::warn!("Could not read backup preference: {}", e);
                false
            }
        };

        ReliabilityStatus {
            exact_alarm_permission: permissions.exact_alarm_granted,
            battery_optimization_disabled: permissions.battery_optimization_disabled,
            can_schedule_exact_alarms: self.timers.can_schedule_exact(),
            is_battery_optimized: !permissions.battery_optimization_disabled,
            backup_alarms_enabled,
            last_checked_ms: ReliabilityState::load(self.ctx.as_ref()).last_checked_ms,
        }
    }

    /// Periodic check: records the check time and logs a degraded status.
    /// Never reschedules anything.
    pub fn run_check(&self, now_ms: i64) -> WorkResult {
        let status = self.evaluate();

        let state = ReliabilityState {
            last_checked_ms: now_ms,
        };
        if let Err(e) = state.save(self.ctx.as_ref()) {
            log::error!("Reliability check failed to record its run: {}", e);
            return WorkResult::Retry;
        }

        if !status.is_fully_reliable() {
            log::warn!(
                "Alarm reliability compromised, score {:.2}: {}",
                status.score(),
                status.problems().join("; ")
            );
        }
        log::debug!("Reliability check completed, score {:.2}", status.score());
        WorkResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_true() -> ReliabilityStatus {
        ReliabilityStatus {
            exact_alarm_permission: true,
            battery_optimization_disabled: true,
            can_schedule_exact_alarms: true,
            is_battery_optimized: false,
            backup_alarms_enabled: true,
            last_checked_ms: 0,
        }
    }

    #[test]
    fn test_all_good_scores_one() {
        let s = all_true();
        assert!((s.score() - 1.0).abs() < 1e-9);
        assert!(s.is_fully_reliable());
        assert!(s.problems().is_empty());
    }

    #[test]
    fn test_each_flag_costs_its_weight() {
        let cases: [(fn(&mut ReliabilityStatus), f64); 5] = [
            (|s| s.exact_alarm_permission = false, 0.3),
            (|s| s.battery_optimization_disabled = false, 0.3),
            (|s| s.can_schedule_exact_alarms = false, 0.2),
            (|s| s.is_battery_optimized = true, 0.1),
            (|s| s.backup_alarms_enabled = false, 0.1),
        ];
        for (flip, weight) in cases {
            let mut s = all_true();
            flip(&mut s);
            assert!((1.0 - s.score() - weight).abs() < 1e-9);
            assert!(!s.is_fully_reliable());
            assert_eq!(s.problems().len(), 1);
        }
    }

    #[test]
    fn test_nothing_granted_scores_zero() {
        let s = ReliabilityStatus {
            exact_alarm_permission: false,
            battery_optimization_disabled: false,
            can_schedule_exact_alarms: false,
            is_battery_optimized: true,
            backup_alarms_enabled: false,
            last_checked_ms: 0,
        };
        assert_eq!(s.score(), 0.0);
    }
}
