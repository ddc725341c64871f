//! Implementations of the platform ports.
//!
//! `memory` records every call and is what the tests drive; `desktop` backs
//! the daemon with tokio timers and desktop notifications.
use crate::ports::{
    AudioService, Clock, DeferredTaskService, ExactTimerService, NotificationPoster,
    PermissionProbe, PowerService, RingingScreen,
};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod desktop;
pub mod memory;

/// One handle per port, shared by every engine component.
#[derive(Clone)]
pub struct Platform {
    pub clock: Arc<dyn Clock>,
    pub timers: Arc<dyn ExactTimerService>,
    pub tasks: Arc<dyn DeferredTaskService>,
    pub notifier: Arc<dyn NotificationPoster>,
    pub audio: Arc<dyn AudioService>,
    pub power: Arc<dyn PowerService>,
    pub screen: Arc<dyn RingingScreen>,
    pub permissions: Arc<dyn PermissionProbe>,
}

// A poisoned lock only means another thread panicked mid-update; the
// recorded data is still usable.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
