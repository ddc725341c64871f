// Persistent alarm store with a live-updating view.
//
// Any change to how Alarm serializes must bump ALARM_STORE_VERSION.
use crate::context::AppContext;
use crate::model::{Alarm, AlarmId};
use crate::storage::LocalStorage;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

const ALARM_STORE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Default)]
struct AlarmStoreData {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    next_id: AlarmId,
    alarms: Vec<Alarm>,
}

#[derive(Default, Clone)]
struct State {
    alarms: BTreeMap<AlarmId, Alarm>,
    next_id: AlarmId,
}

/// Alarm records keyed by id. Every mutation is written through to disk
/// (when file-backed) and broadcast to subscribers.
pub struct AlarmStore {
    path: Option<PathBuf>,
    state: Mutex<State>,
    tx: watch::Sender<Vec<Alarm>>,
}

impl AlarmStore {
    /// Opens (or creates) the store at the context's data directory.
    pub fn open(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_alarm_store_path()?;
        let data: AlarmStoreData = LocalStorage::read_json(&path)?.unwrap_or_default();

        if data.version > ALARM_STORE_VERSION {
            anyhow::bail!(
                "Alarm store '{}' has version {} but this build only knows version {}",
                path.display(),
                data.version,
                ALARM_STORE_VERSION
            );
        }

        let mut state = State::default();
        for mut alarm in data.alarms {
            alarm.normalize();
            state.alarms.insert(alarm.id, alarm);
        }
        let max_id = state.alarms.keys().max().copied().unwrap_or(0);
        state.next_id = data.next_id.max(max_id + 1).max(1);

        log::debug!(
            "Loaded {} alarms from {}",
            state.alarms.len(),
            path.display()
        );
        Ok(Self::with_state(Some(path), state))
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_state(
            None,
            State {
                alarms: BTreeMap::new(),
                next_id: 1,
            },
        )
    }

    fn with_state(path: Option<PathBuf>, state: State) -> Self {
        let (tx, _) = watch::channel(state.alarms.values().cloned().collect());
        Self {
            path,
            state: Mutex::new(state),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persists and publishes `next`, then makes it the current state.
    /// On a failed write `current` is left untouched.
    fn commit(&self, current: &mut State, next: State) -> Result<()> {
        let alarms: Vec<Alarm> = next.alarms.values().cloned().collect();
        if let Some(path) = &self.path {
            let data = AlarmStoreData {
                version: ALARM_STORE_VERSION,
                next_id: next.next_id,
                alarms: alarms.clone(),
            };
            LocalStorage::write_json(path, &data)?;
        }
        *current = next;
        self.tx.send_replace(alarms);
        Ok(())
    }

    /// Re-reads the backing file, picking up edits made by another process.
    /// Returns whether the alarm list changed.
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let data: AlarmStoreData = LocalStorage::read_json(path)?.unwrap_or_default();
        let mut alarms = BTreeMap::new();
        for mut alarm in data.alarms {
            alarm.normalize();
            alarms.insert(alarm.id, alarm);
        }

        let mut state = self.lock();
        if state.alarms == alarms {
            return Ok(false);
        }
        let max_id = alarms.keys().max().copied().unwrap_or(0);
        state.next_id = state.next_id.max(data.next_id).max(max_id + 1);
        state.alarms = alarms;
        self.tx.send_replace(state.alarms.values().cloned().collect());
        log::debug!("Alarm store reloaded from {}", path.display());
        Ok(true)
    }

    /// All alarms ordered by id.
    pub fn alarms(&self) -> Vec<Alarm> {
        self.lock().alarms.values().cloned().collect()
    }

    /// Live view of the alarm list; receives a new value after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Alarm>> {
        self.tx.subscribe()
    }

    pub fn get(&self, id: AlarmId) -> Option<Alarm> {
        self.lock().alarms.get(&id).cloned()
    }

    /// Stores a new alarm under a fresh id and returns the stored copy.
    pub fn insert(&self, mut alarm: Alarm) -> Result<Alarm> {
        let mut state = self.lock();
        let mut next = state.clone();
        alarm.id = next.next_id;
        alarm.normalize();
        next.next_id += 1;
        next.alarms.insert(alarm.id, alarm.clone());
        self.commit(&mut state, next)?;
        Ok(alarm)
    }

    /// Replaces an existing alarm. Fails if the id is unknown.
    pub fn update(&self, mut alarm: Alarm) -> Result<Alarm> {
        let mut state = self.lock();
        if !state.alarms.contains_key(&alarm.id) {
            anyhow::bail!("Alarm {} not found", alarm.id);
        }
        alarm.normalize();
        let mut next = state.clone();
        next.alarms.insert(alarm.id, alarm.clone());
        self.commit(&mut state, next)?;
        Ok(alarm)
    }

    /// Removes an alarm, returning it if it existed.
    pub fn delete(&self, id: AlarmId) -> Result<Option<Alarm>> {
        let mut state = self.lock();
        let mut next = state.clone();
        let removed = next.alarms.remove(&id);
        if removed.is_some() {
            self.commit(&mut state, next)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.lock().alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use crate::model::RepeatDays;

    #[test]
    fn test_ids_are_assigned_and_never_reused() {
        let store = AlarmStore::in_memory();
        let a = store.insert(Alarm::new(7, 0)).unwrap();
        let b = store.insert(Alarm::new(8, 0)).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        store.delete(b.id).unwrap();
        let c = store.insert(Alarm::new(9, 0)).unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn test_update_unknown_fails() {
        let store = AlarmStore::in_memory();
        let mut ghost = Alarm::new(7, 0);
        ghost.id = 42;
        assert!(store.update(ghost).is_err());
    }

    #[test]
    fn test_persists_across_open() {
        let ctx = TestContext::new();
        {
            let store = AlarmStore::open(&ctx).unwrap();
            store
                .insert(Alarm::new(6, 30).with_repeat(RepeatDays::from(0b11)))
                .unwrap();
            store.insert(Alarm::new(22, 15).with_label("Bed")).unwrap();
        }
        let store = AlarmStore::open(&ctx).unwrap();
        let alarms = store.alarms();
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].repeat_days.mask(), 0b11);
        assert_eq!(alarms[1].label.as_deref(), Some("Bed"));
        assert_eq!(store.insert(Alarm::new(1, 0)).unwrap().id, 3);
    }

    #[test]
    fn test_normalizes_hand_edited_records() {
        let ctx = TestContext::new();
        let path = ctx.get_alarm_store_path().unwrap();
        std::fs::write(
            &path,
            r#"{"version":1,"next_id":2,"alarms":[{"id":1,"hour":31,"minute":75}]}"#,
        )
        .unwrap();
        let store = AlarmStore::open(&ctx).unwrap();
        let a = store.get(1).unwrap();
        assert_eq!((a.hour, a.minute), (7, 15));
        assert!(a.enabled);
    }

    #[test]
    fn test_reload_sees_other_writer() {
        let ctx = TestContext::new();
        let ours = AlarmStore::open(&ctx).unwrap();
        assert!(!ours.reload().unwrap());

        let theirs = AlarmStore::open(&ctx).unwrap();
        theirs.insert(Alarm::new(5, 0)).unwrap();

        assert!(ours.reload().unwrap());
        assert_eq!(ours.len(), 1);
        assert_eq!(ours.insert(Alarm::new(6, 0)).unwrap().id, 2);
    }

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let ctx = TestContext::new();
        let store = AlarmStore::open(&ctx).unwrap();
        let kept = store.insert(Alarm::new(7, 0)).unwrap();
        let rx = store.subscribe();

        // A directory where the file should be makes the atomic rename fail.
        let path = ctx.get_alarm_store_path().unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(&path).unwrap();

        assert!(store.insert(Alarm::new(8, 0)).is_err());
        assert!(store.update(Alarm { hour: 9, ..kept.clone() }).is_err());
        assert!(store.delete(kept.id).is_err());

        assert_eq!(store.alarms(), vec![kept.clone()]);
        assert_eq!(rx.borrow().len(), 1);

        std::fs::remove_dir_all(&path).unwrap();
        let next = store.insert(Alarm::new(8, 0)).unwrap();
        assert_eq!(next.id, kept.id + 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let store = AlarmStore::in_memory();
        let rx = store.subscribe();
        assert!(rx.borrow().is_empty());
        store.insert(Alarm::new(7, 0)).unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
