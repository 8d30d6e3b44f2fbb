use crate::error::{EngineError, Result};
use crate::model::PlaybackSnapshot;
use crate::scheduler::{Scheduler, TaskId, TimerKind, TimerSlot};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MAX_SNAPSHOT_AGE_MS: i64 = 24 * 60 * 60 * 1_000;
pub const MIN_RESUME_SECONDS: f64 = 5.0;

const SNAPSHOT_KEY: &str = "playback_state";
const VOLUME_KEY: &str = "volume";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

pub fn user_key(name: &str, user: &str) -> String {
    format!("{name}_{user}")
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file}.json"))
    }
}

impl KeyValueStore for JsonDirStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        if let Err(err) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(EngineError::Store(format!(
                "failed to commit {}: {err}",
                path.display()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestorePlan {
    pub snapshot: PlaybackSnapshot,
    pub resume_at: Option<f64>,
}

#[derive(Debug)]
pub struct PersistenceManager {
    user: String,
    timer: TimerSlot,
    interval: Duration,
}

impl PersistenceManager {
    pub fn new(user: &str, interval: Duration) -> Self {
        Self {
            user: user.to_string(),
            timer: TimerSlot::new(),
            interval,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn set_user(&mut self, user: &str) {
        self.user = user.to_string();
    }

    pub fn snapshot_key(&self) -> String {
        user_key(SNAPSHOT_KEY, &self.user)
    }

    pub fn volume_key(&self) -> String {
        user_key(VOLUME_KEY, &self.user)
    }

    pub fn start_periodic(&mut self, scheduler: &mut Scheduler) {
        self.timer
            .arm(scheduler, TimerKind::SnapshotSave, self.interval);
    }

    pub fn stop_periodic(&mut self, scheduler: &mut Scheduler) {
        self.timer.cancel(scheduler);
    }

    pub fn owns(&self, id: TaskId) -> bool {
        self.timer.owns(id)
    }

    pub fn save(&self, store: &mut dyn KeyValueStore, snapshot: &PlaybackSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        store.set(&self.snapshot_key(), &json)
    }

    pub fn load(&self, store: &dyn KeyValueStore) -> Result<Option<PlaybackSnapshot>> {
        let Some(raw) = store.get(&self.snapshot_key())? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&raw)
            .map_err(|err| EngineError::Snapshot(format!("unreadable snapshot: {err}")))?;
        Ok(Some(snapshot))
    }

    pub fn restorable(&self, store: &dyn KeyValueStore, now_ms: i64) -> Option<RestorePlan> {
        let snapshot = match self.load(store) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(user = %self.user, "ignoring saved playback state: {err}");
                return None;
            }
        };

        let age = now_ms.saturating_sub(snapshot.timestamp);
        if age > MAX_SNAPSHOT_AGE_MS {
            tracing::info!(user = %self.user, age_ms = age, "saved playback state expired");
            return None;
        }

        let resume_at = (snapshot.current_index.is_some()
            && snapshot.current_time.is_finite()
            && snapshot.current_time >= MIN_RESUME_SECONDS)
            .then_some(snapshot.current_time);
        Some(RestorePlan {
            snapshot,
            resume_at,
        })
    }

    pub fn load_volume(&self, store: &dyn KeyValueStore) -> Option<f32> {
        let raw = match store.get(&self.volume_key()) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(user = %self.user, "failed to read saved volume: {err}");
                return None;
            }
        };
        raw.trim()
            .parse::<f32>()
            .ok()
            .filter(|volume| volume.is_finite())
            .map(|volume| volume.clamp(0.0, 1.0))
    }

    pub fn save_volume(&self, store: &mut dyn KeyValueStore, volume: f32) -> Result<()> {
        store.set(&self.volume_key(), &volume.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepeatMode;
    use crate::queue::tests::track;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_000_000_000;
    const HOUR_MS: i64 = 60 * 60 * 1_000;

    fn snapshot(timestamp: i64, current_time: f64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            queue: vec![track("a"), track("b")],
            original_queue: vec![track("a"), track("b")],
            current_index: Some(1),
            current_time,
            is_shuffled: false,
            repeat_mode: RepeatMode::All,
            timestamp,
        }
    }

    #[test]
    fn fresh_snapshot_is_restored_with_resume_position() {
        let mut store = MemoryStore::new();
        let manager = PersistenceManager::new("alice", Duration::from_secs(10));
        manager
            .save(&mut store, &snapshot(NOW - HOUR_MS, 42.0))
            .expect("save");

        let plan = manager.restorable(&store, NOW).expect("restorable");
        assert_eq!(plan.resume_at, Some(42.0));
        assert_eq!(plan.snapshot.repeat_mode, RepeatMode::All);
    }

    #[test]
    fn expired_snapshot_is_discarded() {
        let mut store = MemoryStore::new();
        let manager = PersistenceManager::new("alice", Duration::from_secs(10));
        manager
            .save(&mut store, &snapshot(NOW - 25 * HOUR_MS, 42.0))
            .expect("save");

        assert_eq!(manager.restorable(&store, NOW), None);
    }

    #[test]
    fn short_positions_are_not_resumed() {
        let mut store = MemoryStore::new();
        let manager = PersistenceManager::new("alice", Duration::from_secs(10));
        manager
            .save(&mut store, &snapshot(NOW, 4.9))
            .expect("save");

        let plan = manager.restorable(&store, NOW).expect("restorable");
        assert_eq!(plan.resume_at, None);
    }

    #[test]
    fn corrupt_snapshot_counts_as_absent() {
        let mut store = MemoryStore::new();
        let manager = PersistenceManager::new("alice", Duration::from_secs(10));
        store
            .set(&manager.snapshot_key(), "{not json")
            .expect("set");

        assert_eq!(manager.restorable(&store, NOW), None);
        assert!(manager.load(&store).is_err());
    }

    #[test]
    fn snapshots_are_namespaced_per_user() {
        let mut store = MemoryStore::new();
        let alice = PersistenceManager::new("alice", Duration::from_secs(10));
        let bob = PersistenceManager::new("bob", Duration::from_secs(10));
        alice.save(&mut store, &snapshot(NOW, 10.0)).expect("save");

        assert!(alice.restorable(&store, NOW).is_some());
        assert!(bob.restorable(&store, NOW).is_none());
        assert_eq!(store.keys(), vec![String::from("playback_state_alice")]);
    }

    #[test]
    fn json_dir_store_round_trips_values() {
        let dir = tempdir().expect("tempdir");
        let mut store = JsonDirStore::new(dir.path().join("store"));

        assert_eq!(store.get("volume_a/b").expect("get"), None);
        store.set("volume_a/b", "0.5").expect("set");
        assert_eq!(store.get("volume_a/b").expect("get").as_deref(), Some("0.5"));
        assert!(dir.path().join("store").join("volume_a_b.json").exists());
    }

    #[test]
    fn json_dir_store_reports_failed_commit_and_cleans_staging() {
        let dir = tempdir().expect("tempdir");
        let blocked = dir.path().join("volume_alice.json");
        fs::create_dir_all(blocked.join("occupied")).expect("mkdir");
        let mut store = JsonDirStore::new(dir.path());

        let err = store.set("volume_alice", "0.5").expect_err("commit should fail");
        assert!(matches!(err, EngineError::Store(_)));
        assert!(!dir.path().join("volume_alice.json.tmp").exists());
    }

    #[test]
    fn volume_is_clamped_and_tolerates_garbage() {
        let mut store = MemoryStore::new();
        let manager = PersistenceManager::new("alice", Duration::from_secs(10));
        assert_eq!(manager.load_volume(&store), None);

        store.set(&manager.volume_key(), "banana").expect("set");
        assert_eq!(manager.load_volume(&store), None);

        manager.save_volume(&mut store, 3.0).expect("save");
        assert_eq!(manager.load_volume(&store), Some(1.0));
    }
}
