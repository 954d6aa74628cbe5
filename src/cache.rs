//! # Response Cache
//!
//! Two tiers behind one contract: a process-lifetime in-memory map and a
//! persisted tier behind the [`PersistentStore`] key/value interface.
//! Reads check memory first, fall through to the store, and promote store
//! hits back into memory. Every read is age-checked; an expired entry is
//! deleted from both tiers rather than returned, with its payload parked
//! in a stale holdover that only [`ResponseCache::get_stale`] — the
//! stale-on-error path invoked after all live fetches failed — can reach.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Minimal key/value contract the persisted tier depends on. Any backing
/// store satisfying it is acceptable.
pub trait PersistentStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
    fn clear(&self);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    payload: String,
    written_at_ms: u64,
    max_age_ms: u64,
}

impl StoredEntry {
    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.written_at_ms) > self.max_age_ms
    }

    fn expired_against(&self, now_ms: u64, max_age: Duration) -> bool {
        now_ms.saturating_sub(self.written_at_ms) > max_age.as_millis() as u64
    }
}

#[derive(Default)]
struct MemoryTier {
    fresh: HashMap<String, StoredEntry>,
    /// Payloads evicted on expiry, kept for the stale-fallback read.
    holdover: HashMap<String, String>,
}

pub struct ResponseCache {
    memory: Mutex<MemoryTier>,
    store: Option<Arc<dyn PersistentStore>>,
    default_max_age: Duration,
}

impl ResponseCache {
    pub fn new(default_max_age: Duration, store: Option<Arc<dyn PersistentStore>>) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::default()),
            store,
            default_max_age,
        }
    }

    /// Memory-only cache, mostly for tests and one-shot runs.
    pub fn in_memory(default_max_age: Duration) -> Self {
        Self::new(default_max_age, None)
    }

    /// Age-checked read. `max_age_override` tightens or loosens the age
    /// window for this one lookup without touching the stored entry.
    pub fn get(&self, key: &str, max_age_override: Option<Duration>) -> Option<String> {
        let now = now_ms();
        let is_expired = |entry: &StoredEntry| match max_age_override {
            Some(age) => entry.expired_against(now, age),
            None => entry.expired(now),
        };

        {
            let mut mem = self.memory.lock().expect("cache mutex poisoned");
            if let Some(entry) = mem.fresh.get(key) {
                if !is_expired(entry) {
                    return Some(entry.payload.clone());
                }
                let evicted = mem.fresh.remove(key).expect("entry present");
                mem.holdover.insert(key.to_string(), evicted.payload);
                if let Some(store) = &self.store {
                    store.remove_item(key);
                }
                return None;
            }
        }

        // Memory miss: fall through to the persisted tier.
        let store = self.store.as_ref()?;
        let raw = store.get_item(key)?;
        let entry: StoredEntry = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(_) => {
                // Unreadable persisted entry is as good as absent.
                store.remove_item(key);
                return None;
            }
        };

        if is_expired(&entry) {
            store.remove_item(key);
            self.memory
                .lock()
                .expect("cache mutex poisoned")
                .holdover
                .insert(key.to_string(), entry.payload);
            return None;
        }

        // Promote into the memory tier.
        let payload = entry.payload.clone();
        self.memory
            .lock()
            .expect("cache mutex poisoned")
            .fresh
            .insert(key.to_string(), entry);
        Some(payload)
    }

    pub fn set(&self, key: &str, value: &str, max_age: Option<Duration>) {
        let entry = StoredEntry {
            payload: value.to_string(),
            written_at_ms: now_ms(),
            max_age_ms: max_age.unwrap_or(self.default_max_age).as_millis() as u64,
        };

        if let Some(store) = &self.store {
            if let Ok(raw) = serde_json::to_string(&entry) {
                store.set_item(key, &raw);
            }
        }
        let mut mem = self.memory.lock().expect("cache mutex poisoned");
        mem.holdover.remove(key);
        mem.fresh.insert(key.to_string(), entry);
    }

    pub fn invalidate(&self, key: &str) {
        let mut mem = self.memory.lock().expect("cache mutex poisoned");
        mem.fresh.remove(key);
        mem.holdover.remove(key);
        if let Some(store) = &self.store {
            store.remove_item(key);
        }
    }

    /// Bypass the age check entirely. Only the fetcher's stale-on-error
    /// path calls this, after every live strategy has failed.
    pub fn get_stale(&self, key: &str) -> Option<String> {
        {
            let mem = self.memory.lock().expect("cache mutex poisoned");
            if let Some(entry) = mem.fresh.get(key) {
                return Some(entry.payload.clone());
            }
            if let Some(payload) = mem.holdover.get(key) {
                return Some(payload.clone());
            }
        }
        let store = self.store.as_ref()?;
        let raw = store.get_item(key)?;
        serde_json::from_str::<StoredEntry>(&raw)
            .ok()
            .map(|e| e.payload)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// In-memory [`PersistentStore`], used in tests and as a null store.
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.map
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned()
    }
    fn set_item(&self, key: &str, value: &str) {
        self.map
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.to_string());
    }
    fn remove_item(&self, key: &str) {
        self.map.lock().expect("store mutex poisoned").remove(key);
    }
    fn clear(&self) {
        self.map.lock().expect("store mutex poisoned").clear();
    }
}

/// JSON-file-backed [`PersistentStore`]: one flat map serialized to disk
/// on every write. Survives process restart; best-effort on I/O errors.
pub struct FileStore {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    fn flush(&self, map: &HashMap<String, String>) {
        if let Ok(raw) = serde_json::to_string(map) {
            if let Err(e) = std::fs::write(&self.path, raw) {
                tracing::warn!(error = ?e, path = %self.path.display(), "cache store flush failed");
            }
        }
    }
}

impl PersistentStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.map
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned()
    }
    fn set_item(&self, key: &str, value: &str) {
        let mut map = self.map.lock().expect("store mutex poisoned");
        map.insert(key.to_string(), value.to_string());
        self.flush(&map);
    }
    fn remove_item(&self, key: &str) {
        let mut map = self.map.lock().expect("store mutex poisoned");
        map.remove(key);
        self.flush(&map);
    }
    fn clear(&self) {
        let mut map = self.map.lock().expect("store mutex poisoned");
        map.clear();
        self.flush(&map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_set_is_immediately_readable() {
        let cache = ResponseCache::in_memory(Duration::from_secs(60));
        cache.set("k", "v1", None);
        assert_eq!(cache.get("k", None), Some("v1".to_string()));
        cache.set("k", "v2", None);
        assert_eq!(cache.get("k", None), Some("v2".to_string()));
    }

    #[test]
    fn expired_entry_returns_none_but_stays_reachable_as_stale() {
        let cache = ResponseCache::in_memory(Duration::from_millis(10));
        cache.set("k", "v", None);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k", None), None);
        // Gone from the fresh tier for good...
        assert_eq!(cache.get("k", None), None);
        // ...but the stale-on-error path can still serve it.
        assert_eq!(cache.get_stale("k"), Some("v".to_string()));
    }

    #[test]
    fn fresh_write_clears_the_stale_holdover() {
        let cache = ResponseCache::in_memory(Duration::from_millis(10));
        cache.set("k", "old", None);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k", None), None);
        cache.set("k", "new", None);
        assert_eq!(cache.get("k", None), Some("new".to_string()));
        assert_eq!(cache.get_stale("k"), Some("new".to_string()));
    }

    #[test]
    fn override_tightens_the_window() {
        let cache = ResponseCache::in_memory(Duration::from_secs(60));
        cache.set("k", "v", None);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k", Some(Duration::from_millis(1))), None);
    }

    #[test]
    fn invalidate_removes_everything() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(Duration::from_secs(60), Some(store.clone()));
        cache.set("k", "v", None);
        cache.invalidate("k");
        assert_eq!(cache.get("k", None), None);
        assert_eq!(cache.get_stale("k"), None);
        assert_eq!(store.get_item("k"), None);
    }

    #[test]
    fn persisted_hit_is_promoted() {
        let store = Arc::new(MemoryStore::new());
        let writer = ResponseCache::new(Duration::from_secs(60), Some(store.clone()));
        writer.set("k", "persisted", None);

        // A second cache over the same store simulates a process restart.
        let reader = ResponseCache::new(Duration::from_secs(60), Some(store.clone()));
        assert_eq!(reader.get("k", None), Some("persisted".to_string()));

        // Now present in the reader's memory tier even if the store empties.
        store.clear();
        assert_eq!(reader.get("k", None), Some("persisted".to_string()));
    }

    #[test]
    fn corrupt_persisted_entry_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        store.set_item("k", "not json");
        let cache = ResponseCache::new(Duration::from_secs(60), Some(store.clone()));
        assert_eq!(cache.get("k", None), None);
        assert_eq!(store.get_item("k"), None);
    }
}
