//! Durable storage for store records.
//!
//! Each store owns one record, addressed by a fixed key and serialized as a
//! versioned JSON envelope `{ "state": ..., "version": N }`. A [`Persisted`]
//! container applies a mutation to a copy of the state, writes the copy, and
//! only then swaps it in and notifies subscribers. A failed write therefore
//! leaves memory untouched.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Version written into every envelope.
pub const RECORD_VERSION: u32 = 1;

/// Key-value medium holding serialized store records.
pub trait StateStorage {
    /// Read the raw record stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the record stored under `key`.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.record_path(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        // Write beside the target and rename so readers never see a torn file.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(key))
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// In-process storage, shared by handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.records
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.records()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.records()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// State owned by a store and persisted under a fixed key.
pub trait StoreState: Serialize + DeserializeOwned + Default + Clone {
    const KEY: &'static str;

    /// Repair invariants a loaded record may violate. Returns true if anything
    /// was changed.
    fn normalize(&mut self, _version: u32) -> bool {
        false
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, S> {
    state: &'a S,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope<S> {
    state: S,
    #[serde(default)]
    version: u32,
}

/// Serialize a state into its persisted envelope.
pub fn encode<S: Serialize>(state: &S) -> Result<String> {
    Ok(serde_json::to_string(&EnvelopeRef {
        state,
        version: RECORD_VERSION,
    })?)
}

/// Parse a persisted envelope, returning the state and its record version.
pub fn decode<S: DeserializeOwned>(raw: &str) -> Result<(S, u32)> {
    let envelope: Envelope<S> = serde_json::from_str(raw)?;
    Ok((envelope.state, envelope.version))
}

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<S> = Box<dyn Fn(&S)>;

/// In-memory state mirrored to a [`StateStorage`] on every commit.
pub struct Persisted<S: StoreState> {
    storage: Arc<dyn StateStorage>,
    state: S,
    listeners: Vec<(SubscriptionId, Listener<S>)>,
    next_subscription: u64,
}

impl<S: StoreState> Persisted<S> {
    /// Rehydrate from storage. Missing, unreadable or malformed records yield
    /// the default state; startup never fails.
    pub fn open(storage: Arc<dyn StateStorage>) -> Self {
        let state = match storage.read(S::KEY) {
            Ok(Some(raw)) => match decode::<S>(&raw) {
                Ok((mut state, version)) => {
                    if state.normalize(version) {
                        tracing::info!(key = S::KEY, version, "Repaired persisted state on load");
                    }
                    state
                }
                Err(err) => {
                    tracing::warn!(key = S::KEY, "Discarding malformed persisted state: {err}");
                    S::default()
                }
            },
            Ok(None) => S::default(),
            Err(err) => {
                tracing::warn!(key = S::KEY, "Failed to read persisted state: {err}");
                S::default()
            }
        };

        Self {
            storage,
            state,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Apply `mutation` to a copy of the state. `None` from the mutation
    /// means nothing changed: no write happens and no one is notified.
    pub fn update<R>(&mut self, mutation: impl FnOnce(&mut S) -> Option<R>) -> Result<Option<R>> {
        let mut next = self.state.clone();
        let Some(out) = mutation(&mut next) else {
            return Ok(None);
        };
        self.commit(next)?;
        Ok(Some(out))
    }

    /// Persist `next` and make it the current state.
    pub fn commit(&mut self, next: S) -> Result<()> {
        let raw = encode(&next)?;
        self.storage.write(S::KEY, &raw)?;
        self.state = next;
        for (_, listener) in &self.listeners {
            listener(&self.state);
        }
        Ok(())
    }

    pub fn subscribe(&mut self, listener: impl Fn(&S) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    impl StoreState for Counter {
        const KEY: &'static str = "counter";
    }

    struct FailingStorage;

    impl StateStorage for FailingStorage {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Storage("offline".into()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Storage("offline".into()))
        }
    }

    #[test]
    fn file_storage_missing_key_reads_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path());
        assert_eq!(storage.read("absent").expect("read"), None);
    }

    #[test]
    fn file_storage_write_then_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("nested"));
        storage.write("k", "{\"a\":1}").expect("write");
        storage.write("k", "{\"a\":2}").expect("overwrite");
        assert_eq!(storage.read("k").expect("read").as_deref(), Some("{\"a\":2}"));
        assert!(dir.path().join("nested").join("k.json").exists());
    }

    #[test]
    fn envelope_carries_version() {
        let raw = encode(&Counter { value: 3 }).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["version"], serde_json::json!(RECORD_VERSION));
        assert_eq!(value["state"]["value"], serde_json::json!(3));

        let (state, version) = decode::<Counter>(&raw).expect("decode");
        assert_eq!(state, Counter { value: 3 });
        assert_eq!(version, RECORD_VERSION);
    }

    #[test]
    fn envelope_without_version_is_version_zero() {
        let (_, version) = decode::<Counter>(r#"{"state":{"value":1}}"#).expect("decode");
        assert_eq!(version, 0);
    }

    #[test]
    fn open_discards_malformed_record() {
        let storage = MemoryStorage::new();
        storage.write("counter", "not json").expect("write");
        let persisted = Persisted::<Counter>::open(Arc::new(storage));
        assert_eq!(persisted.state(), &Counter::default());
    }

    #[test]
    fn open_survives_unreadable_storage() {
        let persisted = Persisted::<Counter>::open(Arc::new(FailingStorage));
        assert_eq!(persisted.state(), &Counter::default());
    }

    #[test]
    fn update_persists_and_notifies() {
        let storage = MemoryStorage::new();
        let mut persisted = Persisted::<Counter>::open(Arc::new(storage.clone()));
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        persisted.subscribe(move |state: &Counter| sink.set(state.value));

        persisted
            .update(|state| {
                state.value = 7;
                Some(())
            })
            .expect("update");

        assert_eq!(seen.get(), 7);
        let reopened = Persisted::<Counter>::open(Arc::new(storage));
        assert_eq!(reopened.state().value, 7);
    }

    #[test]
    fn noop_update_skips_write_and_listeners() {
        let storage = MemoryStorage::new();
        let mut persisted = Persisted::<Counter>::open(Arc::new(storage.clone()));
        let calls = Rc::new(Cell::new(0));
        let sink = Rc::clone(&calls);
        persisted.subscribe(move |_: &Counter| sink.set(sink.get() + 1));

        let out = persisted.update(|_| None::<()>).expect("update");
        assert!(out.is_none());
        assert_eq!(calls.get(), 0);
        assert_eq!(storage.read("counter").expect("read"), None);
    }

    #[test]
    fn failed_write_keeps_memory_unchanged() {
        let mut persisted = Persisted::<Counter>::open(Arc::new(FailingStorage));
        let result = persisted.update(|state| {
            state.value = 9;
            Some(())
        });
        assert!(result.is_err());
        assert_eq!(persisted.state().value, 0);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut persisted = Persisted::<Counter>::open(Arc::new(MemoryStorage::new()));
        let calls = Rc::new(Cell::new(0));
        let sink = Rc::clone(&calls);
        let id = persisted.subscribe(move |_: &Counter| sink.set(sink.get() + 1));

        assert!(persisted.unsubscribe(id));
        assert!(!persisted.unsubscribe(id));
        persisted.commit(Counter { value: 1 }).expect("commit");
        assert_eq!(calls.get(), 0);
    }
}
