use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

pub const TASKS_KEY: &str = "todos";
pub const THEME_KEY: &str = "theme";

/// Durable string key/value storage local to the user's machine.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-process store, mostly for tests. `fail_writes` makes every `set` error.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes {
            return Err(anyhow!("storage quota exceeded"));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads the persisted task list. Never fails: missing, unreadable, or
/// malformed data yields an empty list, and records that do not decode are
/// dropped one by one.
#[tracing::instrument(skip(store))]
pub fn load_tasks(store: &dyn KeyValueStore) -> Vec<Task> {
    let raw = match store.get(TASKS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("no stored tasks");
            return vec![];
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed reading stored tasks; starting empty");
            return vec![];
        }
    };

    let records = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(records)) => records,
        Ok(other) => {
            warn!(kind = value_kind(&other), "stored tasks are not an array; starting empty");
            return vec![];
        }
        Err(err) => {
            warn!(error = %err, "stored tasks are not valid json; starting empty");
            return vec![];
        }
    };

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let mut task: Task = match serde_json::from_value(record) {
            Ok(task) => task,
            Err(err) => {
                warn!(index = idx, error = %err, "skipping undecodable task record");
                continue;
            }
        };

        if !seen.insert(task.id.clone()) {
            warn!(index = idx, id = %task.id, "skipping task with duplicate id");
            continue;
        }

        normalize_tags(&mut task.tags);
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks");
    out
}

/// Writes the full task list. Failures are logged and swallowed.
#[tracing::instrument(skip(store, tasks))]
pub fn save_tasks(store: &mut dyn KeyValueStore, tasks: &[Task]) {
    let payload = match serde_json::to_string(tasks) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed serializing tasks; not persisted");
            return;
        }
    };

    match store.set(TASKS_KEY, &payload) {
        Ok(()) => debug!(count = tasks.len(), "persisted tasks"),
        Err(err) => warn!(error = %format!("{err:#}"), "failed persisting tasks"),
    }
}

fn normalize_tags(tags: &mut Vec<String>) {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.drain(..) {
        let tag = tag.to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    *tags = out;
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sample_tasks() -> Vec<Task> {
        let mut pay = Task::from_input("Pay rent #bills", NaiveDate::from_ymd_opt(2026, 2, 1))
            .expect("task");
        pay.pinned = true;
        let mut call = Task::from_input("Call mum", None).expect("task");
        call.completed = true;
        vec![pay, call]
    }

    #[test]
    fn missing_key_loads_empty() {
        let store = MemoryStore::new();
        assert!(load_tasks(&store).is_empty());
    }

    #[test]
    fn corrupt_or_wrong_shape_loads_empty() {
        for raw in ["{not json", "{\"id\":\"x\"}", "42", "null", "\"todos\""] {
            let store = MemoryStore::with_entry(TASKS_KEY, raw);
            assert!(load_tasks(&store).is_empty(), "{raw:?} should load empty");
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = MemoryStore::new();
        let tasks = sample_tasks();
        save_tasks(&mut store, &tasks);
        let loaded = load_tasks(&store);
        assert_eq!(loaded, tasks);

        save_tasks(&mut store, &loaded);
        assert_eq!(load_tasks(&store), tasks);
    }

    #[test]
    fn legacy_records_fill_defaults_and_bad_records_are_skipped() {
        let raw = r#"[
            {"id":"a1","text":"old style","completed":false},
            {"id":"b2","text":"tagged","completed":true,"tags":["Work","work"],"pinned":true,"dueAt":"2026-05-01"},
            {"text":"no id"},
            {"id":"a1","text":"dup","completed":false},
            "junk"
        ]"#;
        let store = MemoryStore::with_entry(TASKS_KEY, raw);
        let loaded = load_tasks(&store);

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].text, "old style");
        assert!(loaded[0].tags.is_empty());
        assert!(!loaded[0].pinned);
        assert_eq!(loaded[1].tags, vec!["work".to_string()]);
        assert_eq!(loaded[1].due_at, NaiveDate::from_ymd_opt(2026, 5, 1));
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let raw = r#"[
            {"id":"a","text":"keep me","completed":false,"tags":null},
            {"id":"b","text":"me too","completed":null,"pinned":null,"dueAt":null}
        ]"#;
        let store = MemoryStore::with_entry(TASKS_KEY, raw);
        let loaded = load_tasks(&store);

        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].tags.is_empty());
        assert_eq!(loaded[1].text, "me too");
        assert!(!loaded[1].completed);
        assert!(!loaded[1].pinned);
        assert_eq!(loaded[1].due_at, None);
    }

    #[test]
    fn failed_write_is_swallowed() {
        let mut store = MemoryStore::new();
        store.fail_writes = true;
        save_tasks(&mut store, &sample_tasks());
        assert!(store.raw(TASKS_KEY).is_none());
    }
}
