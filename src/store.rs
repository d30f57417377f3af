//! Durable key/value settings behind the rotation configuration.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const KEY_FOLDER: &str = "currentFolderPath";
pub const KEY_INTERVAL: &str = "intervalSeconds";
pub const KEY_TARGET_MODE: &str = "changeMode";
pub const KEY_PLACEMENT_MODE: &str = "wpCenterMode";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Int(i64),
    Text(String),
}

/// Key/value persistence. Writes are staged by `put` and made durable by `commit`.
pub trait ConfigStore: Send {
    fn get(&self, key: &str) -> Option<StoredValue>;
    fn put(&mut self, key: &str, value: StoredValue);
    fn commit(&mut self) -> Result<()>;

    fn get_text(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(StoredValue::Text(text)) => text,
            Some(other) => {
                warn!(key, value = ?other, "stored setting is not text; using default");
                default.to_string()
            }
            None => default.to_string(),
        }
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(StoredValue::Int(value)) => value,
            // Older writers stored numbers as strings.
            Some(StoredValue::Text(text)) => text.trim().parse().unwrap_or_else(|_| {
                warn!(key, value = %text, "stored setting is not an integer; using default");
                default
            }),
            None => default,
        }
    }
}

/// Volatile store, used when no settings file is wanted and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: StoredValue) {
        self.values.insert(key.to_string(), value);
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// JSON object on disk, replaced atomically on commit.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, StoredValue>,
    dirty: bool,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = read_json_optional(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: StoredValue) {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    fn commit(&mut self) -> Result<()> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        write_json_atomically(&self.path, &self.values, 0o600)?;
        self.dirty = false;
        debug!(path = %self.path.display(), "settings committed");
        Ok(())
    }
}

fn write_json_atomically<T: Serialize>(path: &Path, value: &T, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir at {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(&tmp)
        .with_context(|| format!("failed to open {}", tmp.display()))?;
    file.write_all(&json)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))
}

fn read_json_optional<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(value) => value,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_slice::<T>(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}
