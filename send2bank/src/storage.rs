//! Persistent key-value storage, namespaced by origin.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a valid storage file: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single change in a [KeyValueStore::write] batch. `None` removes the key.
pub type Change<'a> = (&'a str, Option<&'a str>);

/// A string-to-string store that outlives the process.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply every change in `batch`, or none of them.
    fn write(&mut self, batch: &[Change<'_>]) -> Result<(), StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(&[(key, Some(value))])
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.write(&[(key, None)])
    }
}

fn apply(entries: &mut BTreeMap<String, String>, batch: &[Change<'_>]) {
    for (key, value) in batch {
        match value {
            Some(value) => entries.insert((*key).to_owned(), (*value).to_owned()),
            None => entries.remove(*key),
        };
    }
}

/// A volatile store, useful for tests and for running without a data directory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, batch: &[Change<'_>]) -> Result<(), StorageError> {
        apply(&mut self.entries, batch);
        Ok(())
    }
}

/// A store backed by a single JSON object file per origin. Every write rewrites the whole file, which is fine for the
/// handful of keys we keep.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or lazily create) the store for `origin` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, origin: &str) -> Result<Self, StorageError> {
        let path = dir.as_ref().join(format!("{}.json", sanitise_origin(origin)));
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = entries.len(), "opened storage");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        // Write to a sibling file and rename, so a crash mid-write can't truncate the store.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, batch: &[Change<'_>]) -> Result<(), StorageError> {
        let mut updated = self.entries.clone();
        apply(&mut updated, batch);
        if updated == self.entries {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.entries, updated);
        if let Err(e) = self.flush() {
            self.entries = previous;
            return Err(e);
        }
        Ok(())
    }
}

/// Bytes which are escaped in origin file names. `%` is escaped too, so distinct origins never share a file.
const ORIGIN_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

fn sanitise_origin(origin: &str) -> String {
    utf8_percent_encode(origin, ORIGIN_ESCAPES).to_string()
}
