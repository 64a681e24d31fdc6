//! Persistent trusted-fingerprint storage keyed by server host.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

/// Storage for the last fingerprint a caller chose to trust per host.
///
/// `save` overwrites any prior value (last write wins). `load` returning
/// `Ok(None)` is the "not found" signal; callers decide whether that is
/// fatal.
pub trait FingerprintStore: Send + Sync {
    /// Persist `fingerprint` as the trusted identity for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing storage cannot be updated.
    fn save(&self, host: &str, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    /// Fetch the trusted fingerprint for `host`, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing storage cannot be read.
    fn load(&self, host: &str) -> Result<Option<Fingerprint>, StoreError>;
}

/// JSON file store holding `{ "<host>": "<fingerprint>" }`.
#[derive(Debug, Clone)]
pub struct FileFingerprintStore {
    path: PathBuf,
}

impl FileFingerprintStore {
    /// Store backed by the file at `path`; the file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_error = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content =
            serde_json::to_string_pretty(entries).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(format!(".{}.tmp", std::process::id()));
        let staging = PathBuf::from(staging);

        fs::write(&staging, content).map_err(io_error)?;
        fs::rename(&staging, &self.path).map_err(|err| {
            let _ = fs::remove_file(&staging);
            io_error(err)
        })
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn save(&self, host: &str, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        entries.insert(host.to_string(), fingerprint.as_str().to_string());
        self.write_entries(&entries)?;
        debug!(host, path = %self.path.display(), "stored trusted fingerprint");
        Ok(())
    }

    fn load(&self, host: &str) -> Result<Option<Fingerprint>, StoreError> {
        Ok(self.read_entries()?.remove(host).map(Fingerprint::from))
    }
}

/// Process-local store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    entries: Mutex<HashMap<String, Fingerprint>>,
}

impl MemoryFingerprintStore {
    /// Empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn save(&self, host: &str, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(host.to_string(), fingerprint.clone());
        Ok(())
    }

    fn load(&self, host: &str) -> Result<Option<Fingerprint>, StoreError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(host)
            .cloned())
    }
}
