//! Persisted display names.
//!
//! Names the user assigns to devices survive restarts through a
//! [`NameStore`]. The overlay is a pure key lookup applied to every roster
//! fetch.

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::types::{DeviceId, Peer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Key-value store for device display names.
///
/// Changes are staged in memory first. Persisting is a separate
/// [`NameWrite`] so it can run on a blocking thread.
pub trait NameStore: Send {
    fn get(&self, id: &DeviceId) -> Option<String>;

    /// Records `name` in memory. Returns the write that persists it, if the
    /// store is backed by a file.
    fn stage(&mut self, id: &DeviceId, name: &str) -> ChatResult<Option<NameWrite>>;

    /// Puts back `previous` if `staged` is still the current name.
    fn unstage(&mut self, id: &DeviceId, staged: &str, previous: Option<String>);

    /// Stages and persists on the calling thread.
    fn set(&mut self, id: &DeviceId, name: &str) -> ChatResult<()> {
        let previous = self.get(id);
        if let Some(write) = self.stage(id, name)? {
            if let Err(e) = write.commit() {
                self.unstage(id, name, previous);
                return Err(e);
            }
        }
        Ok(())
    }
}

/// A snapshot of the names file waiting to be written.
#[derive(Debug)]
pub struct NameWrite {
    path: PathBuf,
    json: String,
    seq: u64,
    written: Arc<Mutex<u64>>,
}

impl NameWrite {
    /// Writes the snapshot. Skipped when a newer snapshot already landed.
    pub fn commit(self) -> ChatResult<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| ChatError::Storage("names file lock poisoned".to_string()))?;
        if *written >= self.seq {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ChatError::Storage(e.to_string()))?;
        }
        std::fs::write(&self.path, &self.json).map_err(|e| ChatError::Storage(e.to_string()))?;
        *written = self.seq;
        Ok(())
    }
}

/// Non-persistent store.
#[derive(Debug, Default)]
pub struct MemoryNameStore {
    names: HashMap<DeviceId, String>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, K, V>(names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<DeviceId>,
        V: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl NameStore for MemoryNameStore {
    fn get(&self, id: &DeviceId) -> Option<String> {
        self.names.get(id).cloned()
    }

    fn stage(&mut self, id: &DeviceId, name: &str) -> ChatResult<Option<NameWrite>> {
        self.names.insert(id.clone(), name.to_string());
        Ok(None)
    }

    fn unstage(&mut self, id: &DeviceId, staged: &str, previous: Option<String>) {
        if self.names.get(id).map(String::as_str) != Some(staged) {
            return;
        }
        match previous {
            Some(old) => self.names.insert(id.clone(), old),
            None => self.names.remove(id),
        };
    }
}

/// Names kept in a JSON object file (`{"<device id>": "<name>"}`).
pub struct JsonNameStore {
    path: PathBuf,
    names: HashMap<String, String>,
    next_seq: u64,
    /// Sequence number of the last snapshot on disk.
    written: Arc<Mutex<u64>>,
}

impl JsonNameStore {
    /// Opens the store, loading existing names. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> ChatResult<Self> {
        let path = path.into();
        let names = if path.exists() {
            let json =
                std::fs::read_to_string(&path).map_err(|e| ChatError::Storage(e.to_string()))?;
            if json.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&json)?
            }
        } else {
            HashMap::new()
        };
        debug!("loaded {} display names from {}", names.len(), path.display());
        Ok(Self {
            path,
            names,
            next_seq: 0,
            written: Arc::new(Mutex::new(0)),
        })
    }

    /// Opens the store at `names_path`, or at the platform default when unset.
    pub fn from_config(config: &ChatConfig) -> ChatResult<Self> {
        let path = config.names_path.clone().unwrap_or_else(Self::default_path);
        Self::open(path)
    }

    /// Returns the platform-specific default path.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("linkchat")
            .join("names.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NameStore for JsonNameStore {
    fn get(&self, id: &DeviceId) -> Option<String> {
        self.names.get(id.as_str()).cloned()
    }

    fn stage(&mut self, id: &DeviceId, name: &str) -> ChatResult<Option<NameWrite>> {
        let previous = self.names.insert(id.to_string(), name.to_string());
        let json = match serde_json::to_string_pretty(&self.names) {
            Ok(json) => json,
            Err(e) => {
                self.unstage(id, name, previous);
                return Err(e.into());
            }
        };
        self.next_seq += 1;
        Ok(Some(NameWrite {
            path: self.path.clone(),
            json,
            seq: self.next_seq,
            written: Arc::clone(&self.written),
        }))
    }

    fn unstage(&mut self, id: &DeviceId, staged: &str, previous: Option<String>) {
        if self.names.get(id.as_str()).map(String::as_str) != Some(staged) {
            return;
        }
        match previous {
            Some(old) => self.names.insert(id.to_string(), old),
            None => self.names.remove(id.as_str()),
        };
    }
}

/// Applies stored names on top of fetched peers.
pub struct NameOverlay {
    store: Box<dyn NameStore>,
}

impl NameOverlay {
    pub fn new(store: Box<dyn NameStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryNameStore::new()))
    }

    pub fn name_for(&self, id: &DeviceId) -> Option<String> {
        self.store.get(id)
    }

    /// Stored names win over whatever the service reported.
    pub fn apply(&self, peers: &mut [Peer]) {
        for peer in peers.iter_mut() {
            if let Some(name) = self.store.get(&peer.id) {
                peer.display_name = Some(name);
            }
        }
    }

    /// Stages a trimmed name in memory. `None` for a blank one.
    pub fn stage(&mut self, id: &DeviceId, name: &str) -> ChatResult<Option<StagedName>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let previous = self.store.get(id);
        let write = self.store.stage(id, name)?;
        Ok(Some(StagedName {
            device: id.clone(),
            name: name.to_string(),
            previous,
            write,
        }))
    }

    /// Drops a staged name whose write failed.
    pub fn revert(&mut self, staged: StagedName) {
        self.store.unstage(&staged.device, &staged.name, staged.previous);
    }

    /// Stages and persists on the calling thread. Returns the trimmed name.
    pub fn assign(&mut self, id: &DeviceId, name: &str) -> ChatResult<Option<String>> {
        let Some(mut staged) = self.stage(id, name)? else {
            return Ok(None);
        };
        if let Some(write) = staged.take_write() {
            if let Err(e) = write.commit() {
                self.revert(staged);
                return Err(e);
            }
        }
        Ok(Some(staged.name))
    }
}

/// A name held in memory while its file write is outstanding.
#[derive(Debug)]
pub struct StagedName {
    pub device: DeviceId,
    pub name: String,
    previous: Option<String>,
    write: Option<NameWrite>,
}

impl StagedName {
    pub fn take_write(&mut self) -> Option<NameWrite> {
        self.write.take()
    }
}
