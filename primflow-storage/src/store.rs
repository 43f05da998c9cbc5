//! Directory-backed state definition store.

use crate::error::StorageError;
use parking_lot::RwLock;
use primflow_core::{Catalog, StateDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

const STATES_FILE: &str = "states.json";
const META_FILE: &str = "states.meta.json";

/// Canvas coordinates of a state node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// An edge as drawn in the editor.
///
/// Edges are decoration only; the engine follows `transitions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: String,
}

/// A state definition as persisted, with its editor decorations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(flatten)]
    pub definition: StateDefinition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
}

impl StoredState {
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl From<StateDefinition> for StoredState {
    fn from(definition: StateDefinition) -> Self {
        Self {
            definition,
            ..Default::default()
        }
    }
}

/// Metadata written next to the states file.
///
/// The meta file is committed before the states file, so it also remembers
/// the checksum of the states file it replaces. Either one is accepted on
/// open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub state_count: usize,
    pub size_bytes: u64,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_checksum: Option<String>,
}

impl StoreMeta {
    fn accepts(&self, checksum: &str) -> bool {
        self.checksum == checksum || self.previous_checksum.as_deref() == Some(checksum)
    }
}

/// Persistent set of state definitions, unique by name.
///
/// Every mutation rewrites the whole document through a temp file and a
/// rename, so a crash leaves either the old or the new version on disk.
/// The in-memory view only changes once both files are written.
pub struct GraphStore {
    dir: PathBuf,
    states: RwLock<BTreeMap<String, StoredState>>,
}

impl GraphStore {
    /// Opens or creates a store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let states = load_states(&dir)?;
        tracing::info!(
            "Opened graph store at {} with {} state(s)",
            dir.display(),
            states.len()
        );

        Ok(Self {
            dir,
            states: RwLock::new(states),
        })
    }

    /// Directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inserts or wholly replaces the state with the same name.
    ///
    /// Returns the record it replaced, if any.
    pub fn save(&self, state: StoredState) -> Result<Option<StoredState>, StorageError> {
        check_name(&state)?;
        let name = state.name().to_string();
        let previous = self.mutate(|states| states.insert(name.clone(), state))?;
        tracing::debug!(
            "{} state {}",
            if previous.is_some() { "Replaced" } else { "Created" },
            name
        );
        Ok(previous)
    }

    /// Upserts a batch of states in a single write.
    pub fn save_all(
        &self,
        states: impl IntoIterator<Item = StoredState>,
    ) -> Result<usize, StorageError> {
        let batch: Vec<StoredState> = states.into_iter().collect();
        for state in &batch {
            check_name(state)?;
        }
        let count = batch.len();
        self.mutate(|states| {
            for state in batch {
                states.insert(state.name().to_string(), state);
            }
        })?;
        tracing::info!("Saved {} state(s)", count);
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<StoredState> {
        self.states.read().get(name).cloned()
    }

    /// All stored states, sorted by name.
    pub fn list(&self) -> Vec<StoredState> {
        self.states.read().values().cloned().collect()
    }

    /// Removes a state. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, StorageError> {
        if !self.states.read().contains_key(name) {
            return Ok(false);
        }
        let removed = self.mutate(|states| states.remove(name).is_some())?;
        if removed {
            tracing::info!("Deleted state {}", name);
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Builds an engine catalog from the current contents.
    pub fn catalog(&self) -> Result<Catalog, StorageError> {
        let states = self.states.read();
        let catalog = Catalog::new(states.values().map(|s| s.definition.clone()))?;
        Ok(catalog)
    }

    /// Applies `f` to a copy of the states, persists it, then publishes it.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, StoredState>) -> R,
    ) -> Result<R, StorageError> {
        let mut guard = self.states.write();
        let mut next = guard.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, states: &BTreeMap<String, StoredState>) -> Result<(), StorageError> {
        let records: Vec<&StoredState> = states.values().collect();
        let data = serde_json::to_vec_pretty(&records)?;

        let states_path = self.dir.join(STATES_FILE);
        let previous_checksum = if states_path.exists() {
            Some(format!("{:08x}", crc32c::crc32c(&fs::read(&states_path)?)))
        } else {
            None
        };
        let meta = StoreMeta {
            state_count: records.len(),
            size_bytes: data.len() as u64,
            checksum: format!("{:08x}", crc32c::crc32c(&data)),
            previous_checksum,
        };

        // Meta first: until the states rename lands, the old file still
        // matches previous_checksum.
        write_atomic(&self.dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;
        write_atomic(&states_path, &data)?;
        Ok(())
    }
}

fn check_name(state: &StoredState) -> Result<(), StorageError> {
    if state.name().is_empty() {
        return Err(StorageError::InvalidState(
            "state name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn load_states(dir: &Path) -> Result<BTreeMap<String, StoredState>, StorageError> {
    let states_path = dir.join(STATES_FILE);
    if !states_path.exists() {
        return Ok(BTreeMap::new());
    }

    let data = fs::read(&states_path)?;

    let meta_path = dir.join(META_FILE);
    if meta_path.exists() {
        let meta: StoreMeta = serde_json::from_reader(BufReader::new(File::open(&meta_path)?))?;
        let actual = format!("{:08x}", crc32c::crc32c(&data));
        if !meta.accepts(&actual) {
            return Err(StorageError::Corruption(format!(
                "{} checksum mismatch: expected {}, found {}",
                STATES_FILE, meta.checksum, actual
            )));
        }
        if actual != meta.checksum {
            tracing::warn!(
                "{} predates the last recorded write; the interrupted write was discarded",
                STATES_FILE
            );
        }
    } else {
        tracing::warn!("No {} found, skipping checksum verification", META_FILE);
    }

    let records: Vec<StoredState> = serde_json::from_slice(&data)?;
    let mut states = BTreeMap::new();
    for record in records {
        let name = record.name().to_string();
        if states.insert(name.clone(), record).is_some() {
            return Err(StorageError::Corruption(format!(
                "duplicate state '{}' in {}",
                name, STATES_FILE
            )));
        }
    }
    Ok(states)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
