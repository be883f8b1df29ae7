//! Document store for the architecture DSL.
//!
//! The store is one mapping per node category from identifier to a versioned
//! record. Its durable form is a single JSON blob (`state.json`) inside the
//! architect workspace; per-record XML snapshots are regenerated from it on
//! every save (see [`crate::core::render`]).

use crate::core::error::ArchitectError;
use crate::core::render;
use crate::core::schemas::{
    ARCHITECT_DIR, ARCHITECT_LOG_DIR, ARCHITECT_PROMPT_DIR, ARCHITECT_STATE_FILE, NodeKind,
    VERSION_FIELD,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One architecture node: ordered field mapping including `version`.
pub type NodeRecord = Map<String, Value>;

/// All records of one category, keyed by identifier.
pub type NodeBucket = BTreeMap<String, NodeRecord>;

/// Store handle representing an architect workspace on disk.
///
/// `root` is `<project>/openspec/architect`; everything the engine writes
/// lives below it, except change logs filed under a proposal.
#[derive(Debug, Clone)]
pub struct Store {
    /// Project root the workspace belongs to
    pub project_root: PathBuf,
    /// Absolute path to the architect directory
    pub root: PathBuf,
}

impl Store {
    pub fn for_project(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            root: project_root.join(ARCHITECT_DIR),
        }
    }

    /// Create the architect directory and its `prompts/` subdirectory.
    pub fn ensure(&self) -> Result<(), ArchitectError> {
        fs::create_dir_all(self.prompt_dir())?;
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(ARCHITECT_STATE_FILE)
    }

    pub fn prompt_dir(&self) -> PathBuf {
        self.root.join(ARCHITECT_PROMPT_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(ARCHITECT_LOG_DIR)
    }

    pub fn load(&self) -> Result<ArchitectState, ArchitectError> {
        self.ensure()?;
        load_state(&self.state_path())
    }

    pub fn save(&self, state: &ArchitectState) -> Result<SaveReport, ArchitectError> {
        self.ensure()?;
        save_state(state, &self.root)
    }
}

/// In-memory document store: category → identifier → record.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchitectState {
    buckets: BTreeMap<NodeKind, NodeBucket>,
}

impl Default for ArchitectState {
    fn default() -> Self {
        Self::empty()
    }
}

impl ArchitectState {
    /// One empty bucket per category.
    pub fn empty() -> Self {
        Self {
            buckets: NodeKind::ALL
                .into_iter()
                .map(|kind| (kind, NodeBucket::new()))
                .collect(),
        }
    }

    pub fn bucket(&self, kind: NodeKind) -> &NodeBucket {
        // Every constructor fills all categories.
        &self.buckets[&kind]
    }

    pub fn bucket_mut(&mut self, kind: NodeKind) -> &mut NodeBucket {
        self.buckets.entry(kind).or_default()
    }

    pub fn get(&self, kind: NodeKind, id: &str) -> Option<&NodeRecord> {
        self.bucket(kind).get(id)
    }

    /// Iterate categories in canonical order with their buckets.
    pub fn iter(&self) -> impl Iterator<Item = (NodeKind, &NodeBucket)> {
        self.buckets.iter().map(|(kind, bucket)| (*kind, bucket))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    /// True when no category holds any record.
    pub fn is_initial(&self) -> bool {
        self.buckets.values().all(BTreeMap::is_empty)
    }

    pub fn is_empty(&self) -> bool {
        self.is_initial()
    }

    /// Build a state from a parsed blob. Missing categories become empty
    /// buckets; categories the schema does not know are ignored.
    pub fn from_json(value: Value) -> Result<Self, ArchitectError> {
        let Value::Object(mut top) = value else {
            return Err(ArchitectError::ValidationError(
                "architect state must be a JSON object keyed by node category".to_string(),
            ));
        };

        let mut state = Self::empty();
        for kind in NodeKind::ALL {
            let Some(raw) = top.remove(kind.as_str()) else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let bucket: NodeBucket = serde_json::from_value(raw).map_err(|e| {
                ArchitectError::ValidationError(format!("invalid {} bucket: {}", kind, e))
            })?;
            state.buckets.insert(kind, bucket);
        }
        Ok(state)
    }

    pub fn to_json(&self) -> Value {
        let mut top = Map::new();
        for (kind, bucket) in &self.buckets {
            let records = bucket
                .iter()
                .map(|(id, record)| (id.clone(), Value::Object(record.clone())))
                .collect();
            top.insert(kind.as_str().to_string(), Value::Object(records));
        }
        Value::Object(top)
    }

    /// Pretty JSON with a trailing newline, the exact blob format on disk.
    pub fn to_blob(&self) -> Result<String, ArchitectError> {
        Ok(serde_json::to_string_pretty(&self.to_json())? + "\n")
    }
}

/// Version carried by a record, if it has a usable one.
pub fn record_version(record: &NodeRecord) -> Option<u64> {
    record.get(VERSION_FIELD).and_then(Value::as_u64)
}

/// Read the durable blob. An absent file is an empty store, not an error.
pub fn load_state(path: &Path) -> Result<ArchitectState, ArchitectError> {
    if !path.exists() {
        debug!(path = %path.display(), "no architect state yet, starting empty");
        return Ok(ArchitectState::empty());
    }
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let state = ArchitectState::from_json(value)?;
    info!(path = %path.display(), records = state.len(), "loaded architect state");
    Ok(state)
}

/// What a save touched on disk.
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Persist the whole store under `root`: the blob first, then one snapshot
/// per record, then pruning of snapshots whose record is gone.
pub fn save_state(state: &ArchitectState, root: &Path) -> Result<SaveReport, ArchitectError> {
    fs::create_dir_all(root)?;
    let state_path = root.join(ARCHITECT_STATE_FILE);
    write_atomic(&state_path, state.to_blob()?.as_bytes())?;

    let snapshots = render::write_snapshots(state, root)?;
    let removed = render::cleanup_stale_files(root, &snapshots.retained)?;
    info!(
        records = state.len(),
        written = snapshots.written.len(),
        removed = removed.len(),
        "saved architect state"
    );
    Ok(SaveReport {
        written: snapshots.written,
        removed,
    })
}

/// Write through a sibling temp file and rename over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ArchitectError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ArchitectError::ValidationError(format!("not a file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp_path, contents)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(ArchitectError::IoError(e));
    }
    Ok(())
}
