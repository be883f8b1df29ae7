//! Canonical XML snapshots of architecture nodes.
//!
//! Every record is rendered to one file whose path mirrors the identifier's
//! `/`-separated segments under the architect root. Output is deterministic:
//! priority fields first, then the record's own field order, strings always in
//! CDATA. After a save, files no longer backed by a record are pruned.

use crate::core::error::ArchitectError;
use crate::core::schemas::{
    ARCHITECT_CONFIG_FILE, ARCHITECT_LOG_DIR, ARCHITECT_PROMPT_DIR, ARCHITECT_STATE_FILE,
    NodeKind, PRIORITY_FIELDS, VERSION_FIELD,
};
use crate::core::store::{ArchitectState, NodeRecord};
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const INDENT: &str = "  ";

/// Render one record. The result has no trailing newline; files get one.
pub fn render_node_xml(kind: NodeKind, id: &str, record: &NodeRecord) -> String {
    let mut lines = Vec::with_capacity(record.len() + 3);
    lines.push(XML_DECLARATION.to_string());
    lines.push(format!("<{} id=\"{}\">", kind, escape_attr(id)));

    for key in ordered_keys(record) {
        if let Some(value) = record.get(key) {
            render_element(&mut lines, 1, key, value);
        }
    }

    lines.push(format!("</{}>", kind));
    lines.join("\n")
}

/// `version`, `title`, `businessDesc`, `techSummary` when present, then the
/// remaining fields in record order.
fn ordered_keys(record: &NodeRecord) -> Vec<&str> {
    let mut keys: Vec<&str> = PRIORITY_FIELDS
        .iter()
        .copied()
        .filter(|k| record.contains_key(*k))
        .collect();
    keys.extend(
        record
            .keys()
            .map(String::as_str)
            .filter(|k| !PRIORITY_FIELDS.contains(k) && *k != VERSION_FIELD),
    );
    keys
}

fn render_element(lines: &mut Vec<String>, level: usize, key: &str, value: &Value) {
    let indent = INDENT.repeat(level);
    match value {
        Value::Null => lines.push(format!("{}<{}/>", indent, key)),
        Value::String(s) => lines.push(format!("{}<{}>{}</{}>", indent, key, wrap_cdata(s), key)),
        Value::Number(n) => lines.push(format!("{}<{}>{}</{}>", indent, key, format_number(n), key)),
        Value::Bool(b) => lines.push(format!("{}<{}>{}</{}>", indent, key, b, key)),
        Value::Array(items) if items.is_empty() => lines.push(format!("{}<{}/>", indent, key)),
        Value::Array(items) => {
            let item_tag = guess_array_item_tag(key);
            lines.push(format!("{}<{}>", indent, key));
            for item in items {
                render_element(lines, level + 1, &item_tag, item);
            }
            lines.push(format!("{}</{}>", indent, key));
        }
        Value::Object(map) if map.is_empty() => lines.push(format!("{}<{}/>", indent, key)),
        Value::Object(map) => {
            lines.push(format!("{}<{}>", indent, key));
            for (child_key, child_value) in map {
                render_element(lines, level + 1, child_key, child_value);
            }
            lines.push(format!("{}</{}>", indent, key));
        }
    }
}

/// Always wrap, even empty strings. A literal `]]>` is split across two
/// sections so the payload survives verbatim.
fn wrap_cdata(value: &str) -> String {
    format!("<![CDATA[{}]]>", value.replace("]]>", "]]]]><![CDATA[>"))
}

/// Integral floats print without a fraction, matching how the payloads were
/// written (`1e3` renders as `1000`).
fn format_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// `moduleIds` → `module`, `entityIds` → `entity`; anything else → `item`.
pub fn guess_array_item_tag(key: &str) -> String {
    if let Some(stem) = key.strip_suffix("Ids") {
        let singular = stem.strip_suffix('s').unwrap_or(stem);
        if !singular.is_empty() {
            return singular.to_string();
        }
    }
    "item".to_string()
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Map an identifier to its snapshot path under `root`.
///
/// Empty and `.` segments are dropped. Returns `None` for identifiers that
/// would escape the root (`..`) or land on a reserved entry (the state blob,
/// config, `prompts/`, `logs/`).
pub fn node_file_path(root: &Path, id: &str) -> Option<PathBuf> {
    let segments: Vec<&str> = id
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let first = *segments.first()?;
    if segments.iter().any(|s| *s == ".." || s.contains('\\')) {
        return None;
    }
    if segments.len() == 1 && (first == ARCHITECT_STATE_FILE || first == ARCHITECT_CONFIG_FILE) {
        return None;
    }
    if first == ARCHITECT_PROMPT_DIR || first == ARCHITECT_LOG_DIR {
        return None;
    }

    let relative: PathBuf = segments.iter().collect();
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Delete one snapshot; a missing file is fine.
pub fn remove_node_file(root: &Path, id: &str) -> Result<(), ArchitectError> {
    let Some(path) = node_file_path(root, id) else {
        return Ok(());
    };
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArchitectError::IoError(e)),
    }
}

#[derive(Debug, Default)]
pub struct SnapshotWrite {
    /// Files whose bytes changed on this pass.
    pub written: Vec<PathBuf>,
    /// Every snapshot path backed by a record.
    pub retained: HashSet<PathBuf>,
}

/// Write one snapshot per record. Unchanged files are left untouched.
///
/// A record whose path is also the parent directory of another record's
/// snapshot (`Billing.module` next to `Billing.module/Invoice.entity`) cannot
/// be a file; its snapshot is skipped and the state blob remains the source.
pub fn write_snapshots(state: &ArchitectState, root: &Path) -> Result<SnapshotWrite, ArchitectError> {
    let plan = plan_snapshots(state, root);
    for (kind, id, skip) in &plan.skipped {
        match skip {
            SnapshotSkip::UnsafePath => {
                warn!(kind = %kind, id = %id, "identifier cannot be placed under the architect root, snapshot skipped")
            }
            SnapshotSkip::NestedParent => {
                warn!(kind = %kind, id = %id, "identifier is also a directory of nested records, snapshot skipped")
            }
        }
    }

    let mut out = SnapshotWrite::default();
    let mut owners: HashMap<PathBuf, NodeKind> = HashMap::new();
    for (kind, id, record, path) in plan.placed {
        if let Some(previous) = owners.insert(path.clone(), kind) {
            warn!(id = %id, first = %previous, second = %kind, "two categories share a snapshot path, last one wins");
        }

        let xml = render_node_xml(kind, id, record) + "\n";
        if fs::read(&path).ok().as_deref() != Some(xml.as_bytes()) {
            clear_path_for_file(root, &path)?;
            fs::write(&path, xml.as_bytes())?;
            out.written.push(path.clone());
        }
        out.retained.insert(path);
    }
    Ok(out)
}

/// Why a record has no snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSkip {
    /// `..`, backslashes or a reserved entry.
    UnsafePath,
    /// The path is the directory of other records' snapshots.
    NestedParent,
}

struct SnapshotPlan<'a> {
    placed: Vec<(NodeKind, &'a str, &'a NodeRecord, PathBuf)>,
    skipped: Vec<(NodeKind, &'a str, SnapshotSkip)>,
}

fn plan_snapshots<'a>(state: &'a ArchitectState, root: &Path) -> SnapshotPlan<'a> {
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();
    for (kind, bucket) in state.iter() {
        for (id, record) in bucket {
            match node_file_path(root, id) {
                Some(path) => candidates.push((kind, id.as_str(), record, path)),
                None => skipped.push((kind, id.as_str(), SnapshotSkip::UnsafePath)),
            }
        }
    }

    let parent_dirs: HashSet<PathBuf> = candidates
        .iter()
        .flat_map(|(_, _, _, path)| path.ancestors().skip(1).take_while(move |a| *a != root))
        .map(Path::to_path_buf)
        .collect();

    let mut placed = Vec::with_capacity(candidates.len());
    for (kind, id, record, path) in candidates {
        if parent_dirs.contains(&path) {
            skipped.push((kind, id, SnapshotSkip::NestedParent));
        } else {
            placed.push((kind, id, record, path));
        }
    }
    SnapshotPlan { placed, skipped }
}

/// Records that live only in the state blob. `architect show` still renders
/// them.
pub fn records_without_snapshot(state: &ArchitectState, root: &Path) -> Vec<(NodeKind, String, SnapshotSkip)> {
    plan_snapshots(state, root)
        .skipped
        .into_iter()
        .map(|(kind, id, skip)| (kind, id.to_string(), skip))
        .collect()
}

/// Make room for a snapshot file: stale files where a directory is needed
/// and a stale directory where the file goes are removed first.
fn clear_path_for_file(root: &Path, path: &Path) -> Result<(), ArchitectError> {
    for ancestor in path.ancestors().skip(1).take_while(|a| *a != root) {
        if ancestor.is_file() {
            debug!(path = %ancestor.display(), "removing stale snapshot in the way of a directory");
            fs::remove_file(ancestor)?;
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.is_dir() {
        debug!(path = %path.display(), "removing stale directory in the way of a snapshot");
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Remove every file under `root` that is not retained and not reserved, then
/// drop directories the pruning left empty. Returns the removed files.
pub fn cleanup_stale_files(
    root: &Path,
    retained: &HashSet<PathBuf>,
) -> Result<Vec<PathBuf>, ArchitectError> {
    let mut removed = Vec::new();
    prune_dir(root, root, retained, &mut removed)?;
    removed.sort();
    Ok(removed)
}

fn is_reserved(root: &Path, path: &Path) -> bool {
    path == root.join(ARCHITECT_STATE_FILE)
        || path == root.join(ARCHITECT_CONFIG_FILE)
        || path == root.join(ARCHITECT_PROMPT_DIR)
        || path == root.join(ARCHITECT_LOG_DIR)
}

/// Returns true when `dir` is empty after pruning.
fn prune_dir(
    root: &Path,
    dir: &Path,
    retained: &HashSet<PathBuf>,
    removed: &mut Vec<PathBuf>,
) -> Result<bool, ArchitectError> {
    let mut remaining = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_reserved(root, &path) {
            remaining += 1;
            continue;
        }
        if entry.file_type()?.is_dir() {
            if prune_dir(root, &path, retained, removed)? {
                fs::remove_dir(&path)?;
            } else {
                remaining += 1;
            }
            continue;
        }
        if retained.contains(&path) {
            remaining += 1;
            continue;
        }
        debug!(path = %path.display(), "removing stale snapshot");
        fs::remove_file(&path)?;
        removed.push(path);
    }
    Ok(remaining == 0)
}
