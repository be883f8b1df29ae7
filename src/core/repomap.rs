//! Source-tree digest used as model context by `sync`.
//!
//! The output is opaque text: a shallow directory listing per include root
//! followed by truncated previews of source files. Bounded in file count and
//! per-file size so the prompt stays small.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const DEFAULT_INCLUDE_DIRS: [&str; 3] = ["src", "app", "api"];
pub const MAX_FILE_COUNT: usize = 120;
pub const MAX_FILE_PREVIEW_CHARS: usize = 1200;
const MAX_TREE_DEPTH: usize = 2;

pub const EMPTY_SUMMARY: &str = "(no code directories found; check the --path arguments)";

static SOURCE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(ts|tsx|js|jsx|py|go|java|kt|cs|php|rb|rs|sql|proto)$").unwrap()
});

pub fn build_code_summary(project_root: &Path, include_paths: &[String]) -> String {
    let defaults: Vec<String> = DEFAULT_INCLUDE_DIRS.iter().map(|s| s.to_string()).collect();
    let include = if include_paths.is_empty() {
        &defaults
    } else {
        include_paths
    };

    let mut parts = Vec::new();
    let mut file_count = 0usize;

    for rel in include {
        let abs = project_root.join(rel);
        if !abs.is_dir() {
            continue;
        }
        let mut tree = Vec::new();
        collect_tree(&abs, 0, &mut tree);
        if !tree.is_empty() {
            parts.push(format!("Directory {}:\n{}", rel, tree.join("\n")));
        }

        let mut snippets = Vec::new();
        collect_file_previews(&abs, &abs, MAX_FILE_COUNT - file_count, &mut snippets);
        file_count += snippets.len();
        if !snippets.is_empty() {
            parts.push(snippets.join("\n\n"));
        }
        if file_count >= MAX_FILE_COUNT {
            break;
        }
    }

    if parts.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }
    parts.join("\n\n")
}

/// Sorted, non-hidden entries of a directory; unreadable directories are empty.
fn sorted_entries(dir: &Path) -> Vec<(String, PathBuf, bool)> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut entries: Vec<(String, PathBuf, bool)> = read
        .filter_map(Result::ok)
        .map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (name, e.path(), is_dir)
        })
        .filter(|(name, _, _)| !name.starts_with('.'))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Directories down to `MAX_TREE_DEPTH`; files only above the deepest level.
fn collect_tree(dir: &Path, depth: usize, lines: &mut Vec<String>) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    let indent = "  ".repeat(depth);
    for (name, path, is_dir) in sorted_entries(dir) {
        if is_dir {
            lines.push(format!("{}- {}/", indent, name));
            collect_tree(&path, depth + 1, lines);
        } else if depth < MAX_TREE_DEPTH {
            lines.push(format!("{}- {}", indent, name));
        }
    }
}

fn collect_file_previews(root: &Path, dir: &Path, limit: usize, snippets: &mut Vec<String>) {
    let start = snippets.len();
    for (name, path, is_dir) in sorted_entries(dir) {
        let taken = snippets.len() - start;
        if taken >= limit {
            return;
        }
        if is_dir {
            collect_file_previews(root, &path, limit - taken, snippets);
            continue;
        }
        if !SOURCE_FILE_RE.is_match(&name) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().to_string();
        snippets.push(format!("File {} preview:\n{}", rel, read_preview(&path)));
    }
}

fn read_preview(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => match content.char_indices().nth(MAX_FILE_PREVIEW_CHARS) {
            None => content,
            Some((cut, _)) => format!("{}\n...", &content[..cut]),
        },
        Err(_) => "(unreadable)".to_string(),
    }
}
