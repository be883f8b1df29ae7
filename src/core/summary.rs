//! Compact state digest for model prompts.
//!
//! Lossy and one-way: long text fields are cut to fixed character budgets and
//! everything except identity, version, headline text and dependencies is
//! dropped. Never fed back into the store.

use crate::core::error::ArchitectError;
use crate::core::schemas::{
    SUMMARY_BUSINESS_DESC_CHARS, SUMMARY_TECH_SUMMARY_CHARS, SUMMARY_TITLE_CHARS,
};
use crate::core::store::{ArchitectState, record_version};
use serde_json::{Map, Value};

const ELLIPSIS: char = '…';

/// category → list of abbreviated records. Empty categories are omitted.
pub fn summarise_state(state: &ArchitectState) -> Map<String, Value> {
    let mut summary = Map::new();
    for (kind, bucket) in state.iter() {
        if bucket.is_empty() {
            continue;
        }
        let entries = bucket
            .iter()
            .map(|(id, record)| {
                let mut pick = Map::new();
                pick.insert("id".to_string(), Value::String(id.clone()));
                pick.insert(
                    "version".to_string(),
                    record_version(record).map(Value::from).unwrap_or(Value::Null),
                );
                for (field, budget) in [
                    ("title", SUMMARY_TITLE_CHARS),
                    ("businessDesc", SUMMARY_BUSINESS_DESC_CHARS),
                    ("techSummary", SUMMARY_TECH_SUMMARY_CHARS),
                ] {
                    if let Some(text) = record.get(field).and_then(Value::as_str) {
                        if !text.is_empty() {
                            pick.insert(field.to_string(), Value::String(truncate_text(text, budget)));
                        }
                    }
                }
                if let Some(dependency) = record.get("dependency").filter(|v| !v.is_null()) {
                    pick.insert("dependency".to_string(), dependency.clone());
                }
                Value::Object(pick)
            })
            .collect();
        summary.insert(kind.as_str().to_string(), Value::Array(entries));
    }
    summary
}

/// Pretty-printed digest, the form embedded in prompts.
pub fn summarise_state_json(state: &ArchitectState) -> Result<String, ArchitectError> {
    Ok(serde_json::to_string_pretty(&Value::Object(summarise_state(state)))?)
}

/// Keep at most `max_chars` characters, appending `…` when cut.
pub fn truncate_text(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((cut, _)) => {
            let mut out = content[..cut].to_string();
            out.push(ELLIPSIS);
            out
        }
    }
}
