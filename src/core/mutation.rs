//! MutationPartial extraction and application.
//!
//! A model response mixes prose with blocks like:
//!
//! ```text
//! <MutationPartial>
//!   <Module mutationType="Update" id="Billing.module">
//!     <![CDATA[ { title: "Billing", dependency: { moduleIds: [] } } ]]>
//!   </Module>
//! </MutationPartial>
//! ```
//!
//! [`parse_mutations`] pulls the edits out in document order; [`apply_mutations`]
//! applies them to an [`ArchitectState`] with per-node versioning.

use crate::core::error::ArchitectError;
use crate::core::literal::parse_object_literal;
use crate::core::output;
use crate::core::schemas::{NodeKind, VERSION_FIELD};
use crate::core::store::{ArchitectState, NodeRecord, record_version};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Longest payload excerpt quoted in a parse error.
pub const PARSE_EXCERPT_CHARS: usize = 400;

static PARTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<MutationPartial\b[^>]*>(.*?)</MutationPartial\s*>").unwrap()
});

static OPEN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z]+)\s+([^>]*?)(/?)>").unwrap());

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationType::Create => "Create",
            MutationType::Update => "Update",
            MutationType::Delete => "Delete",
        };
        f.write_str(s)
    }
}

impl FromStr for MutationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(MutationType::Create),
            "update" => Ok(MutationType::Update),
            "delete" => Ok(MutationType::Delete),
            other => Err(format!("unknown mutationType '{}'", other)),
        }
    }
}

/// One parsed edit. `tag` is kept verbatim so that edits for categories this
/// build does not know still travel to the applier, which skips them.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEdit {
    pub tag: String,
    pub id: String,
    pub mutation_type: MutationType,
    pub payload: Option<NodeRecord>,
}

impl MutationEdit {
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_tag(&self.tag)
    }
}

/// Edits in document order plus the per-edit errors that were dropped.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub edits: Vec<MutationEdit>,
    pub errors: Vec<ArchitectError>,
}

/// One successfully applied edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationApplication {
    pub kind: NodeKind,
    pub id: String,
    pub mutation_type: MutationType,
    pub previous_version: Option<u64>,
    pub next_version: Option<u64>,
}

impl fmt::Display for MutationApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = |v: Option<u64>| v.map(|n| format!("v{}", n)).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} {} {} ({} -> {})",
            self.mutation_type,
            self.kind,
            self.id,
            version(self.previous_version),
            version(self.next_version)
        )
    }
}

/// Extract every MutationPartial edit from a raw response.
///
/// Blocks without a child element or without an `id` are skipped silently.
/// A payload that cannot be read drops only its own edit; the error is kept
/// in the report.
pub fn parse_mutations(text: &str) -> ParseReport {
    let mut report = ParseReport::default();
    for caps in PARTIAL_RE.captures_iter(text) {
        let body = caps.get(1).map_or("", |m| m.as_str());
        match parse_partial(body) {
            Ok(Some(edit)) => report.edits.push(edit),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "dropping unreadable MutationPartial");
                report.errors.push(err);
            }
        }
    }
    debug!(
        edits = report.edits.len(),
        errors = report.errors.len(),
        "parsed MutationPartial blocks"
    );
    report
}

fn parse_partial(body: &str) -> Result<Option<MutationEdit>, ArchitectError> {
    let Some(open) = OPEN_TAG_RE.captures(body) else {
        return Ok(None);
    };
    let tag = open[1].to_string();
    let attrs = parse_attributes(&open[2]);
    let self_closing = !open[3].is_empty();
    let open_end = open.get(0).map_or(0, |m| m.end());

    let Some(id) = attrs.iter().find(|(k, _)| k == "id").map(|(_, v)| v.clone()) else {
        return Ok(None);
    };
    if id.trim().is_empty() {
        return Ok(None);
    }

    let mutation_type = match attrs.iter().find(|(k, _)| k == "mutationType") {
        Some((_, raw)) => raw.parse::<MutationType>().map_err(|message| ArchitectError::ParseError {
            message: format!("{} '{}': {}", tag, id, message),
            excerpt: output::excerpt(raw, PARSE_EXCERPT_CHARS),
        })?,
        None => MutationType::Create,
    };

    let content = if self_closing {
        ""
    } else {
        element_body(body, open_end, &tag)
    };
    if let Some(extra) = trailing_element_tag(&body[open_end + content.len()..]) {
        warn!(tag = %tag, id = %id, ignored = %extra, "MutationPartial holds more than one element, only the first is applied");
    }

    let payload = match mutation_type {
        MutationType::Delete => None,
        MutationType::Create | MutationType::Update => extract_payload(content)
            .map(|literal| {
                parse_object_literal(&literal).map_err(|err| ArchitectError::ParseError {
                    message: format!("{} '{}': {}", tag, id, err),
                    excerpt: output::excerpt(&literal, PARSE_EXCERPT_CHARS),
                })
            })
            .transpose()?,
    };

    Ok(Some(MutationEdit {
        tag,
        id,
        mutation_type,
        payload,
    }))
}

/// Text between the open tag and its matching close tag. CDATA sections are
/// stepped over so a payload mentioning `</Tag>` does not end the element.
fn element_body<'a>(body: &'a str, open_end: usize, tag: &str) -> &'a str {
    let rest = &body[open_end..];
    let close = format!("</{}", tag.to_ascii_lowercase());
    let lower = rest.to_ascii_lowercase();

    let mut search_from = 0;
    loop {
        let next_close = lower[search_from..].find(&close).map(|i| i + search_from);
        let next_cdata = lower[search_from..].find("<![cdata[").map(|i| i + search_from);
        match (next_close, next_cdata) {
            (Some(c), Some(d)) if d < c => match lower[d..].find("]]>") {
                Some(end) => search_from = d + end + 3,
                None => return rest,
            },
            (Some(c), _) => return &rest[..c],
            // Unclosed element: take what the block holds.
            (None, _) => return rest,
        }
    }
}

/// Tag of an element opened after the first one closed, if any.
fn trailing_element_tag(after_first: &str) -> Option<String> {
    let mut rest = after_first;
    while let Some(caps) = OPEN_TAG_RE.captures(rest) {
        let m = caps.get(0)?;
        // Tags written inside a CDATA payload are text, not elements.
        let before = &rest[..m.start()];
        if let Some(cdata) = before.rfind("<![CDATA[") {
            if !before[cdata..].contains("]]>") {
                let end = rest[cdata..].find("]]>")? + cdata + 3;
                rest = &rest[end..];
                continue;
            }
        }
        return Some(caps[1].to_string());
    }
    None
}

/// The literal text of a payload: CDATA content when present (adjacent
/// sections joined), otherwise a bare object literal.
fn extract_payload(content: &str) -> Option<String> {
    let sections: Vec<&str> = CDATA_RE
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !sections.is_empty() {
        let joined = sections.concat();
        let trimmed = joined.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    let trimmed = content.trim();
    trimmed.starts_with('{').then(|| trimmed.to_string())
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_string(), unescape_attr(value))
        })
        .collect()
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Apply edits in order, mutating `state` in place.
///
/// - Unknown categories are skipped and not reported.
/// - Deleting an absent node is a no-op and not reported.
/// - `Update` on an existing node bumps its version; every other write
///   (including `Create` on an existing node) starts again at 1.
/// - The payload replaces the record wholesale; `version` is always computed.
pub fn apply_mutations(state: &mut ArchitectState, edits: &[MutationEdit]) -> Vec<MutationApplication> {
    let mut applied = Vec::new();
    for edit in edits {
        let Some(kind) = edit.kind() else {
            debug!(tag = %edit.tag, id = %edit.id, "skipping edit for unknown category");
            continue;
        };
        let bucket = state.bucket_mut(kind);
        let previous_version = bucket.get(&edit.id).map(|r| record_version(r).unwrap_or(0));

        if edit.mutation_type == MutationType::Delete {
            if bucket.remove(&edit.id).is_some() {
                applied.push(MutationApplication {
                    kind,
                    id: edit.id.clone(),
                    mutation_type: edit.mutation_type,
                    previous_version,
                    next_version: None,
                });
            }
            continue;
        }

        let next_version = match (edit.mutation_type, previous_version) {
            (MutationType::Update, Some(prev)) => prev + 1,
            _ => 1,
        };
        let mut record = edit.payload.clone().unwrap_or_default();
        record.insert(VERSION_FIELD.to_string(), Value::from(next_version));
        bucket.insert(edit.id.clone(), record);

        let application = MutationApplication {
            kind,
            id: edit.id.clone(),
            mutation_type: edit.mutation_type,
            previous_version,
            next_version: Some(next_version),
        };
        debug!(%application, "applied mutation");
        applied.push(application);
    }
    applied
}

/// Parse-and-apply result for one response.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub applications: Vec<MutationApplication>,
    pub errors: Vec<ArchitectError>,
}

/// Parse `text` and apply it to `state`.
///
/// Per-edit parse errors are returned alongside the applications. If nothing
/// at all could be extracted and at least one edit failed to parse, the whole
/// response is rejected with the first error, so "nothing to do" and
/// "everything was malformed" stay distinguishable.
pub fn apply_mutation_text(state: &mut ArchitectState, text: &str) -> Result<ApplyOutcome, ArchitectError> {
    let ParseReport { edits, mut errors } = parse_mutations(text);
    if edits.is_empty() && !errors.is_empty() {
        return Err(errors.remove(0));
    }
    let applications = apply_mutations(state, &edits);
    Ok(ApplyOutcome {
        applications,
        errors,
    })
}
