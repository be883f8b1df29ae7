//! Fixed schema registry for the architecture DSL.
//!
//! The twelve node categories, their canonical order, and the on-disk layout
//! constants of an architect workspace live here. Nothing in this module has
//! behavior beyond lookups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- Workspace layout ---
pub const ARCHITECT_DIR: &str = "openspec/architect";
pub const ARCHITECT_STATE_FILE: &str = "state.json";
pub const ARCHITECT_PROMPT_DIR: &str = "prompts";
pub const ARCHITECT_LOG_DIR: &str = "logs";
pub const ARCHITECT_CONFIG_FILE: &str = "config.toml";
pub const CHANGES_DIR: &str = "openspec/changes";

// --- Prompt files ---
pub const PROMPT_DSL_STRUCTURE: &str = "dsl-structure.md";
pub const PROMPT_DSL_OUTPUT: &str = "dsl-output.md";
pub const PROMPT_DSL_EXAMPLES: &str = "dsl-examples.md";

// --- Rendering ---
/// Fields rendered first, in this order, when present on a record.
pub const PRIORITY_FIELDS: [&str; 4] = ["version", "title", "businessDesc", "techSummary"];
pub const VERSION_FIELD: &str = "version";

// --- Summary budgets (characters) ---
pub const SUMMARY_TITLE_CHARS: usize = 160;
pub const SUMMARY_BUSINESS_DESC_CHARS: usize = 240;
pub const SUMMARY_TECH_SUMMARY_CHARS: usize = 240;

/// Architecture node category.
///
/// Declaration order is the canonical order used for iteration, the state
/// blob, and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Module,
    ModuleRelationDiagram,
    Entity,
    EntityRelationDiagram,
    Enum,
    HttpEndpoint,
    PublicProcedure,
    PrivateProcedure,
    StateMachine,
    BackendCache,
    ViewComponent,
    Page,
}

impl NodeKind {
    pub const ALL: [NodeKind; 12] = [
        NodeKind::Module,
        NodeKind::ModuleRelationDiagram,
        NodeKind::Entity,
        NodeKind::EntityRelationDiagram,
        NodeKind::Enum,
        NodeKind::HttpEndpoint,
        NodeKind::PublicProcedure,
        NodeKind::PrivateProcedure,
        NodeKind::StateMachine,
        NodeKind::BackendCache,
        NodeKind::ViewComponent,
        NodeKind::Page,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "Module",
            NodeKind::ModuleRelationDiagram => "ModuleRelationDiagram",
            NodeKind::Entity => "Entity",
            NodeKind::EntityRelationDiagram => "EntityRelationDiagram",
            NodeKind::Enum => "Enum",
            NodeKind::HttpEndpoint => "HttpEndpoint",
            NodeKind::PublicProcedure => "PublicProcedure",
            NodeKind::PrivateProcedure => "PrivateProcedure",
            NodeKind::StateMachine => "StateMachine",
            NodeKind::BackendCache => "BackendCache",
            NodeKind::ViewComponent => "ViewComponent",
            NodeKind::Page => "Page",
        }
    }

    /// Exact, case-sensitive lookup. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<NodeKind> {
        NodeKind::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::from_tag(s).ok_or_else(|| {
            let known = NodeKind::ALL.map(NodeKind::as_str).join(", ");
            format!("unknown node category '{}' (expected one of: {})", s, known)
        })
    }
}
