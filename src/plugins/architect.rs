//! Architect workflows: one load → prompt → model → parse → apply → save cycle.
//!
//! Three entry points share the same tail:
//! - `init`: split a requirement document into macro modules
//! - `refine`: adjust the design from an operator instruction
//! - `sync`: reconcile the design with a source-tree digest
//!
//! plus `apply`, which replays a saved response without calling the model.
//! In dry-run mode edits are applied to a clone and nothing is written.

use crate::core::error::ArchitectError;
use crate::core::model::{ChatMessage, GenerationService};
use crate::core::mutation::{ApplyOutcome, MutationApplication, apply_mutation_text};
use crate::core::schemas::{
    CHANGES_DIR, PROMPT_DSL_EXAMPLES, PROMPT_DSL_OUTPUT, PROMPT_DSL_STRUCTURE,
};
use crate::core::store::{ArchitectState, Store};
use crate::core::summary::summarise_state_json;
use crate::core::time;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Init,
    Refine,
    Sync,
    Apply,
}

impl WorkflowKind {
    pub fn log_prefix(self) -> &'static str {
        match self {
            WorkflowKind::Init => "init",
            WorkflowKind::Refine => "refine",
            WorkflowKind::Sync => "sync",
            WorkflowKind::Apply => "apply",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    /// Parse and apply against a copy; leave disk untouched.
    pub dry_run: bool,
    /// File the change log under `openspec/changes/<id>/architect/`.
    pub change_id: Option<String>,
}

#[derive(Debug)]
pub struct WorkflowResult {
    pub applied: Vec<MutationApplication>,
    /// Edits dropped because their payload could not be read.
    pub parse_errors: Vec<ArchitectError>,
    pub raw_response: String,
    /// Change-log entry, relative to the project root.
    pub mutation_log_path: Option<PathBuf>,
}

pub struct SyncRequest<'a> {
    pub code_summary: &'a str,
    pub user_prompt: Option<&'a str>,
    /// First sync on an empty store: ask for macro modules only.
    pub macro_only: bool,
}

/// Read a prompt from `prompts/`, trimmed. `None` when absent or blank.
pub fn maybe_load_prompt(store: &Store, file_name: &str) -> Option<String> {
    let content = fs::read_to_string(store.prompt_dir().join(file_name)).ok()?;
    let trimmed = content.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn load_prompt(store: &Store, file_name: &str) -> Result<String, ArchitectError> {
    maybe_load_prompt(store, file_name).ok_or_else(|| {
        ArchitectError::ConfigError(format!(
            "missing architect prompt: {}. Run `architect init` to restore it.",
            store.prompt_dir().join(file_name).display()
        ))
    })
}

fn schema_messages(store: &Store, examples_required: bool) -> Result<Vec<ChatMessage>, ArchitectError> {
    let mut messages = vec![
        ChatMessage::system(load_prompt(store, PROMPT_DSL_STRUCTURE)?),
        ChatMessage::system(load_prompt(store, PROMPT_DSL_OUTPUT)?),
    ];
    let examples = if examples_required {
        Some(load_prompt(store, PROMPT_DSL_EXAMPLES)?)
    } else {
        maybe_load_prompt(store, PROMPT_DSL_EXAMPLES)
    };
    if let Some(examples) = examples {
        messages.push(ChatMessage::system(examples));
    }
    Ok(messages)
}

pub fn init_messages(store: &Store, requirement: &str) -> Result<Vec<ChatMessage>, ArchitectError> {
    let mut messages = schema_messages(store, true)?;
    messages.push(ChatMessage::user(format!(
        "The requirement document follows. Split it into macro modules and emit only Create \
         directives for Module and ModuleRelationDiagram; do not produce any other DSL category.\n\n{}",
        requirement
    )));
    Ok(messages)
}

pub fn refine_messages(
    store: &Store,
    state: &ArchitectState,
    user_prompt: &str,
) -> Result<Vec<ChatMessage>, ArchitectError> {
    let user_prompt = user_prompt.trim();
    if user_prompt.is_empty() {
        return Err(ArchitectError::ValidationError(
            "refine needs a non-empty --prompt describing the architecture change".to_string(),
        ));
    }
    let mut messages = schema_messages(store, true)?;
    messages.push(ChatMessage::user(format!(
        "Current DSL state (for reference; do not repeat nodes that already exist):\n{}",
        summarise_state_json(state)?
    )));
    messages.push(ChatMessage::user(format!(
        "Based on the state above, extend or adjust the architecture for the request below. \
         Keep the output lean and return only the MutationPartial blocks that are needed.\n\n{}",
        user_prompt
    )));
    Ok(messages)
}

pub fn sync_messages(
    store: &Store,
    state: &ArchitectState,
    request: &SyncRequest<'_>,
) -> Result<Vec<ChatMessage>, ArchitectError> {
    let mut instructions = vec![
        "Identify or complete the macro architecture elements from the code digest below.".to_string(),
        if request.macro_only {
            "This is the first sync: split modules and establish the key relations first, without going into detail."
        } else {
            "This is an incremental sync: update only the modules or details that need it."
        }
        .to_string(),
    ];
    if let Some(extra) = request.user_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        instructions.push(format!("Additional guidance: {}", extra));
    }

    let mut messages = schema_messages(store, false)?;
    messages.push(ChatMessage::user(format!(
        "Current DSL state (for reference):\n{}",
        summarise_state_json(state)?
    )));
    messages.push(ChatMessage::user(format!("Code digest:\n{}", request.code_summary)));
    messages.push(ChatMessage::user(instructions.join("\n")));
    messages.retain(|m| !m.content.trim().is_empty());
    Ok(messages)
}

pub fn run_init_architect(
    store: &Store,
    state: &mut ArchitectState,
    requirement: &str,
    service: &dyn GenerationService,
    options: &WorkflowOptions,
) -> Result<WorkflowResult, ArchitectError> {
    let messages = init_messages(store, requirement)?;
    let raw = service.complete(&messages)?;
    finish_workflow(store, state, raw, WorkflowKind::Init, options)
}

pub fn run_refine_architect(
    store: &Store,
    state: &mut ArchitectState,
    user_prompt: &str,
    service: &dyn GenerationService,
    options: &WorkflowOptions,
) -> Result<WorkflowResult, ArchitectError> {
    let messages = refine_messages(store, state, user_prompt)?;
    let raw = service.complete(&messages)?;
    finish_workflow(store, state, raw, WorkflowKind::Refine, options)
}

pub fn run_sync_code_to_architect(
    store: &Store,
    state: &mut ArchitectState,
    request: &SyncRequest<'_>,
    service: &dyn GenerationService,
    options: &WorkflowOptions,
) -> Result<WorkflowResult, ArchitectError> {
    let messages = sync_messages(store, state, request)?;
    let raw = service.complete(&messages)?;
    finish_workflow(store, state, raw, WorkflowKind::Sync, options)
}

/// Apply a response captured earlier (e.g. a change-log entry).
pub fn run_apply_response(
    store: &Store,
    state: &mut ArchitectState,
    raw_response: &str,
    options: &WorkflowOptions,
) -> Result<WorkflowResult, ArchitectError> {
    finish_workflow(store, state, raw_response.trim().to_string(), WorkflowKind::Apply, options)
}

fn finish_workflow(
    store: &Store,
    state: &mut ArchitectState,
    raw_response: String,
    kind: WorkflowKind,
    options: &WorkflowOptions,
) -> Result<WorkflowResult, ArchitectError> {
    let outcome = apply_and_persist(store, state, &raw_response, options)?;
    let mutation_log_path = if options.dry_run {
        None
    } else {
        log_mutations(store, &raw_response, options.change_id.as_deref(), kind.log_prefix())?
    };
    info!(
        workflow = kind.log_prefix(),
        applied = outcome.applications.len(),
        dropped = outcome.errors.len(),
        dry_run = options.dry_run,
        "architect workflow finished"
    );
    Ok(WorkflowResult {
        applied: outcome.applications,
        parse_errors: outcome.errors,
        raw_response,
        mutation_log_path,
    })
}

fn apply_and_persist(
    store: &Store,
    state: &mut ArchitectState,
    raw_response: &str,
    options: &WorkflowOptions,
) -> Result<ApplyOutcome, ArchitectError> {
    if options.dry_run {
        let mut preview = state.clone();
        return apply_mutation_text(&mut preview, raw_response);
    }
    let outcome = apply_mutation_text(state, raw_response)?;
    store.save(state)?;
    Ok(outcome)
}

/// Append the raw response to the change log. Returns the entry path relative
/// to the project root, or `None` for a blank response.
pub fn log_mutations(
    store: &Store,
    raw_response: &str,
    change_id: Option<&str>,
    prefix: &str,
) -> Result<Option<PathBuf>, ArchitectError> {
    let trimmed = raw_response.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let dir = match change_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => {
            validate_change_id(id)?;
            store.project_root.join(CHANGES_DIR).join(id).join("architect")
        }
        None => store.log_dir(),
    };
    fs::create_dir_all(&dir)?;

    let path = dir.join(time::log_file_name(prefix));
    fs::write(&path, format!("{}\n", trimmed))?;
    Ok(Some(relative_to(&store.project_root, &path)))
}

fn validate_change_id(id: &str) -> Result<(), ArchitectError> {
    if id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(ArchitectError::ValidationError(format!(
            "change id '{}' must be a single path segment",
            id
        )));
    }
    Ok(())
}

fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}
