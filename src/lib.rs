//! Architect: architecture-as-code for model-assisted design.
//!
//! Architect keeps a versioned architecture design (modules, entities,
//! endpoints, procedures, pages, ...) as a local document store. A language
//! model proposes changes as `<MutationPartial>` blocks; architect parses
//! them without evaluating anything, applies them with per-record version
//! bumps, and renders every record to a canonical XML snapshot on disk.
//!
//! # Workspace Layout
//!
//! - `openspec/architect/state.json`: the durable store
//! - `openspec/architect/<id segments>`: one XML snapshot per record
//! - `openspec/architect/prompts/`: prompt templates (written by `architect init`)
//! - `openspec/architect/logs/`: raw model responses, one file per run
//! - `openspec/architect/config.toml`: optional model settings
//!
//! A record whose id is also the parent of other ids (`Common.module` next to
//! `Common.module/TaskStatus.enum`) cannot be a file and a directory at once:
//! it keeps no snapshot file and lives only in `state.json`. `architect status`
//! lists such records and `architect show` renders them.
//!
//! # Examples
//!
//! ```bash
//! architect init
//! architect init-architect docs/requirements.md
//! architect refine-architect --prompt "add invoice export" --change add-export
//! architect sync-code-to-architect --path src --dry-run
//! architect status
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, parser, applier, renderer, configuration, model client
//! - [`plugins`]: the init/refine/sync workflows

mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{Cli, Command, RunFlags};
use crate::core::{
    assets,
    config::ModelConfig,
    error::ArchitectError,
    model::OpenAiClient,
    output, render,
    repomap,
    schemas::NodeKind,
    store::{ArchitectState, Store},
};
use crate::plugins::architect::{self, SyncRequest, WorkflowOptions, WorkflowResult};

use clap::Parser;
use colored::Colorize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;

const WARNING_PREVIEW_ITEMS: usize = 5;
const WARNING_PREVIEW_CHARS: usize = 160;

pub fn run() -> Result<(), ArchitectError> {
    let cli = Cli::parse();
    let project_root = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let store = Store::for_project(&project_root);

    match cli.command {
        Command::Init { force } => {
            let written = assets::install_prompts(&store, force)?;
            println!("{} {}", "✓".green(), store.root.display());
            if written.is_empty() {
                println!("  prompts already present (use --force to overwrite)");
            }
            for path in written {
                println!("  wrote {}", path.display());
            }
        }
        Command::InitArchitect { document, flags } => {
            let requirement = fs::read_to_string(&document)?;
            if requirement.trim().is_empty() {
                return Err(ArchitectError::ValidationError(format!(
                    "requirement document {} is empty",
                    document.display()
                )));
            }
            let mut state = store.load()?;
            let client = model_client(&store)?;
            let result = architect::run_init_architect(
                &store,
                &mut state,
                &requirement,
                &client,
                &options(&flags),
            )?;
            print_result(&result, &flags);
        }
        Command::RefineArchitect { prompt, flags } => {
            let mut state = store.load()?;
            let client = model_client(&store)?;
            let result =
                architect::run_refine_architect(&store, &mut state, &prompt, &client, &options(&flags))?;
            print_result(&result, &flags);
        }
        Command::SyncCodeToArchitect {
            paths,
            prompt,
            flags,
        } => {
            let mut state = store.load()?;
            let code_summary = repomap::build_code_summary(&project_root, &paths);
            let request = SyncRequest {
                code_summary: &code_summary,
                user_prompt: prompt.as_deref(),
                macro_only: state.is_initial(),
            };
            let client = model_client(&store)?;
            let result = architect::run_sync_code_to_architect(
                &store,
                &mut state,
                &request,
                &client,
                &options(&flags),
            )?;
            print_result(&result, &flags);
        }
        Command::Apply { file, flags } => {
            let raw = fs::read_to_string(&file)?;
            let mut state = store.load()?;
            let result = architect::run_apply_response(&store, &mut state, &raw, &options(&flags))?;
            print_result(&result, &flags);
        }
        Command::Status { format } => {
            let state = store.load()?;
            print_status(&store, &state, &format)?;
        }
        Command::Show { category, id } => {
            let kind: NodeKind = category.parse().map_err(ArchitectError::ValidationError)?;
            let state = store.load()?;
            let record = state
                .get(kind, &id)
                .ok_or_else(|| ArchitectError::NotFound(format!("{} '{}'", kind, id)))?;
            print!("{}", render::render_node_xml(kind, &id, record));
        }
    }

    Ok(())
}

fn options(flags: &RunFlags) -> WorkflowOptions {
    WorkflowOptions {
        dry_run: flags.dry_run,
        change_id: flags.change.clone(),
    }
}

fn model_client(store: &Store) -> Result<OpenAiClient, ArchitectError> {
    let config = ModelConfig::resolve(&store.root)?;
    eprintln!("{} {} ...", "▸ calling".cyan(), config.model);
    OpenAiClient::new(config)
}

fn print_result(result: &WorkflowResult, flags: &RunFlags) {
    if !result.parse_errors.is_empty() {
        let messages: Vec<String> = result.parse_errors.iter().map(|e| e.to_string()).collect();
        eprintln!(
            "{} {} edit(s) dropped: {}",
            "warning:".yellow().bold(),
            messages.len(),
            output::preview_messages(&messages, WARNING_PREVIEW_ITEMS, WARNING_PREVIEW_CHARS)
        );
    }

    if flags.dry_run {
        println!("{}", "Dry run: nothing was written.".yellow());
        println!("{}", result.raw_response);
        println!();
    }

    if result.applied.is_empty() {
        println!("No mutations applied.");
    } else {
        println!(
            "{} {} mutation(s) {}",
            "✓".green(),
            result.applied.len(),
            if flags.dry_run { "would apply" } else { "applied" }
        );
        for application in &result.applied {
            println!("  {}", application);
        }
    }

    if let Some(path) = &result.mutation_log_path {
        println!("Change log: {}", path.display());
    }
}

fn print_status(store: &Store, state: &ArchitectState, format: &str) -> Result<(), ArchitectError> {
    let blob = match fs::read(store.state_path()) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => state.to_blob()?.into_bytes(),
        Err(e) => return Err(e.into()),
    };
    let mut hasher = Sha256::new();
    hasher.update(&blob);
    let fingerprint = format!("{:x}", hasher.finalize());

    let counts: Vec<(NodeKind, usize)> = state.iter().map(|(kind, bucket)| (kind, bucket.len())).collect();
    let blob_only = render::records_without_snapshot(state, &store.root);

    match format {
        "json" => {
            let counts_json: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(kind, n)| (kind.to_string(), json!(n)))
                .collect();
            let report = json!({
                "root": store.root,
                "initial": state.is_initial(),
                "records": state.len(),
                "fingerprint": fingerprint,
                "counts": counts_json,
                "withoutSnapshot": blob_only
                    .iter()
                    .map(|(kind, id, _)| json!({"category": kind.as_str(), "id": id}))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "text" => {
            println!("{} {}", "Architect workspace:".bold(), store.root.display());
            if state.is_initial() {
                println!("  {}", "initial (no records yet)".yellow());
            }
            for (kind, n) in counts {
                println!("  {:<24} {}", kind.as_str(), n);
            }
            println!("  {:<24} {}", "total", state.len());
            println!("  {:<24} {}", "fingerprint", fingerprint);
            if !blob_only.is_empty() {
                println!(
                    "  {} record(s) have no snapshot file (use `architect show`):",
                    blob_only.len()
                );
                for (kind, id, skip) in &blob_only {
                    let reason = match skip {
                        render::SnapshotSkip::NestedParent => "path holds nested records",
                        render::SnapshotSkip::UnsafePath => "path not allowed",
                    };
                    println!("    {} {} ({})", kind, id, reason);
                }
            }
        }
        other => {
            return Err(ArchitectError::ValidationError(format!(
                "unknown format '{}' (expected 'text' or 'json')",
                other
            )));
        }
    }
    Ok(())
}
