//! CLI struct definitions for the architect command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "architect",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keeps a versioned architecture design in sync with requirements and code through model-proposed MutationPartial edits."
)]
pub(crate) struct Cli {
    /// Project root (defaults to the current directory).
    #[clap(long, global = true)]
    pub project: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct RunFlags {
    /// Apply against a copy and print the result; write nothing.
    #[clap(long)]
    pub dry_run: bool,
    /// File the change log under openspec/changes/<ID>/architect/.
    #[clap(long = "change", value_name = "ID")]
    pub change: Option<String>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create openspec/architect/ and write the default prompts
    Init {
        /// Overwrite prompts that already exist
        #[clap(long)]
        force: bool,
    },

    /// Split a requirement document into macro modules
    #[clap(name = "init-architect")]
    InitArchitect {
        /// Path to the requirement document
        document: PathBuf,
        #[clap(flatten)]
        flags: RunFlags,
    },

    /// Extend or adjust the design from an instruction
    #[clap(name = "refine-architect")]
    RefineArchitect {
        /// What to change
        #[clap(long)]
        prompt: String,
        #[clap(flatten)]
        flags: RunFlags,
    },

    /// Reconcile the design with the current source tree
    #[clap(name = "sync-code-to-architect")]
    SyncCodeToArchitect {
        /// Directories to scan (default: src, app, api)
        #[clap(long = "path", value_name = "DIR")]
        paths: Vec<String>,
        /// Extra guidance for the model
        #[clap(long)]
        prompt: Option<String>,
        #[clap(flatten)]
        flags: RunFlags,
    },

    /// Apply a saved model response without calling the model
    Apply {
        /// File holding MutationPartial blocks
        file: PathBuf,
        #[clap(flatten)]
        flags: RunFlags,
    },

    /// Show per-category counts and the state fingerprint
    Status {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },

    /// Print the rendered snapshot of one record
    Show {
        /// Category tag, e.g. Module or HttpEndpoint
        category: String,
        /// Record id
        id: String,
    },
}
