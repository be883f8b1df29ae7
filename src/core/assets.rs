//! Embedded prompt templates.
//!
//! The default architect prompts are baked into the binary and written into a
//! workspace's `prompts/` directory by `architect init`. Operators may edit the
//! written copies; workflows always read from disk.

use crate::core::error::ArchitectError;
use crate::core::store::Store;
use std::fs;
use std::path::PathBuf;

/// Macro to embed prompt templates at compile time as text.
///
/// Generates:
/// - Public constants for each embedded template
/// - `get_template(name)` function for lookup
/// - `list_templates()` function for discovery
macro_rules! embedded_templates {
    ($($name:expr => $const_name:ident),* $(,)?) => {
        $(
            pub const $const_name: &str =
                include_str!(concat!("../../templates/architect/", $name));
        )*

        pub fn get_template(name: &str) -> Option<&'static str> {
            match name {
                $( $name => Some($const_name), )*
                _ => None,
            }
        }

        pub fn list_templates() -> Vec<&'static str> {
            vec![ $( $name, )* ]
        }
    };
}

embedded_templates! {
    "dsl-structure.md" => EMBEDDED_DSL_STRUCTURE,
    "dsl-output.md" => EMBEDDED_DSL_OUTPUT,
    "dsl-examples.md" => EMBEDDED_DSL_EXAMPLES,
}

/// Write the embedded prompts into the workspace. Existing files are kept
/// unless `force` is set. Returns the files written.
pub fn install_prompts(store: &Store, force: bool) -> Result<Vec<PathBuf>, ArchitectError> {
    store.ensure()?;
    let mut written = Vec::new();
    for name in list_templates() {
        let path = store.prompt_dir().join(name);
        if path.exists() && !force {
            continue;
        }
        let content = get_template(name).unwrap_or_default();
        fs::write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}
