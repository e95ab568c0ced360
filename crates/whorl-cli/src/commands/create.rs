//! `create`: scaffold a new Source Tree.

use crate::formatters::format_output;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use whorl_core::cli::{ExitCode, OutputFormat};
use whorl_core::{METADATA_FILE, TypeName};
use whorl_package::{ScaffoldOptions, create_source_tree};

/// Result of scaffolding.
#[derive(Debug, Clone, Serialize)]
pub struct CreateResult {
    /// Item identifier
    pub name: String,
    /// Declared type name
    pub type_name: String,
    /// Source Tree root
    pub root: String,
    /// Files written, relative to the root
    pub files: Vec<String>,
}

/// Runs the `create` command.
pub fn run(options: &ScaffoldOptions, parent: &Path, format: OutputFormat) -> Result<ExitCode> {
    let result = create_item(options, parent)?;
    println!("{}", format_output(&result, format)?);
    Ok(ExitCode::SUCCESS)
}

/// Writes a Source Tree for `options` under `parent`.
///
/// # Errors
///
/// Fails if an option is invalid or the tree already exists.
pub fn create_item(options: &ScaffoldOptions, parent: &Path) -> Result<CreateResult> {
    let root = create_source_tree(parent, options)
        .with_context(|| format!("failed to create item '{}'", options.name))?;

    Ok(CreateResult {
        name: options.name.to_string(),
        type_name: TypeName::from_identifier(&options.name).to_string(),
        root: root.display().to_string(),
        files: vec![format!("{}.wat", options.name), METADATA_FILE.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use whorl_core::{ItemMetadata, ItemName};

    #[test]
    fn test_create_item() {
        let parent = tempfile::tempdir().unwrap();
        let mut options = ScaffoldOptions::new(ItemName::new("magic_lamp").unwrap(), "ada");
        options.categories = vec!["light".to_string()];

        let result = create_item(&options, parent.path()).unwrap();
        assert_eq!(result.type_name, "MagicLamp");

        let root = parent.path().join("magic_lamp");
        for file in &result.files {
            assert!(root.join(file).is_file(), "{file}");
        }
        let meta = ItemMetadata::load(root.join(METADATA_FILE)).unwrap();
        assert_eq!(meta.categories, vec!["light"]);
    }

    #[test]
    fn test_create_existing_fails() {
        let parent = tempfile::tempdir().unwrap();
        let options = ScaffoldOptions::new(ItemName::new("lamp").unwrap(), "ada");
        create_item(&options, parent.path()).unwrap();

        let err = create_item(&options, parent.path()).unwrap_err();
        let core = err.downcast_ref::<whorl_core::Error>().unwrap();
        assert!(core.is_output_exists());
    }
}
