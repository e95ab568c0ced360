//! New Source Tree scaffolding.
//!
//! Writes `<parent>/<identifier>/<identifier>.wat` and `meta.toml` for a new
//! item. The generated module already satisfies the item interface:
//! `describe` returns the item description and `use` emits one line.

use crate::builder::MODULE_EXTENSION;
use chrono::{Local, NaiveDate};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;
use whorl_core::{
    Error, ItemMetadata, ItemName, METADATA_FILE, Result, TypeName, display_name_for,
};

const WASM_PAGE: usize = 64 * 1024;

/// Default version of a scaffolded item.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Values for a new Source Tree.
///
/// Only the identifier and author are required; every other field has a
/// default derived from the identifier.
#[derive(Debug, Clone)]
pub struct ScaffoldOptions {
    /// Item identifier
    pub name: ItemName,
    /// Item author
    pub author: String,
    /// Human-readable name (defaults to the title-cased identifier)
    pub nice_name: Option<String>,
    /// Version string (defaults to `1.0.0`)
    pub version: Option<String>,
    /// Description (defaults to `A <identifier> item`)
    pub description: Option<String>,
    /// Category labels
    pub categories: Vec<String>,
    /// Optional price
    pub price: Option<f64>,
    /// Optional weight
    pub weight: Option<f64>,
    /// Whether the item is consumed on use
    pub consumable: Option<bool>,
    /// Creation date (defaults to today)
    pub created_date: Option<NaiveDate>,
}

impl ScaffoldOptions {
    /// Options with defaults for everything but `name` and `author`.
    #[must_use]
    pub fn new(name: ItemName, author: impl Into<String>) -> Self {
        Self {
            name,
            author: author.into(),
            nice_name: None,
            version: None,
            description: None,
            categories: Vec::new(),
            price: None,
            weight: None,
            consumable: None,
            created_date: None,
        }
    }

    fn metadata(&self) -> Result<ItemMetadata> {
        let metadata = ItemMetadata {
            name: self.name.clone(),
            nice_name: Some(
                self.nice_name
                    .clone()
                    .unwrap_or_else(|| display_name_for(&self.name)),
            ),
            author: self.author.clone(),
            version: self
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| format!("A {} item", self.name)),
            categories: self.categories.clone(),
            price: self.price,
            weight: self.weight,
            consumable: self.consumable,
            created_date: Some(
                self.created_date
                    .unwrap_or_else(|| Local::now().date_naive()),
            ),
        };
        // Scaffolded metadata passes the same checks as a hand-written file.
        ItemMetadata::parse(&metadata.to_toml_string()?, Path::new(METADATA_FILE))
    }
}

/// Escapes `text` as the contents of a WebAssembly text string literal.
fn escape_wat_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\{byte:02x}");
            }
        }
    }
    out
}

/// Renders the module template for `metadata`.
#[must_use]
pub fn module_template(metadata: &ItemMetadata) -> String {
    let type_name = metadata.type_name();
    let display = metadata
        .nice_name
        .clone()
        .unwrap_or_else(|| display_name_for(&metadata.name));
    let description = metadata.description.as_str();
    let use_message = format!("You use the {display}.");

    let use_offset = description.len().next_multiple_of(16).max(64);
    let pages = (use_offset + use_message.len()).div_ceil(WASM_PAGE).max(1);

    format!(
        r#";; {type_name} item.
(module ${type_name}
  (import "whorl" "emit" (func $emit (param i32 i32)))
  (memory (export "memory") {pages})
  (data (i32.const 0) "{description_lit}")
  (data (i32.const {use_offset}) "{use_lit}")

  (func (export "describe") (result i32 i32)
    (i32.const 0) (i32.const {description_len}))

  (func $use (export "use") (result i32)
    (call $emit (i32.const {use_offset}) (i32.const {use_len}))
    (i32.const 0)))
"#,
        description_lit = escape_wat_string(description),
        description_len = description.len(),
        use_lit = escape_wat_string(&use_message),
        use_len = use_message.len(),
    )
}

/// Writes a new Source Tree under `parent` and returns its root.
///
/// # Errors
///
/// - [`Error::MetadataError`] if an option fails metadata validation
/// - [`Error::OutputExistsError`] if `<parent>/<identifier>` already exists
/// - [`Error::Io`] if the files cannot be written
///
/// # Examples
///
/// ```
/// use whorl_core::ItemName;
/// use whorl_package::{ScaffoldOptions, create_source_tree};
///
/// let parent = tempfile::tempdir().unwrap();
/// let options = ScaffoldOptions::new(ItemName::new("thermocube").unwrap(), "ada");
/// let root = create_source_tree(parent.path(), &options).unwrap();
///
/// assert!(root.join("thermocube.wat").is_file());
/// assert!(root.join("meta.toml").is_file());
/// ```
pub fn create_source_tree(parent: &Path, options: &ScaffoldOptions) -> Result<PathBuf> {
    let metadata = options.metadata()?;
    let metadata_text = metadata.to_toml_string()?;
    let module_text = module_template(&metadata);

    let root = parent.join(metadata.name.as_str());
    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    std::fs::create_dir(&root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Error::OutputExistsError { path: root.clone() }
        } else {
            Error::io(&root, e)
        }
    })?;

    let module_path = root.join(format!("{}.{MODULE_EXTENSION}", metadata.name));
    std::fs::write(&module_path, module_text).map_err(|e| Error::io(&module_path, e))?;
    let metadata_path = root.join(METADATA_FILE);
    std::fs::write(&metadata_path, metadata_text).map_err(|e| Error::io(&metadata_path, e))?;

    info!(
        item = %metadata.name,
        type_name = %TypeName::from_identifier(&metadata.name),
        root = %root.display(),
        "source tree created"
    );
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(name: &str) -> ScaffoldOptions {
        ScaffoldOptions::new(ItemName::new(name).unwrap(), "ada")
    }

    #[test]
    fn test_defaults() {
        let meta = options("magic_lamp").metadata().unwrap();
        assert_eq!(meta.nice_name.as_deref(), Some("Magic Lamp"));
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.description, "A magic_lamp item");
        assert!(meta.created_date.is_some());
    }

    #[test]
    fn test_invalid_option_rejected() {
        let mut opts = options("lamp");
        opts.version = Some("one".to_string());
        assert!(opts.metadata().unwrap_err().is_metadata_error());

        let mut opts = options("lamp");
        opts.price = Some(-1.0);
        assert!(opts.metadata().unwrap_err().is_metadata_error());
    }

    #[test]
    fn test_escape_wat_string() {
        assert_eq!(escape_wat_string(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
        assert_eq!(escape_wat_string("caf\u{e9}"), "caf\\c3\\a9");
        assert_eq!(escape_wat_string("a\nb"), "a\\0ab");
    }

    #[test]
    fn test_template_parses_with_byte_lengths() {
        let mut opts = options("lamp");
        opts.description = Some("Un caf\u{e9} \"chaud\".".to_string());
        let meta = opts.metadata().unwrap();
        let text = module_template(&meta);
        assert!(text.starts_with(";; Lamp item.\n(module $Lamp"));
        assert!(text.contains(&format!("(i32.const {})", meta.description.len())));
        wat::parse_str(&text).unwrap();
    }

    #[test]
    fn test_create_refuses_existing_directory() {
        let parent = tempfile::tempdir().unwrap();
        std::fs::create_dir(parent.path().join("lamp")).unwrap();
        let err = create_source_tree(parent.path(), &options("lamp")).unwrap_err();
        assert!(err.is_output_exists());
    }

    #[test]
    fn test_created_metadata_loads() {
        let parent = tempfile::tempdir().unwrap();
        let root = create_source_tree(parent.path(), &options("lamp")).unwrap();
        let meta = ItemMetadata::load(root.join(METADATA_FILE)).unwrap();
        assert_eq!(meta.name.as_str(), "lamp");
        assert_eq!(meta.author, "ada");
    }
}
