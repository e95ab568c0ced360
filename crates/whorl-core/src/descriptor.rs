//! Item descriptors and the declarative metadata file.
//!
//! A Source Tree carries its metadata in `meta.toml`. The file is parsed as
//! data, never executed, and validated before any descriptor is built from
//! it.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use whorl_core::{ItemDescriptor, ItemMetadata};
//!
//! let text = r#"
//! name = "magic_lamp"
//! author = "ada"
//! version = "1.0.0"
//! description = "A lamp that grants one wish."
//! categories = ["light", "magic"]
//! "#;
//!
//! let meta = ItemMetadata::parse(text, Path::new("meta.toml")).unwrap();
//! let descriptor = ItemDescriptor::from_metadata(&meta);
//! assert_eq!(descriptor.name().as_str(), "magic_lamp");
//! assert_eq!(descriptor.display_name, "Magic Lamp");
//! assert!(descriptor.consumable);
//! ```

use crate::{Error, ItemName, Result, TypeName};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// File name of the metadata file inside a Source Tree and an archive.
pub const METADATA_FILE: &str = "meta.toml";

/// Keys that every metadata file must define.
pub const REQUIRED_METADATA_KEYS: [&str; 4] = ["name", "author", "version", "description"];

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.\-+]+)?$").expect("valid regex")
});

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Human-readable name derived from an identifier (`magic_lamp` -> `Magic Lamp`).
#[must_use]
pub fn display_name_for(name: &ItemName) -> String {
    name.as_str()
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Deserialize)]
struct RawMetadata {
    name: String,
    author: String,
    version: String,
    description: String,
    #[serde(default)]
    nice_name: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    consumable: Option<bool>,
    #[serde(default)]
    created_date: Option<toml::Value>,
}

/// Parsed and validated contents of a metadata file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemMetadata {
    /// Item identifier
    pub name: ItemName,
    /// Optional human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nice_name: Option<String>,
    /// Item author
    pub author: String,
    /// Semantic version string
    pub version: String,
    /// Non-empty description
    pub description: String,
    /// Category labels
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Optional non-negative price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Optional non-negative weight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Whether the item is consumed on use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumable: Option<bool>,
    /// Creation date
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_date"
    )]
    pub created_date: Option<NaiveDate>,
}

#[allow(clippy::ref_option)]
fn serialize_date<S: serde::Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match date {
        Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
        None => serializer.serialize_none(),
    }
}

impl ItemMetadata {
    /// Parses and validates metadata text.
    ///
    /// `path` is only used to label errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataError`] if the text is not valid TOML, if any
    /// required key is missing (all missing keys are listed), or if a field
    /// fails validation.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let metadata_error = |reason: String| Error::MetadataError {
            path: path.to_path_buf(),
            reason,
        };

        let table: toml::Table =
            toml::from_str(text).map_err(|e| metadata_error(format!("not valid TOML: {e}")))?;

        let missing: Vec<&str> = REQUIRED_METADATA_KEYS
            .iter()
            .copied()
            .filter(|key| !table.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(metadata_error(format!(
                "missing required keys: {}",
                missing.join(", ")
            )));
        }

        let raw: RawMetadata =
            toml::from_str(text).map_err(|e| metadata_error(format!("invalid field: {e}")))?;

        let name = ItemName::new(raw.name.clone())
            .map_err(|_| metadata_error(format!("'name' is not an identifier: '{}'", raw.name)))?;

        if !VERSION_REGEX.is_match(&raw.version) {
            return Err(metadata_error(format!(
                "'version' is not a semantic version: '{}'",
                raw.version
            )));
        }
        if raw.author.trim().is_empty() {
            return Err(metadata_error("'author' must not be empty".to_string()));
        }
        if raw.description.trim().is_empty() {
            return Err(metadata_error("'description' must not be empty".to_string()));
        }
        for (key, value) in [("price", raw.price), ("weight", raw.weight)] {
            if let Some(value) = value
                && (!value.is_finite() || value < 0.0)
            {
                return Err(metadata_error(format!(
                    "'{key}' must be a non-negative number, got {value}"
                )));
            }
        }

        let created_date = raw
            .created_date
            .map(|value| parse_date(&value))
            .transpose()
            .map_err(metadata_error)?;

        Ok(Self {
            name,
            nice_name: raw.nice_name.filter(|n| !n.trim().is_empty()),
            author: raw.author,
            version: raw.version,
            description: raw.description,
            categories: raw.categories,
            price: raw.price,
            weight: raw.weight,
            consumable: raw.consumable,
            created_date,
        })
    }

    /// Reads and parses a metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureError`] if the file cannot be read and
    /// [`Error::MetadataError`] if its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::StructureError {
            path: path.to_path_buf(),
            reason: format!("cannot read metadata file: {e}"),
        })?;
        Self::parse(&text, path)
    }

    /// Renders the metadata back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataError`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::MetadataError {
            path: PathBuf::from(METADATA_FILE),
            reason: format!("cannot serialize metadata: {e}"),
        })
    }

    /// Declared type name implied by the metadata's identifier.
    #[must_use]
    pub fn type_name(&self) -> TypeName {
        TypeName::from_identifier(&self.name)
    }
}

fn parse_date(value: &toml::Value) -> std::result::Result<NaiveDate, String> {
    let text = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Datetime(dt) => dt.to_string(),
        other => {
            return Err(format!(
                "'created_date' must be a YYYY-MM-DD date, got {}",
                other.type_str()
            ));
        }
    };
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|_| format!("'created_date' must be a YYYY-MM-DD date, got '{text}'"))
}

/// Structured metadata record of an item.
///
/// The item's `name` is fixed at construction and has no setter; every other
/// field may be adjusted before the descriptor is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    name: ItemName,
    /// Human-readable name
    pub display_name: String,
    /// Item author
    pub author: String,
    /// Semantic version string
    pub version: String,
    /// Non-empty description
    pub description: String,
    /// Category labels (order-irrelevant)
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// Non-negative weight
    pub weight: f64,
    /// Whether the item is removed from the inventory after a successful use
    pub consumable: bool,
    /// Optional non-negative price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Creation date
    pub created_date: NaiveDate,
}

impl ItemDescriptor {
    /// Default weight of an item.
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    /// Default version for items acquired without metadata.
    pub const DEFAULT_VERSION: &'static str = "1.0.0";

    /// Builds a descriptor from validated metadata.
    ///
    /// Absent optional fields take their defaults: weight 1, consumable,
    /// no price, created today.
    #[must_use]
    pub fn from_metadata(meta: &ItemMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            display_name: meta
                .nice_name
                .clone()
                .unwrap_or_else(|| display_name_for(&meta.name)),
            author: meta.author.clone(),
            version: meta.version.clone(),
            description: meta.description.clone(),
            categories: meta.categories.iter().cloned().collect(),
            weight: meta.weight.unwrap_or(Self::DEFAULT_WEIGHT),
            consumable: meta.consumable.unwrap_or(true),
            price: meta.price,
            created_date: meta
                .created_date
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
        }
    }

    /// Builds a descriptor for an item that ships without metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// use whorl_core::{ItemDescriptor, ItemName};
    ///
    /// let name = ItemName::new("pebble").unwrap();
    /// let descriptor = ItemDescriptor::with_defaults(name, "ada");
    /// assert_eq!(descriptor.version, "1.0.0");
    /// assert!((descriptor.weight - 1.0).abs() < f64::EPSILON);
    /// assert!(!descriptor.description.is_empty());
    /// ```
    #[must_use]
    pub fn with_defaults(name: ItemName, author: impl Into<String>) -> Self {
        let display_name = display_name_for(&name);
        Self {
            description: format!("A {} with no special properties.", name.as_str()),
            display_name,
            author: author.into(),
            version: Self::DEFAULT_VERSION.to_string(),
            categories: BTreeSet::new(),
            weight: Self::DEFAULT_WEIGHT,
            consumable: true,
            price: None,
            created_date: chrono::Local::now().date_naive(),
            name,
        }
    }

    /// Item identifier.
    #[must_use]
    pub const fn name(&self) -> &ItemName {
        &self.name
    }

    /// Declared type name implied by the identifier.
    #[must_use]
    pub fn type_name(&self) -> TypeName {
        TypeName::from_identifier(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "widget"
author = "a"
version = "1.0.0"
description = "d"
"#;

    fn parse(text: &str) -> Result<ItemMetadata> {
        ItemMetadata::parse(text, Path::new("widget/meta.toml"))
    }

    #[test]
    fn test_parse_minimal_metadata() {
        let meta = parse(MINIMAL).unwrap();
        assert_eq!(meta.name.as_str(), "widget");
        assert_eq!(meta.author, "a");
        assert!(meta.categories.is_empty());
        assert!(meta.created_date.is_none());
    }

    #[test]
    fn test_missing_keys_are_all_reported() {
        let err = parse("name = \"widget\"\n").unwrap_err();
        assert!(err.is_metadata_error());
        let message = err.to_string();
        for key in ["author", "version", "description"] {
            assert!(message.contains(key), "{message} should list {key}");
        }
        assert!(!message.contains("name,"));
    }

    #[test]
    fn test_invalid_toml_is_metadata_error() {
        let err = parse("name = ").unwrap_err();
        assert!(err.is_metadata_error());
        assert!(err.to_string().contains("not valid TOML"));
    }

    #[test]
    fn test_wrong_field_type_is_metadata_error() {
        let text = format!("{MINIMAL}weight = \"heavy\"\n");
        assert!(parse(&text).unwrap_err().is_metadata_error());
    }

    #[test]
    fn test_rejects_non_identifier_name() {
        let text = MINIMAL.replace("\"widget\"", "\"Widget\"");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("not an identifier"));
    }

    #[test]
    fn test_rejects_bad_version() {
        let text = MINIMAL.replace("1.0.0", "one");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("semantic version"));
    }

    #[test]
    fn test_accepts_prerelease_version() {
        let text = MINIMAL.replace("1.0.0", "2.1.0-beta.1");
        assert_eq!(parse(&text).unwrap().version, "2.1.0-beta.1");
    }

    #[test]
    fn test_rejects_empty_description() {
        let text = MINIMAL.replace("description = \"d\"", "description = \"  \"");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn test_rejects_negative_price() {
        let text = format!("{MINIMAL}price = -3.5\n");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn test_integer_weight_is_accepted() {
        let text = format!("{MINIMAL}weight = 3\n");
        assert_eq!(parse(&text).unwrap().weight, Some(3.0));
    }

    #[test]
    fn test_created_date_as_string_and_toml_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let quoted = format!("{MINIMAL}created_date = \"2024-03-09\"\n");
        assert_eq!(parse(&quoted).unwrap().created_date, Some(expected));

        let bare = format!("{MINIMAL}created_date = 2024-03-09\n");
        assert_eq!(parse(&bare).unwrap().created_date, Some(expected));
    }

    #[test]
    fn test_created_date_rejects_other_formats() {
        let text = format!("{MINIMAL}created_date = \"09/03/2024\"\n");
        assert!(parse(&text).unwrap_err().is_metadata_error());
    }

    #[test]
    fn test_load_missing_file_is_structure_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ItemMetadata::load(dir.path().join(METADATA_FILE)).unwrap_err();
        assert!(err.is_structure_error());
    }

    #[test]
    fn test_descriptor_defaults_from_metadata() {
        let descriptor = ItemDescriptor::from_metadata(&parse(MINIMAL).unwrap());
        assert_eq!(descriptor.display_name, "Widget");
        assert!((descriptor.weight - 1.0).abs() < f64::EPSILON);
        assert!(descriptor.consumable);
        assert!(descriptor.price.is_none());
        assert_eq!(descriptor.type_name(), "Widget");
    }

    #[test]
    fn test_descriptor_honours_optional_fields() {
        let text = format!(
            "{MINIMAL}nice_name = \"The Widget\"\ncategories = [\"b\", \"a\", \"b\"]\nconsumable = false\nprice = 2.5\n"
        );
        let descriptor = ItemDescriptor::from_metadata(&parse(&text).unwrap());
        assert_eq!(descriptor.display_name, "The Widget");
        assert_eq!(
            descriptor.categories.iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(!descriptor.consumable);
        assert_eq!(descriptor.price, Some(2.5));
    }

    #[test]
    fn test_metadata_toml_round_trip() {
        let text = format!("{MINIMAL}categories = [\"x\"]\ncreated_date = \"2024-01-02\"\n");
        let meta = parse(&text).unwrap();
        let rendered = meta.to_toml_string().unwrap();
        assert_eq!(parse(&rendered).unwrap(), meta);
    }

    #[test]
    fn test_descriptor_json_round_trip() {
        let descriptor = ItemDescriptor::from_metadata(&parse(MINIMAL).unwrap());
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: ItemDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_display_name_for() {
        let name = ItemName::new("magic_lamp").unwrap();
        assert_eq!(display_name_for(&name), "Magic Lamp");
    }
}
