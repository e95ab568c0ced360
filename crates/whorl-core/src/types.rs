//! Strong domain types for Whorl.
//!
//! Identifiers that cross component boundaries are newtypes so that an item
//! name can never be confused with an owner or a type name, and so that
//! validation happens once, at construction.
//!
//! # Examples
//!
//! ```
//! use whorl_core::{ItemName, TypeName};
//!
//! let name = ItemName::new("magic_lamp").unwrap();
//! assert_eq!(TypeName::from_identifier(&name).as_str(), "MagicLamp");
//! ```

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

/// Item identifier (validated newtype over String).
///
/// An identifier starts with a lowercase ASCII letter followed by lowercase
/// letters, digits or underscores. It names the Source Tree directory, the
/// module file stem and the inventory entry.
///
/// # Examples
///
/// ```
/// use whorl_core::ItemName;
///
/// assert!(ItemName::new("widget").is_ok());
/// assert!(ItemName::new("Widget").is_err());
/// assert!(ItemName::new("9lives").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemName(String);

impl ItemName {
    /// Maximum identifier length.
    pub const MAX_LENGTH: usize = 64;

    /// Creates a validated item identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the name is empty, longer than
    /// [`Self::MAX_LENGTH`], or not of the form `^[a-z][a-z0-9_]*$`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::ValidationError {
                field: "name".to_string(),
                reason: "identifier cannot be empty".to_string(),
            });
        }
        if name.len() > Self::MAX_LENGTH {
            return Err(Error::ValidationError {
                field: "name".to_string(),
                reason: format!(
                    "identifier exceeds {} characters: {}",
                    Self::MAX_LENGTH,
                    name.len()
                ),
            });
        }
        if !IDENTIFIER_REGEX.is_match(&name) {
            return Err(Error::ValidationError {
                field: "name".to_string(),
                reason: format!(
                    "'{name}' is not an identifier (expected lowercase letters, digits and underscores, starting with a letter)"
                ),
            });
        }
        Ok(Self(name))
    }

    /// Returns `true` if `name` would be accepted by [`Self::new`].
    #[must_use]
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty() && name.len() <= Self::MAX_LENGTH && IDENTIFIER_REGEX.is_match(name)
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name and returns the inner `String`.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ItemName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> Self {
        name.0
    }
}

impl AsRef<str> for ItemName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Declared type name of an item (the PascalCase form of its identifier).
///
/// # Examples
///
/// ```
/// use whorl_core::{ItemName, TypeName};
///
/// let name = ItemName::new("magic_lamp").unwrap();
/// let ty = TypeName::from_identifier(&name);
/// assert_eq!(ty, "MagicLamp");
/// assert_eq!(ty.archive_file_name(), "MagicLamp.whorl");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// Derives the type name of an identifier.
    ///
    /// Each underscore-separated segment is capitalized and the underscores
    /// are dropped.
    #[must_use]
    pub fn from_identifier(name: &ItemName) -> Self {
        Self(pascal_case(name.as_str()))
    }

    /// Wraps a declared type name read from a module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the type name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the archive file name for this type, `<TypeName>.whorl`.
    #[must_use]
    pub fn archive_file_name(&self) -> String {
        format!("{}.whorl", self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for TypeName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TypeName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

fn pascal_case(identifier: &str) -> String {
    identifier
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect()
}

/// Inventory owner identifier.
///
/// Owners become directory names in the local inventory, so the same rules
/// as any single path component apply.
///
/// # Examples
///
/// ```
/// use whorl_core::OwnerId;
///
/// assert!(OwnerId::new("alice").is_ok());
/// assert!(OwnerId::new("../etc").is_err());
/// assert!(OwnerId::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates a validated owner identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the owner is empty, `.` or
    /// `..`, or contains path separators or control characters.
    pub fn new(owner: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let reason = if owner.trim().is_empty() {
            Some("owner cannot be empty")
        } else if owner == "." || owner == ".." {
            Some("owner cannot be '.' or '..'")
        } else if owner.contains(['/', '\\']) {
            Some("owner cannot contain path separators")
        } else if owner.chars().any(char::is_control) {
            Some("owner cannot contain control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::ValidationError {
                field: "owner".to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(Self(owner)),
        }
    }

    /// Returns the owner as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

/// Transport-safe encoded form of raw item bytes.
///
/// Produced and consumed by `whorl_codec::envelope`. The contents are plain
/// ASCII and may be stored or transmitted as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(String);

impl Envelope {
    /// Wraps already-encoded text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the encoded text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the envelope and returns the encoded text.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Length of the encoded text in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the envelope holds no text.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Memory limit for a sandboxed item, in bytes.
///
/// # Examples
///
/// ```
/// use whorl_core::MemoryLimit;
///
/// let limit = MemoryLimit::from_mb(16);
/// assert_eq!(limit.bytes(), 16 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryLimit(usize);

impl MemoryLimit {
    /// Creates a limit from a byte count.
    #[must_use]
    pub const fn from_bytes(bytes: usize) -> Self {
        Self(bytes)
    }

    /// Creates a limit from megabytes, saturating on overflow.
    #[must_use]
    pub const fn from_mb(mb: usize) -> Self {
        Self(mb.saturating_mul(1024 * 1024))
    }

    /// Returns the limit in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0
    }
}
