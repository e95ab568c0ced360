//! The item capability contract.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Capability contract shared by every item.
///
/// An item can describe itself and can be used. Implementations must not
/// retain state between calls; each call observes a freshly constructed
/// item.
pub trait Item {
    /// Returns the item's human-readable description.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be materialized or fails while
    /// describing itself.
    fn describe(&self) -> Result<String>;

    /// Uses the item with the given context.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be materialized or reports a
    /// failure.
    fn use_item(&self, ctx: &UseContext) -> Result<UseOutcome>;
}

/// Context handed to an item when it is used.
///
/// Delivered to the item as JSON.
///
/// # Examples
///
/// ```
/// use whorl_core::traits::UseContext;
///
/// let args = vec!["--target".to_string(), "door".to_string(), "-q".to_string()];
/// let ctx = UseContext::new("ada", "/home/ada")
///     .with_args(UseContext::parse_flags(&args).unwrap());
///
/// assert_eq!(ctx.args.get("target").map(String::as_str), Some("door"));
/// assert_eq!(ctx.args.get("q").map(String::as_str), Some(""));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseContext {
    /// Inventory owner using the item
    pub owner: String,
    /// Working directory of the invoking process
    pub working_dir: PathBuf,
    /// Flag arguments (`--key value`)
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl UseContext {
    /// Creates a context with no arguments.
    #[must_use]
    pub fn new(owner: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            owner: owner.into(),
            working_dir: working_dir.into(),
            args: BTreeMap::new(),
        }
    }

    /// Replaces the argument map.
    #[must_use]
    pub fn with_args(mut self, args: BTreeMap<String, String>) -> Self {
        self.args = args;
        self
    }

    /// Parses `-k value`, `--key value` and `--key=value` flags.
    ///
    /// A flag followed by another flag, or by nothing, gets an empty value.
    /// Repeated flags keep the last value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a positional argument that does
    /// not follow a flag, or for a malformed flag name.
    pub fn parse_flags(args: &[String]) -> Result<BTreeMap<String, String>> {
        let mut flags = BTreeMap::new();
        let mut iter = args.iter().peekable();

        while let Some(arg) = iter.next() {
            let Some(stripped) = arg
                .strip_prefix("--")
                .or_else(|| arg.strip_prefix('-'))
            else {
                return Err(Error::InvalidArgument(format!(
                    "unexpected argument '{arg}' (expected --flag [value])"
                )));
            };

            let (key, inline_value) = match stripped.split_once('=') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (stripped, None),
            };

            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(Error::InvalidArgument(format!("invalid flag '{arg}'")));
            }

            let value = match inline_value {
                Some(value) => value,
                None => match iter.peek() {
                    Some(next) if !next.starts_with('-') => {
                        iter.next().cloned().unwrap_or_default()
                    }
                    _ => String::new(),
                },
            };

            flags.insert(key.to_string(), value);
        }

        Ok(flags)
    }

    /// Serializes the context to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidArgument(format!("cannot serialize use context: {e}")))
    }
}

/// Result of using an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseOutcome {
    /// Status returned by the item; `0` is success
    pub status: i32,
    /// Messages the item emitted, in order
    pub messages: Vec<String>,
}

impl UseOutcome {
    /// A successful outcome with the given messages.
    #[must_use]
    pub const fn success(messages: Vec<String>) -> Self {
        Self {
            status: 0,
            messages,
        }
    }

    /// Returns `true` if the item reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 0
    }
}
