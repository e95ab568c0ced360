//! Error types for the Whorl item lifecycle.
//!
//! Every library crate in the workspace reports failures through [`Error`].
//! Variants map one-to-one onto the lifecycle clause that was violated, so
//! callers can branch on the kind of failure without parsing messages.
//!
//! # Examples
//!
//! ```
//! use whorl_core::{Error, Result};
//!
//! fn require_description(text: &str) -> Result<()> {
//!     if text.trim().is_empty() {
//!         return Err(Error::MetadataError {
//!             path: "meta.toml".into(),
//!             reason: "description must not be empty".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! let err = require_description("  ").unwrap_err();
//! assert!(err.is_metadata_error());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error cause carried by chained variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stage of item materialization at which an execution failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStage {
    /// Decoding the source bytes and compiling the module.
    Load,
    /// Checking the compiled module against the capability contract.
    Lookup,
    /// Instantiating the module (running its constructor).
    Instantiate,
    /// Calling `use` or `describe`.
    Invoke,
}

impl ExecutionStage {
    /// Returns the stage as a lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Lookup => "lookup",
            Self::Instantiate => "instantiate",
            Self::Invoke => "invoke",
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Whorl.
#[derive(Error, Debug)]
pub enum Error {
    /// A required file or directory is missing, unreadable, or malformed.
    ///
    /// Raised by the validator for modules that do not parse or compile and
    /// by the builder for Source Trees missing required files.
    #[error("Invalid structure at {}: {reason}", path.display())]
    StructureError {
        /// Path of the offending file or directory
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// The metadata file is unparseable, incomplete, or inconsistent.
    #[error("Invalid metadata in {}: {reason}", path.display())]
    MetadataError {
        /// Path of the metadata file
        path: PathBuf,
        /// Description of the problem (missing keys, bad field, parse error)
        reason: String,
    },

    /// The module does not satisfy the capability contract.
    #[error("Item '{identifier}' violates the item interface: {reason}")]
    InterfaceError {
        /// Module identifier
        identifier: String,
        /// The contract clause that was violated
        reason: String,
    },

    /// The output archive already exists and overwrite was not requested.
    #[error("Output already exists: {}", path.display())]
    OutputExistsError {
        /// The existing output path
        path: PathBuf,
    },

    /// The transmission envelope could not be encoded or decoded.
    #[error("Envelope codec error: {message}")]
    CodecError {
        /// Description of the codec failure
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Loading or invoking an item failed.
    ///
    /// The underlying cause (trap, compile error, resource exhaustion,
    /// non-zero status) is always chained.
    #[error("Execution of '{identifier}' failed during {stage}")]
    ExecutionError {
        /// Module identifier
        identifier: String,
        /// Stage at which materialization failed
        stage: ExecutionStage,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// A requested resource does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// Identifier of the missing resource
        resource: String,
    },

    /// Configuration is invalid or could not be loaded.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// A domain value failed validation.
    #[error("Validation error in {field}: {reason}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Detailed reason for the validation failure
        reason: String,
    },

    /// Invalid function or CLI argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Filesystem failure.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Builds an [`Error::Io`] for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds an [`Error::CodecError`] with no underlying cause.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::CodecError {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an [`Error::ExecutionError`] chaining `source`.
    ///
    /// # Examples
    ///
    /// ```
    /// use whorl_core::{Error, ExecutionStage};
    ///
    /// let err = Error::execution("lamp", ExecutionStage::Invoke, "trap");
    /// assert!(err.is_execution_error());
    /// assert_eq!(err.execution_stage(), Some(ExecutionStage::Invoke));
    /// ```
    #[must_use]
    pub fn execution(
        identifier: impl Into<String>,
        stage: ExecutionStage,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::ExecutionError {
            identifier: identifier.into(),
            stage,
            source: source.into(),
        }
    }

    /// Returns `true` if this is a structure error.
    #[must_use]
    pub const fn is_structure_error(&self) -> bool {
        matches!(self, Self::StructureError { .. })
    }

    /// Returns `true` if this is a metadata error.
    #[must_use]
    pub const fn is_metadata_error(&self) -> bool {
        matches!(self, Self::MetadataError { .. })
    }

    /// Returns `true` if this is an interface error.
    ///
    /// # Examples
    ///
    /// ```
    /// use whorl_core::Error;
    ///
    /// let err = Error::InterfaceError {
    ///     identifier: "gadget".to_string(),
    ///     reason: "type name does not match module name".to_string(),
    /// };
    /// assert!(err.is_interface_error());
    /// ```
    #[must_use]
    pub const fn is_interface_error(&self) -> bool {
        matches!(self, Self::InterfaceError { .. })
    }

    /// Returns `true` if this is an output-exists error.
    #[must_use]
    pub const fn is_output_exists(&self) -> bool {
        matches!(self, Self::OutputExistsError { .. })
    }

    /// Returns `true` if this is a codec error.
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(self, Self::CodecError { .. })
    }

    /// Returns `true` if this is an execution error.
    #[must_use]
    pub const fn is_execution_error(&self) -> bool {
        matches!(self, Self::ExecutionError { .. })
    }

    /// Returns `true` if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// Returns `true` if this is a validation error.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::ValidationError { .. })
    }

    /// Returns `true` if this is an I/O error.
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns the failed stage for execution errors.
    #[must_use]
    pub const fn execution_stage(&self) -> Option<ExecutionStage> {
        match self {
            Self::ExecutionError { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias using the Whorl error type.
pub type Result<T> = std::result::Result<T, Error>;
