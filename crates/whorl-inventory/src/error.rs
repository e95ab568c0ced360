//! Error types for local inventory operations.

use std::path::PathBuf;

/// Result type for local inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Errors that can occur while reading or writing the local inventory.
#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    /// The owner holds no item with that name.
    #[error("Item not found: {owner}/{name}")]
    ItemNotFound {
        /// Owner queried
        owner: String,
        /// Item identifier
        name: String,
    },

    /// The owner already holds an item with that name.
    ///
    /// Storing is atomic at the directory level: when two stores race for
    /// the same name, exactly one succeeds and the other sees this error.
    #[error("Item already stored: {owner}/{name}")]
    ItemAlreadyStored {
        /// Owner
        owner: String,
        /// Item identifier
        name: String,
    },

    /// The stored envelope does not match the checksum in its record.
    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// Envelope file
        path: PathBuf,
        /// Checksum recorded at store time
        expected: String,
        /// Checksum of the bytes on disk
        actual: String,
    },

    /// A record file cannot be parsed or is inconsistent with its location.
    #[error("Invalid record at {}: {reason}", path.display())]
    InvalidRecord {
        /// Record file
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A required file is missing from an item directory.
    #[error("Missing file in item {owner}/{name}: {}", path.display())]
    MissingFile {
        /// Owner
        owner: String,
        /// Item identifier
        name: String,
        /// Missing file, relative to the item directory
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InventoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error is caused by the request rather than by
    /// the state of the filesystem.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound { .. } | Self::ItemAlreadyStored { .. }
        )
    }
}

impl From<InventoryError> for whorl_core::Error {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ItemNotFound { owner, name } => Self::NotFound {
                resource: format!("{owner}/{name}"),
            },
            InventoryError::ItemAlreadyStored { owner, name } => Self::ValidationError {
                field: "name".to_string(),
                reason: format!("{owner} already holds an item named '{name}'"),
            },
            err @ InventoryError::ChecksumMismatch { .. } => Self::CodecError {
                message: "stored envelope is corrupt".to_string(),
                source: Some(Box::new(err)),
            },
            InventoryError::InvalidRecord { path, reason } => Self::StructureError { path, reason },
            InventoryError::MissingFile { owner, name, path } => Self::StructureError {
                path: PathBuf::from(owner).join(name).join(path),
                reason: "missing file in inventory record".to_string(),
            },
            InventoryError::Io { path, source } => Self::Io { path, source },
            err @ InventoryError::Json(_) => Self::CodecError {
                message: "cannot serialize inventory record".to_string(),
                source: Some(Box::new(err)),
            },
        }
    }
}
