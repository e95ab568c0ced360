//! Local inventory implementation.
//!
//! Provides [`LocalInventory`], a directory-per-item store that implements
//! the [`InventoryStore`] contract.

use crate::error::{InventoryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use whorl_codec::checksum::{calculate_checksum, constant_time_compare};
use whorl_core::traits::{InventoryRecord, InventoryStore, StoreOutcome};
use whorl_core::{Envelope, ItemDescriptor, ItemName, OwnerId};

/// Format version written to every record.
pub const FORMAT_VERSION: &str = "1";

/// Record file inside an item directory.
pub const RECORD_FILE: &str = "record.json";

/// Envelope file inside an item directory.
pub const ENVELOPE_FILE: &str = "envelope.b64";

/// Contents of `record.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record format version
    pub format_version: String,
    /// Item descriptor
    pub descriptor: ItemDescriptor,
    /// When the item was stored
    pub stored_at: DateTime<Utc>,
    /// Checksum of the envelope text
    pub envelope_checksum: String,
    /// Envelope length in bytes
    pub envelope_len: usize,
}

/// RAII guard for item directory cleanup on error.
///
/// Removes the directory on drop unless [`commit`](Self::commit) was called,
/// so a failed store never leaves a partial item behind.
struct ItemDirGuard {
    path: PathBuf,
    cleanup: bool,
}

impl ItemDirGuard {
    const fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup: true,
        }
    }

    fn commit(mut self) {
        self.cleanup = false;
    }
}

impl Drop for ItemDirGuard {
    fn drop(&mut self) {
        if self.cleanup {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!(
                    "Failed to clean up item directory {}: {}",
                    self.path.display(),
                    e
                );
            } else {
                tracing::debug!("Cleaned up incomplete item directory: {}", self.path.display());
            }
        }
    }
}

/// Filesystem-backed inventory.
///
/// # Directory Structure
///
/// ```text
/// root/
/// └── owner/
///     ├── magic_lamp/
///     │   ├── record.json
///     │   └── envelope.b64
///     └── widget/
///         ├── record.json
///         └── envelope.b64
/// ```
///
/// Owners and item identifiers are validated types, so every path
/// component is a single safe directory name.
///
/// # Examples
///
/// ```
/// use whorl_core::traits::{InventoryStore, StoreOutcome};
/// use whorl_core::{ItemDescriptor, ItemName, OwnerId};
/// use whorl_inventory::LocalInventory;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let temp = tempfile::tempdir()?;
/// let inventory = LocalInventory::new(temp.path())?;
/// let owner = OwnerId::new("ada")?;
/// let descriptor = ItemDescriptor::with_defaults(ItemName::new("pebble")?, "ada");
/// let envelope = whorl_codec::encode(b"(module $Pebble)")?;
///
/// assert_eq!(inventory.store(&owner, &descriptor, &envelope)?, StoreOutcome::Stored);
/// assert_eq!(inventory.store(&owner, &descriptor, &envelope)?, StoreOutcome::Conflict);
/// assert_eq!(inventory.list(&owner)?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalInventory {
    root: PathBuf,
}

impl LocalInventory {
    /// Opens the inventory at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| InventoryError::io(&root, e))?;
            tracing::debug!("Created inventory directory: {}", root.display());
        }
        Ok(Self { root })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `owner`'s items. Does not check existence.
    #[must_use]
    pub fn owner_path(&self, owner: &OwnerId) -> PathBuf {
        self.root.join(owner.as_str())
    }

    /// Directory of one item. Does not check existence.
    #[must_use]
    pub fn item_path(&self, owner: &OwnerId, name: &ItemName) -> PathBuf {
        self.owner_path(owner).join(name.as_str())
    }

    /// Saves an item.
    ///
    /// Creating the item directory is atomic (`create_dir` fails if it
    /// exists); on any later failure the partial directory is removed.
    ///
    /// # Errors
    ///
    /// * [`InventoryError::ItemAlreadyStored`] - the owner holds that name
    /// * I/O and serialization errors if writing fails
    pub fn save(
        &self,
        owner: &OwnerId,
        descriptor: &ItemDescriptor,
        envelope: &Envelope,
    ) -> Result<StoredRecord> {
        let owner_dir = self.owner_path(owner);
        fs::create_dir_all(&owner_dir).map_err(|e| InventoryError::io(&owner_dir, e))?;

        let item_dir = self.item_path(owner, descriptor.name());
        match fs::create_dir(&item_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(InventoryError::ItemAlreadyStored {
                    owner: owner.to_string(),
                    name: descriptor.name().to_string(),
                });
            }
            Err(e) => return Err(InventoryError::io(&item_dir, e)),
        }
        let guard = ItemDirGuard::new(item_dir.clone());

        let envelope_path = item_dir.join(ENVELOPE_FILE);
        fs::write(&envelope_path, envelope.as_str())
            .map_err(|e| InventoryError::io(&envelope_path, e))?;

        let record = StoredRecord {
            format_version: FORMAT_VERSION.to_string(),
            descriptor: descriptor.clone(),
            stored_at: Utc::now(),
            envelope_checksum: calculate_checksum(envelope.as_str().as_bytes()),
            envelope_len: envelope.len(),
        };
        let record_path = item_dir.join(RECORD_FILE);
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&record_path, json).map_err(|e| InventoryError::io(&record_path, e))?;

        guard.commit();
        tracing::info!(
            owner = %owner,
            item = %descriptor.name(),
            bytes = envelope.len(),
            "item stored"
        );
        Ok(record)
    }

    /// Loads an item, verifying the envelope checksum.
    ///
    /// # Errors
    ///
    /// * [`InventoryError::ItemNotFound`] - no such item
    /// * [`InventoryError::MissingFile`] - record or envelope missing
    /// * [`InventoryError::InvalidRecord`] - unparseable or misplaced record
    /// * [`InventoryError::ChecksumMismatch`] - envelope was altered
    pub fn load(&self, owner: &OwnerId, name: &ItemName) -> Result<(StoredRecord, Envelope)> {
        let item_dir = self.item_path(owner, name);
        if !item_dir.is_dir() {
            return Err(InventoryError::ItemNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }

        let missing = |file: &str| InventoryError::MissingFile {
            owner: owner.to_string(),
            name: name.to_string(),
            path: PathBuf::from(file),
        };

        let record_path = item_dir.join(RECORD_FILE);
        if !record_path.is_file() {
            return Err(missing(RECORD_FILE));
        }
        let record = Self::read_record(&record_path)?;
        if record.descriptor.name() != name {
            return Err(InventoryError::InvalidRecord {
                path: record_path,
                reason: format!(
                    "record describes '{}' but is stored as '{name}'",
                    record.descriptor.name()
                ),
            });
        }

        let envelope_path = item_dir.join(ENVELOPE_FILE);
        if !envelope_path.is_file() {
            return Err(missing(ENVELOPE_FILE));
        }
        let text = fs::read_to_string(&envelope_path)
            .map_err(|e| InventoryError::io(&envelope_path, e))?;
        let actual = calculate_checksum(text.as_bytes());
        if !constant_time_compare(&actual, &record.envelope_checksum) {
            return Err(InventoryError::ChecksumMismatch {
                path: envelope_path,
                expected: record.envelope_checksum,
                actual,
            });
        }

        tracing::debug!(owner = %owner, item = %name, bytes = text.len(), "item loaded");
        Ok((record, Envelope::new(text)))
    }

    /// Lists the records of every item held by `owner`, sorted by name.
    ///
    /// Directories without a readable record are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner directory cannot be read.
    pub fn records(&self, owner: &OwnerId) -> Result<Vec<StoredRecord>> {
        let owner_dir = self.owner_path(owner);
        if !owner_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let entries = fs::read_dir(&owner_dir).map_err(|e| InventoryError::io(&owner_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| InventoryError::io(&owner_dir, e))?.path();
            if !path.is_dir() {
                continue;
            }
            let record_path = path.join(RECORD_FILE);
            if !record_path.exists() {
                tracing::warn!("Skipping item directory without record: {}", path.display());
                continue;
            }
            match Self::read_record(&record_path) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Failed to read record {}: {}", record_path.display(), e),
            }
        }

        records.sort_by(|a, b| a.descriptor.name().cmp(b.descriptor.name()));
        Ok(records)
    }

    /// Deletes an item.
    ///
    /// # Errors
    ///
    /// * [`InventoryError::ItemNotFound`] - no such item
    /// * I/O errors if deletion fails
    pub fn delete(&self, owner: &OwnerId, name: &ItemName) -> Result<()> {
        let item_dir = self.item_path(owner, name);
        if !item_dir.is_dir() {
            return Err(InventoryError::ItemNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
        fs::remove_dir_all(&item_dir).map_err(|e| InventoryError::io(&item_dir, e))?;
        tracing::info!(owner = %owner, item = %name, "item removed");
        Ok(())
    }

    fn read_record(record_path: &Path) -> Result<StoredRecord> {
        let content =
            fs::read_to_string(record_path).map_err(|e| InventoryError::io(record_path, e))?;
        let record: StoredRecord =
            serde_json::from_str(&content).map_err(|e| InventoryError::InvalidRecord {
                path: record_path.to_path_buf(),
                reason: format!("Failed to parse JSON: {e}"),
            })?;

        if record.format_version != FORMAT_VERSION {
            return Err(InventoryError::InvalidRecord {
                path: record_path.to_path_buf(),
                reason: format!(
                    "Unsupported format version: {} (expected {})",
                    record.format_version, FORMAT_VERSION
                ),
            });
        }
        Ok(record)
    }
}

impl InventoryStore for LocalInventory {
    fn store(
        &self,
        owner: &OwnerId,
        descriptor: &ItemDescriptor,
        envelope: &Envelope,
    ) -> whorl_core::Result<StoreOutcome> {
        match self.save(owner, descriptor, envelope) {
            Ok(_) => Ok(StoreOutcome::Stored),
            Err(InventoryError::ItemAlreadyStored { .. }) => {
                tracing::debug!(owner = %owner, item = %descriptor.name(), "store conflict");
                Ok(StoreOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, owner: &OwnerId) -> whorl_core::Result<Vec<ItemDescriptor>> {
        Ok(self
            .records(owner)?
            .into_iter()
            .map(|record| record.descriptor)
            .collect())
    }

    fn find(
        &self,
        owner: &OwnerId,
        name: &ItemName,
    ) -> whorl_core::Result<Option<InventoryRecord>> {
        match self.load(owner, name) {
            Ok((record, envelope)) => Ok(Some(InventoryRecord {
                descriptor: record.descriptor,
                envelope,
            })),
            Err(InventoryError::ItemNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, owner: &OwnerId, name: &ItemName) -> whorl_core::Result<()> {
        self.delete(owner, name).map_err(Into::into)
    }
}
