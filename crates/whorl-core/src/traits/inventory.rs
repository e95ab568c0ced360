//! Inventory store contract.

use crate::{Envelope, ItemDescriptor, ItemName, OwnerId, Result};
use serde::{Deserialize, Serialize};

/// Outcome of storing an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOutcome {
    /// The item was stored
    Stored,
    /// The owner already holds an item with that name; nothing was written
    Conflict,
}

/// A stored item: its descriptor and encoded bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Item descriptor
    pub descriptor: ItemDescriptor,
    /// Encoded item bytes
    pub envelope: Envelope,
}

/// Persistent per-owner store of descriptors and envelopes.
///
/// Operations are synchronous and fail fast; implementations do not retry.
pub trait InventoryStore {
    /// Stores an item under `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn store(
        &self,
        owner: &OwnerId,
        descriptor: &ItemDescriptor,
        envelope: &Envelope,
    ) -> Result<StoreOutcome>;

    /// Lists the descriptors of every item held by `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self, owner: &OwnerId) -> Result<Vec<ItemDescriptor>>;

    /// Finds one item by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the record is corrupt.
    fn find(&self, owner: &OwnerId, name: &ItemName) -> Result<Option<InventoryRecord>>;

    /// Removes one item by name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the owner holds no such item.
    fn remove(&self, owner: &OwnerId, name: &ItemName) -> Result<()>;
}
