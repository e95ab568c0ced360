//! State shared by the inventory commands.

use anyhow::{Result, anyhow};
use std::fmt;
use std::path::{Path, PathBuf};
use whorl_core::traits::{InventoryRecord, InventoryStore};
use whorl_core::{ItemName, OwnerId};
use whorl_package::PackageValidator;
use whorl_runtime::ItemLoader;

/// The owner's view of an inventory for one CLI invocation.
///
/// Commands receive the store as a trait object so workflows can be
/// exercised against any [`InventoryStore`].
pub struct Session<'a> {
    owner: OwnerId,
    store: &'a dyn InventoryStore,
    loader: ItemLoader,
    validator: PackageValidator,
    working_dir: PathBuf,
}

impl<'a> Session<'a> {
    /// Creates a session; candidates are validated with `loader`.
    #[must_use]
    pub fn new(
        owner: OwnerId,
        store: &'a dyn InventoryStore,
        loader: ItemLoader,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            owner,
            store,
            validator: PackageValidator::with_loader(loader.clone()),
            loader,
            working_dir: working_dir.into(),
        }
    }

    /// Inventory owner.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Backing store.
    #[must_use]
    pub const fn store(&self) -> &dyn InventoryStore {
        self.store
    }

    /// Loader used to describe and use items.
    #[must_use]
    pub const fn loader(&self) -> &ItemLoader {
        &self.loader
    }

    /// Validator applied to acquisition candidates.
    #[must_use]
    pub const fn validator(&self) -> &PackageValidator {
        &self.validator
    }

    /// Directory items are dropped into and used from.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Fetches a held item.
    ///
    /// # Errors
    ///
    /// Fails if the owner does not hold `name` or the store cannot be read.
    pub fn held(&self, name: &ItemName) -> Result<InventoryRecord> {
        self.store
            .find(&self.owner, name)?
            .ok_or_else(|| anyhow!("You don't seem to have any {name}!"))
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.owner)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}
