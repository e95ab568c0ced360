//! Filesystem-backed inventory for Whorl items.
//!
//! Each owner has a directory under the inventory root, and each item held
//! by that owner is a subdirectory named after its identifier:
//!
//! ```text
//! ~/.local/share/whorl/inventory/
//! └── ada/
//!     └── magic_lamp/
//!         ├── record.json    # format version, descriptor, checksum
//!         └── envelope.b64   # encoded item bytes
//! ```
//!
//! - **Atomic stores**: the item directory is created with `create_dir`, and
//!   a partially written item is removed again
//! - **Integrity**: the envelope's blake3 checksum is verified on every read
//! - **Contract**: [`LocalInventory`] implements
//!   [`whorl_core::traits::InventoryStore`]

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod error;
pub mod store;

pub use error::{InventoryError, Result};
pub use store::{ENVELOPE_FILE, FORMAT_VERSION, LocalInventory, RECORD_FILE, StoredRecord};
