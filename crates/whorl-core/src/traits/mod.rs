//! Core traits for Whorl.
//!
//! - [`Item`]: the capability contract every item satisfies
//! - [`InventoryStore`]: the four-operation contract of an inventory service
//!
//! # Examples
//!
//! ```
//! use whorl_core::traits::{Item, UseContext, UseOutcome};
//! use whorl_core::Result;
//!
//! struct Pebble;
//!
//! impl Item for Pebble {
//!     fn describe(&self) -> Result<String> {
//!         Ok("A smooth grey pebble.".to_string())
//!     }
//!
//!     fn use_item(&self, _ctx: &UseContext) -> Result<UseOutcome> {
//!         Ok(UseOutcome::success(vec!["You skip the pebble.".to_string()]))
//!     }
//! }
//!
//! let ctx = UseContext::new("ada", "/tmp");
//! assert!(Pebble.use_item(&ctx).unwrap().is_success());
//! ```

mod inventory;
mod item;

pub use inventory::{InventoryRecord, InventoryStore, StoreOutcome};
pub use item::{Item, UseContext, UseOutcome};
