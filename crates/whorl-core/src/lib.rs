//! Core types, traits, and errors for Whorl items.
//!
//! This crate provides the foundational types and abstractions used across
//! all other crates in the Whorl workspace.
//!
//! # Architecture
//!
//! The core consists of:
//! - Strong domain types (`ItemName`, `TypeName`, `OwnerId`, `Envelope`)
//! - The item descriptor model and its declarative metadata file
//! - Error taxonomy shared by packaging, validation, and loading
//! - The capability contract ([`traits::Item`]) and the inventory store
//!   contract ([`traits::InventoryStore`])
//! - Configuration and CLI-facing types

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod config;
mod descriptor;
mod error;
mod types;

pub mod cli;
pub mod traits;

pub use config::{GeneralConfig, INVENTORY_DIR_ENV, OWNER_ENV, RuntimeConfig, WhorlConfig};
pub use descriptor::{
    ItemDescriptor, ItemMetadata, METADATA_FILE, REQUIRED_METADATA_KEYS, display_name_for,
};
pub use error::{BoxError, Error, ExecutionStage, Result};
pub use types::{Envelope, ItemName, MemoryLimit, OwnerId, TypeName};
