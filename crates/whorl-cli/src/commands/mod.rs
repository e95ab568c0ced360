//! Command implementations for the Whorl CLI.
//!
//! Each module exposes a `run` entry point that formats its result, and a
//! workflow function returning the result itself for tests and embedding.

pub mod create;
pub mod drop;
pub mod get;
pub mod info;
pub mod list;
pub mod package;
pub mod session;
pub mod use_item;

pub use session::Session;
