//! Whorl CLI library.
//!
//! Argument definitions, command workflows and output formatters for the
//! `whorl` binary, exposed as a library so the workflows can be tested
//! against any inventory store.

#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod commands;
pub mod formatters;
pub mod runner;

pub use cli::{Cli, Commands};
pub use commands::Session;
