//! `use`: run an item from the inventory.

use super::session::Session;
use crate::formatters::format_output;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use whorl_core::ItemName;
use whorl_core::cli::{ExitCode, OutputFormat};
use whorl_core::traits::UseContext;

/// Result of using an item.
#[derive(Debug, Clone, Serialize)]
pub struct UseResult {
    /// Item identifier
    pub name: String,
    /// Messages the item emitted, in order
    pub messages: Vec<String>,
    /// Whether the item was removed from the inventory
    pub consumed: bool,
}

/// Runs the `use` command.
pub fn run(
    session: &Session<'_>,
    name: &ItemName,
    args: &[String],
    format: OutputFormat,
) -> Result<ExitCode> {
    let result = use_item(session, name, args)?;
    println!("{}", format_output(&result, format)?);
    Ok(ExitCode::SUCCESS)
}

/// Uses `name` with `args` parsed as `--key value` flags.
///
/// A consumable item is removed from the inventory after a successful use.
/// The inventory is left untouched when the item fails.
///
/// # Errors
///
/// Fails if the item is not held, the arguments are malformed, or the item
/// cannot be run.
pub fn use_item(session: &Session<'_>, name: &ItemName, args: &[String]) -> Result<UseResult> {
    let flags = UseContext::parse_flags(args)?;
    let record = session.held(name)?;
    let bytes = whorl_codec::decode(&record.envelope)
        .with_context(|| format!("stored item '{name}' cannot be decoded"))?;

    let ctx = UseContext::new(session.owner().as_str(), session.working_dir()).with_args(flags);
    let outcome = session
        .loader()
        .run(&bytes, name, &ctx)
        .with_context(|| format!("failed to use {}", record.descriptor.display_name))?;

    let consumed = record.descriptor.consumable;
    if consumed {
        session
            .store()
            .remove(session.owner(), name)
            .with_context(|| format!("failed to consume '{name}'"))?;
    }

    info!(
        owner = %session.owner(),
        item = %name,
        messages = outcome.messages.len(),
        consumed,
        "item used"
    );
    Ok(UseResult {
        name: name.to_string(),
        messages: outcome.messages,
        consumed,
    })
}
