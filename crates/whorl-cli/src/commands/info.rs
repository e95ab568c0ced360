//! `info`: describe a held item.

use super::session::Session;
use crate::formatters::format_output;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use whorl_core::ItemName;
use whorl_core::cli::{ExitCode, OutputFormat};

/// Descriptor fields plus the item's own description.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    /// Item identifier
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Author
    pub author: String,
    /// Version
    pub version: String,
    /// Description from the descriptor
    pub description: String,
    /// Category labels
    pub categories: BTreeSet<String>,
    /// Weight
    pub weight: f64,
    /// Whether the item is consumed on use
    pub consumable: bool,
    /// Price, if any
    pub price: Option<f64>,
    /// Creation date
    pub created_date: String,
    /// Text returned by the item's `describe` operation
    pub details: String,
}

/// Runs the `info` command.
pub fn run(session: &Session<'_>, name: &ItemName, format: OutputFormat) -> Result<ExitCode> {
    let result = describe_item(session, name)?;
    println!("{}", format_output(&result, format)?);
    Ok(ExitCode::SUCCESS)
}

/// Describes a held item by running its `describe` operation.
///
/// # Errors
///
/// Fails if the item is not held or cannot be loaded.
pub fn describe_item(session: &Session<'_>, name: &ItemName) -> Result<InfoResult> {
    let record = session.held(name)?;
    let bytes = whorl_codec::decode(&record.envelope)
        .with_context(|| format!("stored item '{name}' cannot be decoded"))?;
    let details = session
        .loader()
        .describe(&bytes, name)
        .with_context(|| format!("failed to describe '{name}'"))?;

    let d = record.descriptor;
    Ok(InfoResult {
        name: d.name().to_string(),
        display_name: d.display_name,
        author: d.author,
        version: d.version,
        description: d.description,
        categories: d.categories,
        weight: d.weight,
        consumable: d.consumable,
        price: d.price,
        created_date: d.created_date.to_string(),
        details,
    })
}
