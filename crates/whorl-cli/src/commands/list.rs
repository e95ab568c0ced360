//! `list`: show the owner's inventory.

use super::session::Session;
use crate::formatters::format_output;
use anyhow::Result;
use serde::Serialize;
use whorl_core::ItemDescriptor;
use whorl_core::cli::{ExitCode, OutputFormat};

/// Result of listing the inventory.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    /// Inventory owner
    pub owner: String,
    /// Number of items held
    pub count: usize,
    /// Total weight carried
    pub total_weight: f64,
    /// Held items, sorted by identifier
    pub items: Vec<ItemSummary>,
}

/// One line of the inventory listing.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    /// Item identifier
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Version
    pub version: String,
    /// Weight
    pub weight: f64,
    /// Whether the item is consumed on use
    pub consumable: bool,
}

impl From<&ItemDescriptor> for ItemSummary {
    fn from(d: &ItemDescriptor) -> Self {
        Self {
            name: d.name().to_string(),
            display_name: d.display_name.clone(),
            version: d.version.clone(),
            weight: d.weight,
            consumable: d.consumable,
        }
    }
}

/// Runs the `list` command.
pub fn run(session: &Session<'_>, format: OutputFormat) -> Result<ExitCode> {
    let result = list_items(session)?;
    println!("{}", format_output(&result, format)?);
    Ok(ExitCode::SUCCESS)
}

/// Lists the owner's items.
///
/// # Errors
///
/// Fails if the store cannot be read.
pub fn list_items(session: &Session<'_>) -> Result<ListResult> {
    let mut descriptors = session.store().list(session.owner())?;
    descriptors.sort_by(|a, b| a.name().cmp(b.name()));

    let items: Vec<ItemSummary> = descriptors.iter().map(ItemSummary::from).collect();
    Ok(ListResult {
        owner: session.owner().to_string(),
        count: items.len(),
        total_weight: items.iter().map(|i| i.weight).sum(),
        items,
    })
}
