//! `drop`: take items out of the inventory.
//!
//! Names are processed in order and a failure does not stop the batch. Each
//! decoded item is written to the working directory before its record is
//! removed, so a failed write leaves the inventory untouched.

use super::session::Session;
use crate::formatters::format_output;
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use tracing::{info, warn};
use whorl_codec::archive::{archive_file_name, is_archive_bytes};
use whorl_core::ItemName;
use whorl_core::cli::{ExitCode, OutputFormat};

const WASM_MAGIC: &[u8] = b"\0asm";

/// Result of dropping an item.
#[derive(Debug, Clone, Serialize)]
pub struct DropResult {
    /// Item identifier
    pub name: String,
    /// File the item was written to
    pub path: String,
    /// Bytes written
    pub size_bytes: usize,
}

/// Report for one named item.
#[derive(Debug, Clone, Serialize)]
pub struct DropItemReport {
    /// Item identifier
    pub name: String,
    /// Where the item went; absent on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DropResult>,
    /// Why the item stayed in the inventory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Report for a whole `drop` batch.
#[derive(Debug, Clone, Serialize)]
pub struct DropReport {
    /// Inventory owner
    pub owner: String,
    /// Number of items dropped
    pub dropped: usize,
    /// Number of items kept because of a failure
    pub failed: usize,
    /// Per-item reports, in input order
    pub items: Vec<DropItemReport>,
}

impl DropReport {
    /// `SUCCESS` when every item was dropped.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        if self.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::ERROR
        }
    }
}

/// Runs the `drop` command.
pub fn run(session: &Session<'_>, names: &[ItemName], format: OutputFormat) -> Result<ExitCode> {
    let report = drop_batch(session, names);
    println!("{}", format_output(&report, format)?);
    Ok(report.exit_code())
}

/// Drops every item in `names`, continuing past failures.
#[must_use]
pub fn drop_batch(session: &Session<'_>, names: &[ItemName]) -> DropReport {
    let items: Vec<DropItemReport> = names
        .iter()
        .map(|name| match drop_item(session, name) {
            Ok(result) => DropItemReport {
                name: name.to_string(),
                result: Some(result),
                reason: None,
            },
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(owner = %session.owner(), item = %name, %reason, "item not dropped");
                DropItemReport {
                    name: name.to_string(),
                    result: None,
                    reason: Some(reason),
                }
            }
        })
        .collect();

    let dropped = items.iter().filter(|item| item.result.is_some()).count();
    DropReport {
        owner: session.owner().to_string(),
        dropped,
        failed: items.len() - dropped,
        items,
    }
}

/// Writes `name` to the working directory and removes it from the inventory.
///
/// # Errors
///
/// Fails if the item is not held, cannot be decoded, or its file already
/// exists in the working directory.
pub fn drop_item(session: &Session<'_>, name: &ItemName) -> Result<DropResult> {
    let record = session.held(name)?;
    let bytes = whorl_codec::decode(&record.envelope)
        .with_context(|| format!("stored item '{name}' cannot be decoded"))?;

    let path = session.working_dir().join(dropped_file_name(name, &bytes));
    write_new(&path, &bytes)?;

    session
        .store()
        .remove(session.owner(), name)
        .with_context(|| format!("failed to remove '{name}' from the inventory"))?;

    info!(owner = %session.owner(), item = %name, path = %path.display(), "item dropped");
    Ok(DropResult {
        name: name.to_string(),
        path: path.display().to_string(),
        size_bytes: bytes.len(),
    })
}

/// File name for dropped bytes: an archive, a binary module or a text module.
fn dropped_file_name(name: &ItemName, bytes: &[u8]) -> String {
    if is_archive_bytes(bytes) {
        archive_file_name(name)
    } else if bytes.starts_with(WASM_MAGIC) {
        format!("{name}.wasm")
    } else {
        format!("{name}.wat")
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            bail!("refusing to overwrite existing file {}", path.display())
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to create {}", path.display()));
        }
    };
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write {}", path.display()))
}
