//! `get`: acquire items into the inventory.
//!
//! Candidates are processed strictly in order. A failing candidate is
//! reported with its reason and the batch moves on; the exit code is
//! non-zero if any candidate failed.

use super::session::Session;
use crate::formatters::format_output;
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use whorl_codec::{ARCHIVE_EXTENSION, ArchiveContents};
use whorl_core::cli::{ExitCode, OutputFormat};
use whorl_core::traits::StoreOutcome;
use whorl_core::{ItemDescriptor, ItemMetadata, ItemName, METADATA_FILE};

/// Outcome of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    /// Stored in the inventory
    Stored,
    /// Rejected; see the reason
    Failed,
}

/// Report for one candidate file.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    /// Candidate path as given
    pub path: String,
    /// Item identifier, once known
    pub name: Option<String>,
    /// Outcome
    pub status: CandidateStatus,
    /// Why the candidate failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Report for a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Inventory owner
    pub owner: String,
    /// Number of candidates stored
    pub stored: usize,
    /// Number of candidates rejected
    pub failed: usize,
    /// Per-candidate reports, in input order
    pub candidates: Vec<CandidateReport>,
}

impl BatchReport {
    /// `SUCCESS` when every candidate was stored.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        if self.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::ERROR
        }
    }
}

/// Runs the `get` command.
pub fn run(session: &Session<'_>, paths: &[PathBuf], format: OutputFormat) -> Result<ExitCode> {
    let report = acquire_batch(session, paths);
    println!("{}", format_output(&report, format)?);
    Ok(report.exit_code())
}

/// Acquires every candidate in `paths`, continuing past failures.
#[must_use]
pub fn acquire_batch(session: &Session<'_>, paths: &[PathBuf]) -> BatchReport {
    let mut candidates = Vec::with_capacity(paths.len());

    for path in paths {
        let display = path.display().to_string();
        let report = match acquire(session, path) {
            Ok(name) => CandidateReport {
                path: display,
                name: Some(name.into_inner()),
                status: CandidateStatus::Stored,
                reason: None,
            },
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(path = %path.display(), %reason, "candidate rejected");
                CandidateReport {
                    path: display,
                    name: candidate_name(path),
                    status: CandidateStatus::Failed,
                    reason: Some(reason),
                }
            }
        };
        candidates.push(report);
    }

    let stored = candidates
        .iter()
        .filter(|c| c.status == CandidateStatus::Stored)
        .count();
    info!(
        owner = %session.owner(),
        stored,
        failed = candidates.len() - stored,
        "acquisition finished"
    );
    BatchReport {
        owner: session.owner().to_string(),
        stored,
        failed: candidates.len() - stored,
        candidates,
    }
}

/// Validates, encodes and stores one candidate.
fn acquire(session: &Session<'_>, path: &Path) -> Result<ItemName> {
    let is_archive = path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION);

    let (name, descriptor) = if is_archive {
        let item = session.validator().validate_archive_file(path).into_result()?;
        let descriptor = archive_descriptor(session, path, &item.identifier)?;
        (item.identifier, descriptor)
    } else {
        let item = session.validator().validate_loose_file(path).into_result()?;
        let descriptor =
            ItemDescriptor::with_defaults(item.identifier.clone(), session.owner().as_str());
        (item.identifier, descriptor)
    };

    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let envelope = whorl_codec::encode(&bytes)?;

    match session.store().store(session.owner(), &descriptor, &envelope)? {
        StoreOutcome::Stored => {
            info!(owner = %session.owner(), item = %name, "item acquired");
            Ok(name)
        }
        StoreOutcome::Conflict => {
            bail!("{} already holds an item named '{name}'", session.owner())
        }
    }
}

/// Descriptor from the archive's metadata file, or defaults when absent.
fn archive_descriptor(
    session: &Session<'_>,
    path: &Path,
    identifier: &ItemName,
) -> Result<ItemDescriptor> {
    let contents = ArchiveContents::read_file(path)?;
    let Some(bytes) = contents.file(Path::new(METADATA_FILE)) else {
        return Ok(ItemDescriptor::with_defaults(
            identifier.clone(),
            session.owner().as_str(),
        ));
    };

    let label = path.join(METADATA_FILE);
    let text = std::str::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", label.display()))?;
    let metadata = ItemMetadata::parse(text, &label)?;
    if metadata.name != *identifier {
        bail!(
            "{} names item '{}' but the archive holds '{identifier}'",
            label.display(),
            metadata.name
        );
    }
    Ok(ItemDescriptor::from_metadata(&metadata))
}

/// Best-effort identifier for a rejected candidate.
fn candidate_name(path: &Path) -> Option<String> {
    path.file_stem()?.to_str().map(str::to_string)
}
