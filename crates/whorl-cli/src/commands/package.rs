//! `package`: build an archive from a Source Tree.

use crate::formatters::format_output;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use whorl_codec::ArchiveContents;
use whorl_core::cli::{ExitCode, OutputFormat};
use whorl_package::{PackageBuilder, PackageValidator};

/// Result of packaging.
#[derive(Debug, Clone, Serialize)]
pub struct PackageResult {
    /// Item identifier
    pub name: String,
    /// Archive written
    pub archive: String,
    /// Archive size in bytes
    pub size_bytes: u64,
    /// Entrypoint reference recorded in the manifest
    pub entrypoint: String,
    /// Checksum of the packaged module
    pub module_checksum: String,
}

/// Runs the `package` command.
pub fn run(
    source_dir: &Path,
    output_dir: &Path,
    overwrite: bool,
    validator: PackageValidator,
    format: OutputFormat,
) -> Result<ExitCode> {
    let result = package_item(source_dir, output_dir, overwrite, validator)?;
    println!("{}", format_output(&result, format)?);
    Ok(ExitCode::SUCCESS)
}

/// Validates and packages the Source Tree at `source_dir`.
///
/// # Errors
///
/// Fails if the tree is invalid or the archive cannot be written.
pub fn package_item(
    source_dir: &Path,
    output_dir: &Path,
    overwrite: bool,
    validator: PackageValidator,
) -> Result<PackageResult> {
    let archive = PackageBuilder::new(source_dir)
        .with_validator(validator)
        .package(output_dir, overwrite)
        .with_context(|| format!("failed to package {}", source_dir.display()))?;

    let contents = ArchiveContents::read_file(&archive)?;
    let manifest = contents
        .manifest()
        .context("packaged archive has no manifest")?;
    let size_bytes = std::fs::metadata(&archive)
        .with_context(|| format!("failed to stat {}", archive.display()))?
        .len();

    Ok(PackageResult {
        name: manifest.identifier.to_string(),
        archive: archive.display().to_string(),
        size_bytes,
        entrypoint: manifest.entrypoint.clone(),
        module_checksum: manifest.module_checksum.clone(),
    })
}
