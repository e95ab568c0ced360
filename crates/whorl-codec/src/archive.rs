//! Item archive format.
//!
//! An archive is a gzip-compressed tar named `<TypeName>.whorl`. Its first
//! entry is `manifest.json`; the remaining entries are the staged Source Tree
//! files (module, metadata, and anything else the author shipped).
//!
//! Archives are read fully into memory. Entry paths are sanitized on read:
//! absolute paths and `..` components are rejected, and links are skipped.

use crate::MAX_UNPACKED_BYTES;
use crate::checksum::{calculate_checksum, verify_checksum};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use whorl_core::{Error, ItemName, Result, TypeName};

/// File extension of item archives.
pub const ARCHIVE_EXTENSION: &str = "whorl";

/// Name of the manifest entry.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest format version.
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Extensions recognized as item modules, in lookup order.
pub const MODULE_EXTENSIONS: [&str; 2] = ["wat", "wasm"];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Returns `true` if `bytes` start with the gzip magic number.
///
/// # Examples
///
/// ```
/// use whorl_codec::archive::is_archive_bytes;
///
/// assert!(is_archive_bytes(&[0x1f, 0x8b, 0x08]));
/// assert!(!is_archive_bytes(b"(module)"));
/// ```
#[must_use]
pub fn is_archive_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Archive file name for an identifier (`magic_lamp` -> `MagicLamp.whorl`).
#[must_use]
pub fn archive_file_name(name: &ItemName) -> String {
    TypeName::from_identifier(name).archive_file_name()
}

/// Build metadata recorded inside every archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Manifest format version
    pub format_version: u32,
    /// Item identifier
    pub identifier: ItemName,
    /// Declared type name
    pub type_name: TypeName,
    /// Entrypoint reference, `<module>:<TypeName>`
    pub entrypoint: String,
    /// Module file name inside the archive
    pub module_file: String,
    /// Checksum of the module file
    pub module_checksum: String,
    /// Checksum of the metadata file, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_checksum: Option<String>,
    /// Build time
    pub built_at: DateTime<Utc>,
    /// Version of the tool that built the archive
    pub builder_version: String,
}

impl ArchiveManifest {
    /// Creates a manifest for a module.
    #[must_use]
    pub fn new(
        identifier: ItemName,
        module_file: impl Into<String>,
        module_bytes: &[u8],
        metadata_bytes: Option<&[u8]>,
        builder_version: impl Into<String>,
    ) -> Self {
        let type_name = TypeName::from_identifier(&identifier);
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            entrypoint: Self::entrypoint_for(&identifier, &type_name),
            identifier,
            type_name,
            module_file: module_file.into(),
            module_checksum: calculate_checksum(module_bytes),
            metadata_checksum: metadata_bytes.map(calculate_checksum),
            built_at: Utc::now(),
            builder_version: builder_version.into(),
        }
    }

    /// Formats an entrypoint reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use whorl_codec::archive::ArchiveManifest;
    /// use whorl_core::{ItemName, TypeName};
    ///
    /// let name = ItemName::new("widget").unwrap();
    /// let ty = TypeName::from_identifier(&name);
    /// assert_eq!(ArchiveManifest::entrypoint_for(&name, &ty), "widget:Widget");
    /// ```
    #[must_use]
    pub fn entrypoint_for(identifier: &ItemName, type_name: &TypeName) -> String {
        format!("{identifier}:{type_name}")
    }

    fn validate(&self, label: &Path) -> Result<()> {
        let structure_error = |reason: String| Error::StructureError {
            path: label.to_path_buf(),
            reason,
        };
        if self.format_version != ARCHIVE_FORMAT_VERSION {
            return Err(structure_error(format!(
                "unsupported manifest format version {}",
                self.format_version
            )));
        }
        let expected = Self::entrypoint_for(&self.identifier, &self.type_name);
        if self.entrypoint != expected {
            return Err(structure_error(format!(
                "manifest entrypoint '{}' does not match '{expected}'",
                self.entrypoint
            )));
        }
        if TypeName::from_identifier(&self.identifier) != self.type_name {
            return Err(structure_error(format!(
                "manifest type name '{}' does not match identifier '{}'",
                self.type_name, self.identifier
            )));
        }
        Ok(())
    }
}

/// Writes an archive of `source_dir` preceded by `manifest`.
///
/// Files are added in sorted path order with mode `0644` and mtime `0`.
/// Symlinks and a pre-existing `manifest.json` in `source_dir` are skipped.
///
/// # Errors
///
/// Returns [`Error::Io`] if a source file cannot be read or the stream
/// cannot be written.
pub fn write_archive<W: Write>(
    source_dir: &Path,
    manifest: &ArchiveManifest,
    writer: W,
) -> Result<W> {
    let io_error = |path: &Path, e: std::io::Error| Error::io(path, e);
    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));

    let manifest_json = serde_json::to_vec_pretty(manifest).map_err(|e| Error::CodecError {
        message: "failed to serialize archive manifest".to_string(),
        source: Some(Box::new(e)),
    })?;
    append_file(&mut builder, Path::new(MANIFEST_FILE), &manifest_json)
        .map_err(|e| io_error(Path::new(MANIFEST_FILE), e))?;

    let mut count = 0usize;
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            Error::io(path, e.into())
        })?;
        let path = entry.path();

        if entry.file_type().is_symlink() {
            warn!(path = %path.display(), "skipping symlink in source tree");
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = path.strip_prefix(source_dir) else {
            continue;
        };
        if relative == Path::new(MANIFEST_FILE) {
            warn!(path = %path.display(), "skipping reserved manifest file in source tree");
            continue;
        }

        let data = std::fs::read(path).map_err(|e| io_error(path, e))?;
        append_file(&mut builder, relative, &data).map_err(|e| io_error(path, e))?;
        count += 1;
    }

    let writer = builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| io_error(source_dir, e))?;
    debug!(
        identifier = %manifest.identifier,
        files = count,
        "wrote item archive"
    );
    Ok(writer)
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    data: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    builder.append_data(&mut header, path, data)
}

fn sanitize_entry_path(path: &Path, label: &Path) -> Result<Option<PathBuf>> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::StructureError {
                    path: label.to_path_buf(),
                    reason: format!("archive contains unsafe path: {}", path.display()),
                });
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(clean))
}

/// Fully decoded contents of an archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    manifest: Option<ArchiveManifest>,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl ArchiveContents {
    /// Reads an archive from bytes.
    ///
    /// `label` names the archive in errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureError`] if the stream is not a gzip tar, an
    /// entry path is unsafe, the manifest is malformed, or the unpacked size
    /// exceeds the limit.
    pub fn read(bytes: &[u8], label: &Path) -> Result<Self> {
        let structure_error = |reason: String| Error::StructureError {
            path: label.to_path_buf(),
            reason,
        };

        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let entries = archive
            .entries()
            .map_err(|e| structure_error(format!("not a valid item archive: {e}")))?;

        let mut files = BTreeMap::new();
        let mut total: u64 = 0;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| structure_error(format!("not a valid item archive: {e}")))?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                warn!(archive = %label.display(), "skipping link entry in archive");
                continue;
            }
            if !entry_type.is_file() {
                continue;
            }

            let raw_path = entry
                .path()
                .map_err(|e| structure_error(format!("invalid entry path: {e}")))?
                .into_owned();
            let Some(path) = sanitize_entry_path(&raw_path, label)? else {
                continue;
            };

            let remaining = MAX_UNPACKED_BYTES.saturating_sub(total);
            let mut data = Vec::new();
            (&mut entry)
                .take(remaining + 1)
                .read_to_end(&mut data)
                .map_err(|e| structure_error(format!("corrupt entry {}: {e}", path.display())))?;
            total += data.len() as u64;
            if total > MAX_UNPACKED_BYTES {
                return Err(structure_error(format!(
                    "archive unpacks to more than {MAX_UNPACKED_BYTES} bytes"
                )));
            }
            files.insert(path, data);
        }

        let manifest = match files.remove(Path::new(MANIFEST_FILE)) {
            Some(data) => {
                let manifest: ArchiveManifest = serde_json::from_slice(&data)
                    .map_err(|e| structure_error(format!("malformed {MANIFEST_FILE}: {e}")))?;
                manifest.validate(label)?;
                Some(manifest)
            }
            None => None,
        };

        debug!(archive = %label.display(), files = files.len(), "read item archive");
        Ok(Self { manifest, files })
    }

    /// Reads an archive file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureError`] if the file cannot be read or is not
    /// a valid archive.
    pub fn read_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::StructureError {
            path: path.to_path_buf(),
            reason: format!("cannot read archive: {e}"),
        })?;
        Self::read(&bytes, path)
    }

    /// The archive manifest, if the archive carries one.
    #[must_use]
    pub const fn manifest(&self) -> Option<&ArchiveManifest> {
        self.manifest.as_ref()
    }

    /// Paths of the files in the archive, excluding the manifest.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    /// Contents of one file.
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Finds the top-level module file whose PascalCase stem equals
    /// `type_name`.
    ///
    /// Returns the identifier derived from the file stem and the file name.
    #[must_use]
    pub fn find_module(&self, type_name: &str) -> Option<(ItemName, &Path)> {
        self.files.keys().find_map(|path| {
            if path.components().count() != 1 {
                return None;
            }
            let extension = path.extension()?.to_str()?;
            if !MODULE_EXTENSIONS.contains(&extension) {
                return None;
            }
            let name = ItemName::new(path.file_stem()?.to_str()?).ok()?;
            (TypeName::from_identifier(&name) == type_name).then_some((name, path.as_path()))
        })
    }

    /// Locates and verifies the module described by the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureError`] if there is no manifest or the module
    /// file is missing, and [`Error::CodecError`] on checksum mismatch.
    pub fn manifest_module(&self, label: &Path) -> Result<(&ArchiveManifest, &[u8])> {
        let manifest = self.manifest().ok_or_else(|| Error::StructureError {
            path: label.to_path_buf(),
            reason: format!("archive has no {MANIFEST_FILE}"),
        })?;
        let data = self
            .file(Path::new(&manifest.module_file))
            .ok_or_else(|| Error::StructureError {
                path: label.to_path_buf(),
                reason: format!("module file {} not found in archive", manifest.module_file),
            })?;
        verify_checksum(data, &manifest.module_checksum, &manifest.module_file)?;
        Ok((manifest, data))
    }

    /// Writes every file (and the manifest, if any) under `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a file cannot be written.
    pub fn extract_to(&self, dest: &Path) -> Result<()> {
        for (relative, data) in &self.files {
            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            std::fs::write(&target, data).map_err(|e| Error::io(&target, e))?;
        }
        if let Some(manifest) = &self.manifest {
            let target = dest.join(MANIFEST_FILE);
            let json = serde_json::to_vec_pretty(manifest).map_err(|e| Error::CodecError {
                message: "failed to serialize archive manifest".to_string(),
                source: Some(Box::new(e)),
            })?;
            std::fs::write(&target, json).map_err(|e| Error::io(&target, e))?;
        }
        debug!(dest = %dest.display(), files = self.files.len(), "extracted item archive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_tree() -> (TempDir, ArchiveManifest) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("widget.wat"), b"(module $Widget)").unwrap();
        std::fs::write(dir.path().join("meta.toml"), b"name = \"widget\"").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/readme.txt"), b"hi").unwrap();
        let manifest = ArchiveManifest::new(
            ItemName::new("widget").unwrap(),
            "widget.wat",
            b"(module $Widget)",
            Some(b"name = \"widget\""),
            "test",
        );
        (dir, manifest)
    }

    fn tar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            // set_path refuses `..`, so write the name bytes directly
            let name_field = &mut header.as_old_mut().name;
            name_field[..name.len()].copy_from_slice(name.as_bytes());
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_write_then_read_archive() {
        let (dir, manifest) = source_tree();
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        assert!(is_archive_bytes(&bytes));

        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();
        assert_eq!(contents.manifest(), Some(&manifest));
        let paths: Vec<_> = contents.paths().collect();
        assert_eq!(
            paths,
            vec![
                Path::new("assets/readme.txt"),
                Path::new("meta.toml"),
                Path::new("widget.wat"),
            ]
        );
        assert_eq!(
            contents.file(Path::new("widget.wat")),
            Some(&b"(module $Widget)"[..])
        );
    }

    #[test]
    fn test_find_module_by_type_name() {
        let (dir, manifest) = source_tree();
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();

        let (name, path) = contents.find_module("Widget").unwrap();
        assert_eq!(name.as_str(), "widget");
        assert_eq!(path, Path::new("widget.wat"));
        assert!(contents.find_module("Gadget").is_none());
        assert!(contents.find_module("widget").is_none());
    }

    #[test]
    fn test_manifest_module_verifies_checksum() {
        let (dir, mut manifest) = source_tree();
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();
        let (_, module) = contents.manifest_module(Path::new("Widget.whorl")).unwrap();
        assert_eq!(module, b"(module $Widget)");

        manifest.module_checksum = calculate_checksum(b"something else");
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();
        let err = contents
            .manifest_module(Path::new("Widget.whorl"))
            .unwrap_err();
        assert!(err.is_codec_error());
    }

    #[test]
    fn test_manifest_entrypoint_must_match() {
        let (dir, mut manifest) = source_tree();
        manifest.entrypoint = "widget:Gadget".to_string();
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        let err = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap_err();
        assert!(err.is_structure_error());
    }

    #[test]
    fn test_source_manifest_is_not_duplicated() {
        let (dir, manifest) = source_tree();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"{}").unwrap();
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();
        assert_eq!(contents.manifest(), Some(&manifest));
    }

    #[test]
    fn test_read_rejects_parent_dir_entries() {
        let bytes = tar_with(&[("../evil.wat", b"x")]);
        let err = ArchiveContents::read(&bytes, Path::new("Evil.whorl")).unwrap_err();
        assert!(err.is_structure_error());
        assert!(err.to_string().contains("unsafe path"));
    }

    #[test]
    fn test_read_without_manifest() {
        let bytes = tar_with(&[("widget.wat", b"(module $Widget)")]);
        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();
        assert!(contents.manifest().is_none());
        assert!(contents.find_module("Widget").is_some());
        assert!(
            contents
                .manifest_module(Path::new("Widget.whorl"))
                .unwrap_err()
                .is_structure_error()
        );
    }

    #[test]
    fn test_read_rejects_garbage() {
        let err = ArchiveContents::read(b"not gzip", Path::new("X.whorl")).unwrap_err();
        assert!(err.is_structure_error());
    }

    #[test]
    fn test_extract_round_trip() {
        let (dir, manifest) = source_tree();
        let bytes = write_archive(dir.path(), &manifest, Vec::new()).unwrap();
        let contents = ArchiveContents::read(&bytes, Path::new("Widget.whorl")).unwrap();

        let out = TempDir::new().unwrap();
        contents.extract_to(out.path()).unwrap();
        assert_eq!(
            std::fs::read(out.path().join("assets/readme.txt")).unwrap(),
            b"hi"
        );
        assert!(out.path().join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn test_archive_file_name() {
        let name = ItemName::new("magic_lamp").unwrap();
        assert_eq!(archive_file_name(&name), "MagicLamp.whorl");
    }
}
