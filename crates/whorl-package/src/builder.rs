//! Packaging of Source Trees into item archives.
//!
//! A Source Tree is a directory named after the item identifier holding
//! `<identifier>.wat` and `meta.toml`; any other files are carried along.
//! Packaging never mutates the tree: it is copied into a scratch directory,
//! the copy receives the entrypoint launcher, and the archive is written
//! through a temporary file that is atomically moved into place.
//!
//! # Examples
//!
//! ```
//! use whorl_package::PackageBuilder;
//!
//! let root = tempfile::tempdir().unwrap();
//! let tree = root.path().join("widget");
//! std::fs::create_dir(&tree).unwrap();
//! std::fs::write(tree.join("widget.wat"), r#"(module $Widget
//!     (memory (export "memory") 1)
//!     (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
//!     (func $use (export "use") (result i32) (i32.const 0)))"#).unwrap();
//! std::fs::write(
//!     tree.join("meta.toml"),
//!     "name = \"widget\"\nauthor = \"a\"\nversion = \"1.0.0\"\ndescription = \"d\"\n",
//! ).unwrap();
//!
//! let archive = PackageBuilder::new(&tree).package(root.path(), false).unwrap();
//! assert_eq!(archive.file_name().unwrap(), "Widget.whorl");
//! ```

use crate::entrypoint::ensure_entrypoint;
use crate::scratch::ScratchDir;
use crate::validator::PackageValidator;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use whorl_codec::archive::{ARCHIVE_EXTENSION, ArchiveManifest, write_archive};
use whorl_core::{Error, ItemMetadata, ItemName, METADATA_FILE, Result, TypeName};
use whorl_runtime::Generation;

/// File extension of a Source Tree's module file.
pub const MODULE_EXTENSION: &str = "wat";

/// A Source Tree that passed structural validation.
#[derive(Debug, Clone)]
pub struct SourceTree {
    /// Tree root
    pub root: PathBuf,
    /// Item identifier (the directory name)
    pub identifier: ItemName,
    /// Parsed metadata file
    pub metadata: ItemMetadata,
    /// Generation used to validate the module
    pub generation: Option<Generation>,
}

impl SourceTree {
    /// Module file name, `<identifier>.wat`.
    #[must_use]
    pub fn module_file(&self) -> String {
        module_file_name(&self.identifier)
    }

    /// Archive file name, `<TypeName>.whorl`.
    #[must_use]
    pub fn archive_file(&self) -> String {
        TypeName::from_identifier(&self.identifier).archive_file_name()
    }
}

fn module_file_name(identifier: &ItemName) -> String {
    format!("{identifier}.{MODULE_EXTENSION}")
}

/// Builds item archives from a Source Tree.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    source_dir: PathBuf,
    validator: PackageValidator,
}

impl PackageBuilder {
    /// Creates a builder for the tree at `source_dir`.
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            validator: PackageValidator::new(),
        }
    }

    /// Uses `validator` for module checks.
    #[must_use]
    pub fn with_validator(mut self, validator: PackageValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Root of the Source Tree.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    fn identifier(&self) -> Result<ItemName> {
        let structure_error = |reason: String| Error::StructureError {
            path: self.source_dir.clone(),
            reason,
        };
        if !self.source_dir.is_dir() {
            return Err(structure_error("source tree is not a directory".to_string()));
        }
        let name = self
            .source_dir
            .canonicalize()
            .map_err(|e| Error::io(&self.source_dir, e))?
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default();
        ItemName::new(name.as_str()).map_err(|_| {
            structure_error(format!("directory name '{name}' is not a valid identifier"))
        })
    }

    /// Checks the tree's files, metadata and module.
    ///
    /// # Errors
    ///
    /// - [`Error::StructureError`] listing every missing required file
    /// - [`Error::MetadataError`] for missing keys, invalid fields, or a
    ///   `name` that differs from the directory name
    /// - [`Error::InterfaceError`] if the module violates the item interface
    pub fn validate_structure(&self) -> Result<SourceTree> {
        let identifier = self.identifier()?;
        let module_file = module_file_name(&identifier);

        let missing: Vec<&str> = [module_file.as_str(), METADATA_FILE]
            .into_iter()
            .filter(|file| !self.source_dir.join(file).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(Error::StructureError {
                path: self.source_dir.clone(),
                reason: format!("missing required files: {}", missing.join(", ")),
            });
        }

        let metadata_path = self.source_dir.join(METADATA_FILE);
        let metadata = ItemMetadata::load(&metadata_path)?;
        if metadata.name != identifier {
            return Err(Error::MetadataError {
                path: metadata_path,
                reason: format!(
                    "name '{}' does not match directory name '{identifier}'",
                    metadata.name
                ),
            });
        }

        let validated = self
            .validator
            .validate_loose_file(&self.source_dir.join(&module_file))
            .into_result()?;

        debug!(item = %identifier, root = %self.source_dir.display(), "source tree is valid");
        Ok(SourceTree {
            root: self.source_dir.clone(),
            identifier,
            metadata,
            generation: validated.generation,
        })
    }

    /// Copies the tree into a new scratch directory.
    ///
    /// Symbolic links and previously built archives are not copied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the tree cannot be read or copied.
    pub fn stage(&self) -> Result<ScratchDir> {
        let scratch = ScratchDir::new()?;
        let mut copied = 0usize;

        for entry in WalkDir::new(&self.source_dir).follow_links(false).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| self.source_dir.clone(), Path::to_path_buf);
                Error::io(path, e.into())
            })?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                warn!(path = %entry.path().display(), "skipping symlink in source tree");
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.source_dir) else {
                continue;
            };
            let target = scratch.path().join(relative);
            if file_type.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
            } else if file_type.is_file() {
                if entry.path().extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION) {
                    debug!(path = %entry.path().display(), "skipping archive in source tree");
                    continue;
                }
                std::fs::copy(entry.path(), &target).map_err(|e| Error::io(entry.path(), e))?;
                copied += 1;
            }
        }

        debug!(files = copied, scratch = %scratch.path().display(), "source tree staged");
        Ok(scratch)
    }

    /// Writes the archive for a staged tree.
    ///
    /// The item identifier is read from the staged metadata file. The
    /// archive is written to a temporary file beside `output_path` and then
    /// persisted over it.
    ///
    /// # Errors
    ///
    /// - [`Error::OutputExistsError`] if `output_path` exists and `overwrite`
    ///   is false
    /// - [`Error::StructureError`] / [`Error::MetadataError`] if the staged
    ///   tree is incomplete
    /// - [`Error::Io`] if the archive cannot be written
    pub fn build(&self, staging_dir: &Path, output_path: &Path, overwrite: bool) -> Result<PathBuf> {
        if output_path.exists() && !overwrite {
            return Err(Error::OutputExistsError {
                path: output_path.to_path_buf(),
            });
        }

        let metadata_path = staging_dir.join(METADATA_FILE);
        let metadata_bytes = std::fs::read(&metadata_path).map_err(|e| Error::StructureError {
            path: metadata_path.clone(),
            reason: format!("cannot read metadata file: {e}"),
        })?;
        let metadata = ItemMetadata::load(&metadata_path)?;
        let module_file = module_file_name(&metadata.name);
        let module_path = staging_dir.join(&module_file);
        let module_bytes = std::fs::read(&module_path).map_err(|e| Error::StructureError {
            path: module_path.clone(),
            reason: format!("cannot read module file: {e}"),
        })?;

        let manifest = ArchiveManifest::new(
            metadata.name.clone(),
            module_file,
            &module_bytes,
            Some(&metadata_bytes),
            env!("CARGO_PKG_VERSION"),
        );

        let output_dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&output_dir).map_err(|e| Error::io(&output_dir, e))?;
        let temp = NamedTempFile::new_in(&output_dir).map_err(|e| Error::io(&output_dir, e))?;
        let mut temp = write_archive(staging_dir, &manifest, temp)?;
        temp.flush().map_err(|e| Error::io(temp.path(), e))?;

        let persisted = if overwrite {
            temp.persist(output_path)
        } else {
            temp.persist_noclobber(output_path)
        };
        persisted.map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                Error::OutputExistsError {
                    path: output_path.to_path_buf(),
                }
            } else {
                Error::io(output_path, e.error)
            }
        })?;

        info!(
            item = %metadata.name,
            archive = %output_path.display(),
            entrypoint = %manifest.entrypoint,
            "archive built"
        );
        Ok(output_path.to_path_buf())
    }

    /// Validates, stages and builds the tree into
    /// `<output_dir>/<TypeName>.whorl`.
    ///
    /// The staged module receives the entrypoint launcher and is validated
    /// again; the scratch directory is removed on every path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputExistsError`] before any other work if the
    /// archive exists and `overwrite` is false, and otherwise any error of
    /// [`Self::validate_structure`], [`Self::stage`] or [`Self::build`].
    /// A launcher that does not bind to `$use` is an
    /// [`Error::InterfaceError`].
    pub fn package(&self, output_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        let identifier = self.identifier()?;
        let output_path =
            output_dir.join(TypeName::from_identifier(&identifier).archive_file_name());
        if output_path.exists() && !overwrite {
            return Err(Error::OutputExistsError { path: output_path });
        }

        let tree = self.validate_structure()?;
        let scratch = self.stage()?;
        let staged_module = scratch.path().join(tree.module_file());
        ensure_entrypoint(&staged_module)?;

        self.validator
            .validate_loose_file(&staged_module)
            .into_result()
            .map_err(|err| match err {
                Error::StructureError { reason, .. } => Error::InterfaceError {
                    identifier: tree.identifier.to_string(),
                    reason: format!("entrypoint launcher does not bind to `$use`: {reason}"),
                },
                other => other,
            })?;

        let archive = self.build(scratch.path(), &output_path, overwrite)?;
        drop(scratch);
        Ok(archive)
    }
}
