//! Package validation.
//!
//! Checks a loose module file or a built archive against the item interface
//! without ever calling `use` or `describe`. Every validation compiles the
//! candidate from its bytes under a fresh generation, so an earlier
//! candidate with the same identifier is never observed.
//!
//! # Examples
//!
//! ```
//! use whorl_package::PackageValidator;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("gadget.wat");
//! std::fs::write(&path, r#"(module $Widget
//!     (memory (export "memory") 1)
//!     (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
//!     (func $use (export "use") (result i32) (i32.const 0)))"#).unwrap();
//!
//! let report = PackageValidator::new().validate_loose_file(&path);
//! assert!(!report.valid);
//! assert!(report.violations[0].message.contains("type name does not match module name"));
//! ```

use crate::scratch::ScratchDir;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use whorl_codec::archive::{ARCHIVE_EXTENSION, ArchiveContents, MODULE_EXTENSIONS};
use whorl_core::{Error, ExecutionStage, ItemName, Result, TypeName};
use whorl_runtime::registry::AlreadyLoading;
use whorl_runtime::{ContractViolations, Generation, ItemLoader, SecurityConfig};

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Missing, unreadable or malformed files.
    Structure,
    /// The module does not satisfy the item interface.
    Interface,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structure => f.write_str("structure"),
            Self::Interface => f.write_str("interface"),
        }
    }
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Category
    pub kind: ViolationKind,
    /// What is wrong
    pub message: String,
}

impl Violation {
    fn structure(message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Structure,
            message: message.into(),
        }
    }

    fn interface(message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Interface,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Candidate file
    pub path: PathBuf,
    /// Identifier derived from the file name, when it is a valid one
    pub identifier: Option<ItemName>,
    /// Generation of the load context used, when compilation was attempted
    pub generation: Option<Generation>,
    /// Whether the candidate is valid (no violations)
    pub valid: bool,
    /// Every violation found
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            identifier: None,
            generation: None,
            valid: false,
            violations: Vec::new(),
        }
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    fn finish(mut self) -> Self {
        self.valid = self.violations.is_empty() && self.identifier.is_some();
        if self.valid {
            info!(path = %self.path.display(), "candidate is valid");
        } else {
            debug!(
                path = %self.path.display(),
                violations = self.violations.len(),
                "candidate is invalid"
            );
        }
        self
    }

    /// Converts the report into a typed result.
    ///
    /// # Errors
    ///
    /// Returns the first violation as [`Error::StructureError`] or
    /// [`Error::InterfaceError`].
    pub fn into_result(self) -> Result<ValidatedItem> {
        if let Some(first) = self.violations.into_iter().next() {
            return Err(match (first.kind, self.identifier) {
                (ViolationKind::Interface, Some(identifier)) => Error::InterfaceError {
                    identifier: identifier.into_inner(),
                    reason: first.message,
                },
                _ => Error::StructureError {
                    path: self.path,
                    reason: first.message,
                },
            });
        }
        match self.identifier {
            Some(identifier) => Ok(ValidatedItem {
                type_name: TypeName::from_identifier(&identifier),
                identifier,
                path: self.path,
                generation: self.generation,
            }),
            None => Err(Error::StructureError {
                path: self.path,
                reason: "no identifier could be derived".to_string(),
            }),
        }
    }
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedItem {
    /// Item identifier
    pub identifier: ItemName,
    /// Declared type name
    pub type_name: TypeName,
    /// Validated file
    pub path: PathBuf,
    /// Generation of the load context used
    pub generation: Option<Generation>,
}

/// Renders an error followed by every cause in its chain.
fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Validates item candidates.
#[derive(Debug, Clone, Default)]
pub struct PackageValidator {
    loader: ItemLoader,
    scratch_root: Option<PathBuf>,
}

impl PackageValidator {
    /// Creates a validator with default sandbox limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator with the given sandbox limits.
    #[must_use]
    pub fn with_config(config: SecurityConfig) -> Self {
        Self::with_loader(ItemLoader::new(config))
    }

    /// Uses `loader` for compilation and instantiation.
    #[must_use]
    pub fn with_loader(loader: ItemLoader) -> Self {
        Self {
            loader,
            scratch_root: None,
        }
    }

    /// Extracts archives under `root` instead of the system temp directory.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Validates a loose module file (`<identifier>.wat` or `.wasm`).
    ///
    /// The module is compiled, checked and instantiated once; `use` and
    /// `describe` are never called.
    #[must_use]
    pub fn validate_loose_file(&self, path: &Path) -> ValidationReport {
        let mut report = ValidationReport::new(path);
        debug!(path = %path.display(), "validating loose file");

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !MODULE_EXTENSIONS.contains(&extension) {
            report.push(Violation::structure(format!(
                "not a module file (expected .{})",
                MODULE_EXTENSIONS.join(" or .")
            )));
            return report.finish();
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let Ok(identifier) = ItemName::new(stem) else {
            report.push(Violation::structure(format!(
                "file name '{stem}' is not a valid identifier"
            )));
            return report.finish();
        };
        report.identifier = Some(identifier.clone());

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.push(Violation::structure(format!("cannot read module file: {e}")));
                return report.finish();
            }
        };

        match self.loader.load(&bytes, &identifier) {
            Ok(loaded) => report.generation = Some(loaded.generation()),
            Err(err) => {
                for violation in classify(&err) {
                    report.push(violation);
                }
            }
        }
        report.finish()
    }

    /// Validates a built archive (`<TypeName>.whorl`).
    ///
    /// The archive is extracted into a scratch directory, removed on every
    /// path, and the module whose PascalCase stem equals the archive stem is
    /// validated as a loose file. When the archive has a manifest, that
    /// module must be the manifest's `module_file`.
    #[must_use]
    pub fn validate_archive_file(&self, path: &Path) -> ValidationReport {
        let mut report = ValidationReport::new(path);
        debug!(path = %path.display(), "validating archive");

        if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
            report.push(Violation::structure(format!(
                "not an item archive (expected .{ARCHIVE_EXTENSION})"
            )));
            return report.finish();
        }
        let type_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

        let contents = match ArchiveContents::read_file(path) {
            Ok(contents) => contents,
            Err(err) => {
                report.push(Violation::structure(reason_of(&err)));
                return report.finish();
            }
        };

        let Some((identifier, module_file)) = contents.find_module(type_name) else {
            report.push(Violation::structure(format!(
                "no module file for type `{type_name}` in archive"
            )));
            return report.finish();
        };
        report.identifier = Some(identifier.clone());

        if let Some(manifest) = contents.manifest() {
            if manifest.identifier != identifier {
                report.push(Violation::structure(format!(
                    "manifest names item '{}' but the archive holds '{identifier}'",
                    manifest.identifier
                )));
                return report.finish();
            }
            // The loader runs `module_file`.
            if Path::new(&manifest.module_file) != module_file {
                report.push(Violation::structure(format!(
                    "manifest runs module '{}' but the module for `{type_name}` is '{}'",
                    manifest.module_file,
                    module_file.display()
                )));
                return report.finish();
            }
        }

        let scratch = match &self.scratch_root {
            Some(root) => ScratchDir::new_in(root),
            None => ScratchDir::new(),
        };
        let scratch = match scratch {
            Ok(scratch) => scratch,
            Err(err) => {
                report.push(Violation::structure(err.to_string()));
                return report.finish();
            }
        };
        if let Err(err) = contents.extract_to(scratch.path()) {
            report.push(Violation::structure(err.to_string()));
            return report.finish();
        }

        let inner = self.validate_loose_file(&scratch.path().join(module_file));
        report.generation = inner.generation;
        report.violations = inner.violations;
        report.finish()
    }
}

/// Reason carried by a core error, without its variant prefix.
fn reason_of(err: &Error) -> String {
    match err {
        Error::StructureError { reason, .. }
        | Error::MetadataError { reason, .. }
        | Error::InterfaceError { reason, .. } => reason.clone(),
        other => render_chain(other),
    }
}

/// Maps a loader failure onto validation violations.
fn classify(err: &Error) -> Vec<Violation> {
    let Error::ExecutionError { stage, source, .. } = err else {
        return vec![Violation::structure(render_chain(err))];
    };
    match stage {
        ExecutionStage::Load if source.downcast_ref::<AlreadyLoading>().is_some() => {
            vec![Violation::structure(source.to_string())]
        }
        ExecutionStage::Load => vec![Violation::structure(format!(
            "module does not load: {}",
            render_chain(&**source)
        ))],
        ExecutionStage::Lookup => match source.downcast_ref::<ContractViolations>() {
            Some(ContractViolations(violations)) => violations
                .iter()
                .map(|v| Violation::interface(v.to_string()))
                .collect(),
            None => vec![Violation::interface(render_chain(&**source))],
        },
        ExecutionStage::Instantiate | ExecutionStage::Invoke => vec![Violation::interface(format!(
            "module cannot be instantiated: {}",
            render_chain(&**source)
        ))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use whorl_codec::archive::{ArchiveManifest, write_archive};
    use whorl_runtime::LoadRegistry;

    fn validator() -> PackageValidator {
        PackageValidator::with_loader(
            ItemLoader::default().with_registry(Arc::new(LoadRegistry::new())),
        )
    }

    const WIDGET: &str = r#"(module $Widget
        (memory (export "memory") 1)
        (data (i32.const 0) "widget")
        (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 6))
        (func $use (export "use") (result i32) (unreachable)))"#;

    fn write(dir: &Path, file: &str, text: &str) -> PathBuf {
        let path = dir.join(file);
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Writes an archive at `path` holding `module_file` and its manifest.
    fn write_item_archive(path: &Path, module_file: &str, text: &str) {
        let source = tempfile::tempdir().unwrap();
        write(source.path(), module_file, text);
        let stem = Path::new(module_file).file_stem().unwrap().to_str().unwrap();
        let manifest = ArchiveManifest::new(
            ItemName::new(stem).unwrap(),
            module_file,
            text.as_bytes(),
            None,
            "test",
        );
        write_archive(source.path(), &manifest, std::fs::File::create(path).unwrap()).unwrap();
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_valid_loose_file_never_calls_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "widget.wat", WIDGET);
        let report = validator().validate_loose_file(&path);
        assert!(report.valid, "{:?}", report.violations);
        assert!(report.generation.is_some());

        let item = report.into_result().unwrap();
        assert_eq!(item.identifier.as_str(), "widget");
        assert_eq!(item.type_name, "Widget");
    }

    #[test]
    fn test_misnamed_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "gadget.wat", WIDGET);
        let report = validator().validate_loose_file(&path);
        assert!(!report.valid);
        assert_eq!(report.violations[0].kind, ViolationKind::Interface);

        let err = report.into_result().unwrap_err();
        assert!(err.is_interface_error());
        assert!(err.to_string().contains("type name does not match module name"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = validator().validate_loose_file(&dir.path().join("ghost.wat"));
        assert!(!report.valid);
        assert!(report.into_result().unwrap_err().is_structure_error());
    }

    #[test]
    fn test_unparsable_module_is_structure_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "widget.wat", "(module $Widget");
        let report = validator().validate_loose_file(&path);
        assert_eq!(report.violations[0].kind, ViolationKind::Structure);
        assert!(report.violations[0].message.starts_with("module does not load"));
    }

    #[test]
    fn test_missing_use_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "widget.wat",
            r#"(module $Widget
                (memory (export "memory") 1)
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0)))"#,
        );
        let report = validator().validate_loose_file(&path);
        assert!(
            report
                .violations
                .iter()
                .any(|v| v.message == "no `use` operation found")
        );
    }

    #[test]
    fn test_bad_identifier_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let upper = write(dir.path(), "Widget.wat", WIDGET);
        assert!(!validator().validate_loose_file(&upper).valid);
        let text = write(dir.path(), "widget.txt", WIDGET);
        let report = validator().validate_loose_file(&text);
        assert!(report.violations[0].message.contains("not a module file"));
    }

    #[test]
    fn test_instantiation_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "widget.wat",
            r#"(module $Widget
                (memory (export "memory") 1)
                (func $boom (unreachable))
                (start $boom)
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
                (func $use (export "use") (result i32) (i32.const 0)))"#,
        );
        let report = validator().validate_loose_file(&path);
        assert!(!report.valid);
        assert!(report.violations[0].message.starts_with("module cannot be instantiated"));
    }

    #[test]
    fn test_each_validation_uses_fresh_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "widget.wat", WIDGET);
        let validator = validator();
        let first = validator.validate_loose_file(&path).generation.unwrap();
        let second = validator.validate_loose_file(&path).generation.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_candidates_sharing_an_identifier_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("good")).unwrap();
        std::fs::create_dir(dir.path().join("bad")).unwrap();
        let good = write(&dir.path().join("good"), "widget.wat", WIDGET);
        let bad = write(
            &dir.path().join("bad"),
            "widget.wat",
            &WIDGET.replace("$Widget", "$Gadget"),
        );

        let shared = validator();
        assert!(shared.validate_loose_file(&good).valid);
        assert!(!shared.validate_loose_file(&bad).valid);
        assert!(shared.validate_loose_file(&good).valid);

        let fresh = validator();
        assert!(!fresh.validate_loose_file(&bad).valid);
        assert!(fresh.validate_loose_file(&good).valid);
    }

    #[test]
    fn test_archive_without_expected_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Widget.whorl");
        write_item_archive(&path, "gadget.wat", &WIDGET.replace("$Widget", "$Gadget"));

        let report = validator().validate_archive_file(&path);
        assert!(!report.valid);
        assert!(report.identifier.is_none());
        assert_eq!(
            report.violations[0].message,
            "no module file for type `Widget` in archive"
        );
        assert!(report.into_result().unwrap_err().is_structure_error());
    }

    #[test]
    fn test_archive_scratch_removed_on_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let scratch_root = tempfile::tempdir().unwrap();
        let validator = validator().with_scratch_root(scratch_root.path());

        std::fs::create_dir(dir.path().join("valid")).unwrap();
        let valid = dir.path().join("valid").join("Widget.whorl");
        write_item_archive(&valid, "widget.wat", WIDGET);
        let report = validator.validate_archive_file(&valid);
        assert!(report.valid, "{:?}", report.violations);
        assert!(is_empty_dir(scratch_root.path()));

        std::fs::create_dir(dir.path().join("broken")).unwrap();
        let broken = dir.path().join("broken").join("Widget.whorl");
        write_item_archive(&broken, "widget.wat", "(module $Widget");
        let report = validator.validate_archive_file(&broken);
        assert_eq!(report.violations[0].kind, ViolationKind::Structure);
        assert!(is_empty_dir(scratch_root.path()));

        std::fs::create_dir(dir.path().join("no-use")).unwrap();
        let no_use = dir.path().join("no-use").join("Widget.whorl");
        write_item_archive(
            &no_use,
            "widget.wat",
            &WIDGET.replace("(export \"use\")", ""),
        );
        assert!(!validator.validate_archive_file(&no_use).valid);
        assert!(is_empty_dir(scratch_root.path()));

        let missing = dir.path().join("Gadget.whorl");
        write_item_archive(&missing, "widget.wat", WIDGET);
        assert!(!validator.validate_archive_file(&missing).valid);
        assert!(is_empty_dir(scratch_root.path()));
    }

    #[test]
    fn test_archive_with_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "Widget.zip", "not an archive");
        let report = validator().validate_archive_file(&path);
        assert!(report.violations[0].message.contains("not an item archive"));
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "Widget.whorl", "not an archive");
        let report = validator().validate_archive_file(&path);
        assert!(!report.valid);
        assert_eq!(report.violations[0].kind, ViolationKind::Structure);
    }
}
