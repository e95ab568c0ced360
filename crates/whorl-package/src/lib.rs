//! Validation, packaging and scaffolding of Whorl items.
//!
//! - [`validator`] checks loose module files and built archives against the
//!   item interface without running them.
//! - [`builder`] turns a Source Tree into a `<TypeName>.whorl` archive.
//! - [`entrypoint`] injects the `_start` launcher into staged modules.
//! - [`scaffold`] writes a new Source Tree.
//!
//! # Examples
//!
//! ```
//! use whorl_core::ItemName;
//! use whorl_package::{PackageBuilder, ScaffoldOptions, create_source_tree};
//!
//! let workspace = tempfile::tempdir().unwrap();
//! let options = ScaffoldOptions::new(ItemName::new("widget").unwrap(), "ada");
//! let tree = create_source_tree(workspace.path(), &options).unwrap();
//!
//! let archive = PackageBuilder::new(&tree).package(workspace.path(), false).unwrap();
//! assert!(archive.ends_with("Widget.whorl"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod builder;
pub mod entrypoint;
pub mod scaffold;
pub mod scratch;
pub mod validator;

pub use builder::{PackageBuilder, SourceTree};
pub use entrypoint::{ENTRYPOINT_MARKER, ensure_entrypoint, has_entrypoint, inject_entrypoint};
pub use scaffold::{ScaffoldOptions, create_source_tree, module_template};
pub use scratch::ScratchDir;
pub use validator::{PackageValidator, ValidatedItem, ValidationReport, Violation, ViolationKind};
