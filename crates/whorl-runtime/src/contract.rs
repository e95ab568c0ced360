//! Structural check of a compiled module against the item interface.
//!
//! Nothing is instantiated or called here; the check only reads the module
//! name section, its exports and its imports.

use crate::host_functions::HOST_MODULE;
use std::fmt;
use wasmtime::{ExternType, FuncType, Module, ValType};
use whorl_core::{ItemName, TypeName};

/// Export carrying the `use` operation.
pub const USE_EXPORT: &str = "use";

/// Export carrying the `describe` operation.
pub const DESCRIBE_EXPORT: &str = "describe";

/// Exported linear memory.
pub const MEMORY_EXPORT: &str = "memory";

/// Launcher export added by the package builder.
pub const START_EXPORT: &str = "_start";

/// One way a module falls short of the item interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The module declares no type name.
    #[error("module declares no type name (expected `(module ${expected} ...)`)")]
    MissingTypeName {
        /// Type name derived from the identifier
        expected: String,
    },

    /// The declared type name differs from the identifier's type name.
    #[error("type name does not match module name: expected `{expected}`, found `{found}`")]
    TypeNameMismatch {
        /// Type name derived from the identifier
        expected: String,
        /// Type name declared by the module
        found: String,
    },

    /// A required operation is not exported.
    #[error("no `{operation}` operation found")]
    MissingOperation {
        /// Operation name
        operation: &'static str,
    },

    /// An export has the wrong kind or signature.
    #[error("`{export}` must be `{expected}`")]
    BadExport {
        /// Export name
        export: &'static str,
        /// Expected shape
        expected: &'static str,
    },

    /// The module does not export its memory.
    #[error("no exported `memory` found")]
    MissingMemory,

    /// An import lies outside the host interface.
    #[error("import `{module}::{name}` is not part of the host interface")]
    ForeignImport {
        /// Import module
        module: String,
        /// Import name
        name: String,
    },

    /// A host import is declared with the wrong signature.
    #[error("import `whorl::{name}` must be `{expected}`")]
    BadImport {
        /// Import name
        name: String,
        /// Expected signature
        expected: &'static str,
    },
}

/// Every violation found in one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolations(pub Vec<ContractViolation>);

impl fmt::Display for ContractViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ContractViolations {}

fn join_types(types: impl Iterator<Item = ValType>) -> Vec<String> {
    types.map(|ty| ty.to_string()).collect()
}

/// Renders a function type as `(i32, i32) -> i32`.
fn shape(ty: &FuncType) -> String {
    let params = join_types(ty.params()).join(", ");
    let results = join_types(ty.results());
    match results.as_slice() {
        [] => format!("({params}) -> ()"),
        [single] => format!("({params}) -> {single}"),
        many => format!("({params}) -> ({})", many.join(", ")),
    }
}

fn host_import_shape(name: &str) -> Option<&'static str> {
    match name {
        "emit" => Some("(i32, i32) -> ()"),
        "context_len" => Some("() -> i32"),
        "context_read" => Some("(i32, i32) -> i32"),
        _ => None,
    }
}

fn check_func_export(
    module: &Module,
    export: &'static str,
    expected: &'static str,
    required: bool,
    violations: &mut Vec<ContractViolation>,
) {
    match module.get_export(export) {
        Some(ExternType::Func(ty)) if shape(&ty) == expected => {}
        Some(_) => violations.push(ContractViolation::BadExport { export, expected }),
        None if required => {
            violations.push(ContractViolation::MissingOperation { operation: export });
        }
        None => {}
    }
}

/// Checks `module` against the item interface for `identifier`.
///
/// Returns every violation found; an empty list means the module conforms.
#[must_use]
pub fn inspect(module: &Module, identifier: &ItemName) -> Vec<ContractViolation> {
    let mut violations = Vec::new();
    let expected = TypeName::from_identifier(identifier);

    match module.name() {
        None => violations.push(ContractViolation::MissingTypeName {
            expected: expected.to_string(),
        }),
        Some(found) if expected != found => {
            violations.push(ContractViolation::TypeNameMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Some(_) => {}
    }

    check_func_export(module, USE_EXPORT, "() -> i32", true, &mut violations);
    check_func_export(module, DESCRIBE_EXPORT, "() -> (i32, i32)", true, &mut violations);
    check_func_export(module, START_EXPORT, "() -> ()", false, &mut violations);

    match module.get_export(MEMORY_EXPORT) {
        Some(ExternType::Memory(_)) => {}
        Some(_) => violations.push(ContractViolation::BadExport {
            export: MEMORY_EXPORT,
            expected: "memory",
        }),
        None => violations.push(ContractViolation::MissingMemory),
    }

    for import in module.imports() {
        let name = import.name();
        let allowed = if import.module() == HOST_MODULE {
            host_import_shape(name)
        } else {
            None
        };
        let Some(expected) = allowed else {
            violations.push(ContractViolation::ForeignImport {
                module: import.module().to_string(),
                name: name.to_string(),
            });
            continue;
        };
        let conforms = matches!(import.ty(), ExternType::Func(ty) if shape(&ty) == expected);
        if !conforms {
            violations.push(ContractViolation::BadImport {
                name: name.to_string(),
                expected,
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::Engine;

    fn compile(wat: &str) -> Module {
        Module::new(&Engine::default(), wat::parse_str(wat).unwrap()).unwrap()
    }

    fn name(s: &str) -> ItemName {
        ItemName::new(s).unwrap()
    }

    const WIDGET: &str = r#"
        (module $Widget
            (import "whorl" "emit" (func $emit (param i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "a widget")
            (func (export "describe") (result i32 i32)
                (i32.const 0) (i32.const 8))
            (func $use (export "use") (result i32)
                (call $emit (i32.const 0) (i32.const 8))
                (i32.const 0)))
    "#;

    #[test]
    fn test_conforming_module() {
        assert!(inspect(&compile(WIDGET), &name("widget")).is_empty());
    }

    #[test]
    fn test_type_name_mismatch() {
        let violations = inspect(&compile(WIDGET), &name("gadget"));
        assert_eq!(violations.len(), 1);
        assert!(
            violations[0]
                .to_string()
                .contains("type name does not match module name")
        );
    }

    #[test]
    fn test_missing_type_name() {
        let module = compile(
            r#"(module
                (memory (export "memory") 1)
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
                (func (export "use") (result i32) (i32.const 0)))"#,
        );
        assert_eq!(
            inspect(&module, &name("widget")),
            vec![ContractViolation::MissingTypeName {
                expected: "Widget".to_string()
            }]
        );
    }

    #[test]
    fn test_missing_use_and_memory() {
        let module = compile(
            r#"(module $Widget
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0)))"#,
        );
        let violations = inspect(&module, &name("widget"));
        assert!(violations.contains(&ContractViolation::MissingOperation { operation: "use" }));
        assert!(violations.contains(&ContractViolation::MissingMemory));
        assert!(
            violations
                .iter()
                .any(|v| v.to_string() == "no `use` operation found")
        );
    }

    #[test]
    fn test_wrong_use_signature() {
        let module = compile(
            r#"(module $Widget
                (memory (export "memory") 1)
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
                (func (export "use") (param i32)))"#,
        );
        let violations = inspect(&module, &name("widget"));
        assert_eq!(
            violations,
            vec![ContractViolation::BadExport {
                export: "use",
                expected: "() -> i32"
            }]
        );
    }

    #[test]
    fn test_foreign_import_rejected() {
        let module = compile(
            r#"(module $Widget
                (import "wasi_snapshot_preview1" "fd_write"
                    (func (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
                (func (export "use") (result i32) (i32.const 0)))"#,
        );
        let violations = inspect(&module, &name("widget"));
        assert!(matches!(
            &violations[..],
            [ContractViolation::ForeignImport { module, .. }] if module == "wasi_snapshot_preview1"
        ));
    }

    #[test]
    fn test_host_import_with_wrong_signature() {
        let module = compile(
            r#"(module $Widget
                (import "whorl" "emit" (func (param i32)))
                (memory (export "memory") 1)
                (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 0))
                (func (export "use") (result i32) (i32.const 0)))"#,
        );
        let violations = inspect(&module, &name("widget"));
        assert!(matches!(
            &violations[..],
            [ContractViolation::BadImport { name, .. }] if name == "emit"
        ));
    }

    #[test]
    fn test_violations_display_joins() {
        let all = ContractViolations(vec![
            ContractViolation::MissingMemory,
            ContractViolation::MissingOperation { operation: "use" },
        ]);
        assert_eq!(
            all.to_string(),
            "no exported `memory` found; no `use` operation found"
        );
    }
}
