//! Reconstruction and execution of items from retrieved bytes.
//!
//! Every call materializes the item from scratch: a fresh generation from
//! the [`LoadRegistry`], a fresh compile, a fresh store and fresh host
//! state. Nothing survives a single `use` or `describe`.
//!
//! Failures are reported as [`Error::ExecutionError`] tagged with the stage
//! at which they happened:
//!
//! | Stage | Covers |
//! |-------|--------|
//! | load | registry entry, archive unpacking, parse, compile |
//! | lookup | structural check against the item interface |
//! | instantiate | imports, initial memory, start function |
//! | invoke | `use` / `describe`, including a non-zero `use` status |

use crate::contract::{self, ContractViolations};
use crate::host_functions::HostState;
use crate::registry::{Generation, LoadRegistry, LoadTicket};
use crate::sandbox::{ItemInstance, Sandbox};
use crate::security::SecurityConfig;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use whorl_codec::archive::{ArchiveContents, is_archive_bytes};
use whorl_core::traits::{Item, UseContext, UseOutcome};
use whorl_core::{Error, ExecutionStage, ItemName, Result, TypeName};

/// An item's `use` returned a non-zero status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "item reported failure status {status}{}",
    .messages.last().map(|m| format!(": {m}")).unwrap_or_default()
)]
pub struct UseFailure {
    /// Status returned by `use`
    pub status: i32,
    /// Messages emitted before returning
    pub messages: Vec<String>,
}

/// Loads items into the sandbox and invokes them.
///
/// # Examples
///
/// ```
/// use whorl_core::ItemName;
/// use whorl_core::traits::UseContext;
/// use whorl_runtime::ItemLoader;
///
/// let wat = br#"(module $Bell
///     (import "whorl" "emit" (func $emit (param i32 i32)))
///     (memory (export "memory") 1)
///     (data (i32.const 0) "a brass bell")
///     (data (i32.const 16) "ding")
///     (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 12))
///     (func $use (export "use") (result i32)
///         (call $emit (i32.const 16) (i32.const 4))
///         (i32.const 0)))"#;
///
/// let loader = ItemLoader::default();
/// let name = ItemName::new("bell").unwrap();
/// assert_eq!(loader.describe(wat, &name).unwrap(), "a brass bell");
///
/// let outcome = loader.run(wat, &name, &UseContext::new("ada", ".")).unwrap();
/// assert_eq!(outcome.messages, vec!["ding"]);
/// ```
#[derive(Debug, Clone)]
pub struct ItemLoader {
    config: SecurityConfig,
    registry: Arc<LoadRegistry>,
}

impl Default for ItemLoader {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

impl ItemLoader {
    /// Creates a loader using the process-wide registry.
    #[must_use]
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            registry: LoadRegistry::global(),
        }
    }

    /// Uses `registry` instead of the process-wide one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<LoadRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Limits applied to every load.
    #[must_use]
    pub const fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Loads, checks and instantiates an item without calling it.
    ///
    /// The returned [`LoadedItem`] holds the registry entry for
    /// `identifier` until dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionError`] at the load, lookup or instantiate
    /// stage.
    pub fn load(&self, source: &[u8], identifier: &ItemName) -> Result<LoadedItem> {
        self.materialize(source, identifier, HostState::detached(identifier.as_str()))
    }

    /// Uses an item.
    ///
    /// `source` may be WebAssembly text, a binary module or a whole item
    /// archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionError`] if the item cannot be materialized,
    /// traps, runs out of budget, or returns a non-zero status (chained as
    /// [`UseFailure`]).
    pub fn run(
        &self,
        source: &[u8],
        identifier: &ItemName,
        ctx: &UseContext,
    ) -> Result<UseOutcome> {
        let context = ctx.to_json()?;
        self.materialize(
            source,
            identifier,
            HostState::for_use(identifier.as_str(), context.into_bytes()),
        )?
        .invoke_use()
    }

    /// Describes an item.
    ///
    /// Runs without a use context; emitted messages are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionError`] if the item cannot be materialized
    /// or `describe` fails.
    pub fn describe(&self, source: &[u8], identifier: &ItemName) -> Result<String> {
        self.load(source, identifier)?.invoke_describe()
    }

    fn materialize(
        &self,
        source: &[u8],
        identifier: &ItemName,
        host: HostState,
    ) -> Result<LoadedItem> {
        let start = Instant::now();
        let id = identifier.as_str();
        let load_error = |e: anyhow::Error| Error::execution(id, ExecutionStage::Load, e);

        let ticket = self.registry.begin(id)?;
        let module_bytes = resolve_source(source, identifier)
            .map_err(|e| Error::execution(id, ExecutionStage::Load, e))?;
        let sandbox = Sandbox::new(self.config.clone()).map_err(load_error)?;
        let module = sandbox.compile(&module_bytes).map_err(load_error)?;

        let violations = contract::inspect(&module, identifier);
        if !violations.is_empty() {
            return Err(Error::execution(
                id,
                ExecutionStage::Lookup,
                ContractViolations(violations),
            ));
        }

        let instance = sandbox
            .instantiate(&module, host)
            .map_err(|e| Error::execution(id, ExecutionStage::Instantiate, e))?;

        debug!(
            item = %identifier,
            generation = %ticket.generation(),
            elapsed = ?start.elapsed(),
            "item materialized"
        );
        Ok(LoadedItem {
            identifier: identifier.clone(),
            instance,
            ticket,
        })
    }
}

/// Extracts the module bytes from `source`.
///
/// Archives are recognized by their gzip magic; the module is the one named
/// by the manifest and its checksum is verified.
fn resolve_source<'a>(source: &'a [u8], identifier: &ItemName) -> Result<Cow<'a, [u8]>> {
    if !is_archive_bytes(source) {
        return Ok(Cow::Borrowed(source));
    }

    let label = TypeName::from_identifier(identifier).archive_file_name();
    let label = Path::new(&label);
    let contents = ArchiveContents::read(source, label)?;
    let (manifest, module) = contents.manifest_module(label)?;
    if manifest.identifier != *identifier {
        return Err(Error::StructureError {
            path: label.to_path_buf(),
            reason: format!(
                "archive holds item '{}', expected '{identifier}'",
                manifest.identifier
            ),
        });
    }
    debug!(item = %identifier, module = %manifest.module_file, "module taken from archive");
    Ok(Cow::Owned(module.to_vec()))
}

/// An instantiated item holding its registry entry.
#[derive(Debug)]
pub struct LoadedItem {
    identifier: ItemName,
    instance: ItemInstance,
    ticket: LoadTicket,
}

impl LoadedItem {
    /// Generation of this load.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.ticket.generation()
    }

    /// Identifier of the item.
    #[must_use]
    pub const fn identifier(&self) -> &ItemName {
        &self.identifier
    }

    fn invoke_error(&self, source: impl Into<whorl_core::BoxError>) -> Error {
        Error::execution(self.identifier.as_str(), ExecutionStage::Invoke, source)
    }

    /// Calls `use` and consumes the item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionError`] at the invoke stage if the call
    /// fails or returns a non-zero status.
    pub fn invoke_use(mut self) -> Result<UseOutcome> {
        let status = self
            .instance
            .call_use()
            .map_err(|e| self.invoke_error(e))?;
        let Self {
            identifier,
            instance,
            ticket,
        } = self;
        let messages = instance.into_host().into_messages();
        if status != 0 {
            return Err(Error::execution(
                identifier.as_str(),
                ExecutionStage::Invoke,
                UseFailure { status, messages },
            ));
        }

        info!(
            item = %identifier,
            generation = %ticket.generation(),
            messages = messages.len(),
            "item used"
        );
        Ok(UseOutcome::success(messages))
    }

    /// Calls `describe` and consumes the item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionError`] at the invoke stage if the call
    /// fails.
    pub fn invoke_describe(mut self) -> Result<String> {
        let description = self
            .instance
            .call_describe()
            .map_err(|e| self.invoke_error(e))?;
        info!(item = %self.identifier, generation = %self.generation(), "item described");
        Ok(description)
    }
}

/// An item backed by module bytes, materialized afresh on every call.
#[derive(Debug, Clone)]
pub struct WasmItem {
    identifier: ItemName,
    source: Vec<u8>,
    loader: ItemLoader,
}

impl WasmItem {
    /// Wraps decoded item bytes.
    #[must_use]
    pub const fn new(identifier: ItemName, source: Vec<u8>, loader: ItemLoader) -> Self {
        Self {
            identifier,
            source,
            loader,
        }
    }

    /// Identifier of the item.
    #[must_use]
    pub const fn identifier(&self) -> &ItemName {
        &self.identifier
    }
}

impl Item for WasmItem {
    fn describe(&self) -> Result<String> {
        self.loader.describe(&self.source, &self.identifier)
    }

    fn use_item(&self, ctx: &UseContext) -> Result<UseOutcome> {
        self.loader.run(&self.source, &self.identifier, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ItemName {
        ItemName::new(s).unwrap()
    }

    fn loader() -> ItemLoader {
        ItemLoader::default().with_registry(Arc::new(LoadRegistry::new()))
    }

    const FAILING: &str = r#"
        (module $Rope
            (import "whorl" "emit" (func $emit (param i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "the rope frays")
            (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 14))
            (func $use (export "use") (result i32)
                (call $emit (i32.const 0) (i32.const 14))
                (i32.const 7)))
    "#;

    #[test]
    fn test_use_failure_display() {
        let failure = UseFailure {
            status: 2,
            messages: vec!["first".to_string(), "last".to_string()],
        };
        assert_eq!(failure.to_string(), "item reported failure status 2: last");
        let silent = UseFailure {
            status: 1,
            messages: Vec::new(),
        };
        assert_eq!(silent.to_string(), "item reported failure status 1");
    }

    #[test]
    fn test_nonzero_status_is_invoke_failure() {
        let err = loader()
            .run(FAILING.as_bytes(), &name("rope"), &UseContext::default())
            .unwrap_err();
        assert_eq!(err.execution_stage(), Some(ExecutionStage::Invoke));
        let Error::ExecutionError { source, .. } = &err else {
            panic!("expected execution error, got {err:?}");
        };
        let failure = source.downcast_ref::<UseFailure>().unwrap();
        assert_eq!(failure.status, 7);
        assert_eq!(failure.messages, vec!["the rope frays"]);
    }

    #[test]
    fn test_describe_ignores_status() {
        let description = loader().describe(FAILING.as_bytes(), &name("rope")).unwrap();
        assert_eq!(description, "the rope frays");
    }

    #[test]
    fn test_contract_violation_is_lookup_failure() {
        let err = loader()
            .describe(FAILING.as_bytes(), &name("lasso"))
            .unwrap_err();
        assert_eq!(err.execution_stage(), Some(ExecutionStage::Lookup));
        let Error::ExecutionError { source, .. } = &err else {
            panic!("expected execution error, got {err:?}");
        };
        assert!(source.downcast_ref::<ContractViolations>().is_some());
    }

    #[test]
    fn test_unparsable_source_is_load_failure() {
        let err = loader()
            .describe(b"(module $Rope", &name("rope"))
            .unwrap_err();
        assert_eq!(err.execution_stage(), Some(ExecutionStage::Load));
    }

    #[test]
    fn test_registry_is_released_after_each_call() {
        let registry = Arc::new(LoadRegistry::new());
        let loader = ItemLoader::default().with_registry(Arc::clone(&registry));
        let _ = loader.run(FAILING.as_bytes(), &name("rope"), &UseContext::default());
        let _ = loader.describe(b"garbage", &name("rope"));
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_loaded_item_blocks_reentry() {
        let loader = loader();
        let loaded = loader.load(FAILING.as_bytes(), &name("rope")).unwrap();
        let err = loader
            .describe(FAILING.as_bytes(), &name("rope"))
            .unwrap_err();
        assert_eq!(err.execution_stage(), Some(ExecutionStage::Load));
        drop(loaded);
        assert!(loader.describe(FAILING.as_bytes(), &name("rope")).is_ok());
    }

    #[test]
    fn test_wasm_item_implements_contract() {
        let item = WasmItem::new(name("rope"), FAILING.as_bytes().to_vec(), loader());
        assert_eq!(item.describe().unwrap(), "the rope frays");
        assert!(item.use_item(&UseContext::default()).is_err());
    }
}
