//! Wasmtime sandbox for item execution.
//!
//! A [`Sandbox`] owns its own engine, so the epoch counter used for the
//! wall-clock deadline is never shared with another materialization. Items
//! get no WASI and no imports beyond [`crate::host_functions`].
//!
//! Every guarded call (instantiation, `use`, `describe`) is given a fresh
//! fuel budget and an epoch deadline. A watchdog thread bumps the epoch only
//! if the call outlives [`SecurityConfig::execution_timeout`].
//!
//! # Examples
//!
//! ```
//! use whorl_runtime::host_functions::HostState;
//! use whorl_runtime::sandbox::Sandbox;
//! use whorl_runtime::security::SecurityConfig;
//!
//! let sandbox = Sandbox::new(SecurityConfig::strict()).unwrap();
//! let module = sandbox
//!     .compile(br#"(module $Pebble
//!         (memory (export "memory") 1)
//!         (data (i32.const 0) "a pebble")
//!         (func (export "describe") (result i32 i32) (i32.const 0) (i32.const 8))
//!         (func (export "use") (result i32) (i32.const 0)))"#)
//!     .unwrap();
//! let mut instance = sandbox
//!     .instantiate(&module, HostState::detached("pebble"))
//!     .unwrap();
//! assert_eq!(instance.call_describe().unwrap(), "a pebble");
//! ```

use crate::contract::{DESCRIBE_EXPORT, MEMORY_EXPORT, USE_EXPORT};
use crate::host_functions::{self, HasHostState, HostState, checked_range};
use crate::security::SecurityConfig;
use anyhow::{Context as _, anyhow, bail};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use wasmtime::{
    Config, Engine, Instance, Linker, Module, ResourceLimiter, Store, Strategy, Trap,
    WasmBacktraceDetails,
};

/// Largest description an item may return.
pub const MAX_DESCRIPTION_BYTES: usize = 64 * 1024;

/// Store data combining host state and resource limiter.
#[derive(Debug)]
struct StoreData {
    host: HostState,
    limiter: MemoryLimiter,
}

impl HasHostState for StoreData {
    fn host(&self) -> &HostState {
        &self.host
    }

    fn host_mut(&mut self) -> &mut HostState {
        &mut self.host
    }
}

/// Memory limiter for the store.
///
/// Growth beyond the limit is an error, which traps the item instead of
/// letting `memory.grow` quietly return -1.
#[derive(Debug)]
struct MemoryLimiter {
    max_memory_bytes: usize,
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.max_memory_bytes {
            warn!(
                desired,
                limit = self.max_memory_bytes,
                "memory limit exceeded"
            );
            bail!(
                "memory limit exceeded: {desired} bytes requested, limit is {} bytes",
                self.max_memory_bytes
            );
        }
        trace!("memory growing: {current} -> {desired} bytes");
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Bumps the engine epoch if not stopped before the deadline.
struct Watchdog {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn start(engine: &Engine, timeout: Duration) -> anyhow::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let engine = engine.clone();
        let handle = std::thread::Builder::new()
            .name("whorl-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(timeout) {
                    debug!(?timeout, "deadline reached, interrupting item");
                    engine.increment_epoch();
                }
            })
            .context("failed to start watchdog thread")?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("watchdog thread panicked");
        }
    }
}

/// Execution sandbox with enforced limits.
///
/// Create one per materialization; nothing compiled or instantiated here
/// outlives it.
pub struct Sandbox {
    engine: Engine,
    linker: Linker<StoreData>,
    config: SecurityConfig,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Creates a sandbox with its own engine and host linker.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be configured or the host
    /// interface cannot be linked.
    pub fn new(config: SecurityConfig) -> anyhow::Result<Self> {
        let mut wasmtime_config = Config::new();
        wasmtime_config.wasm_backtrace_details(WasmBacktraceDetails::Enable);
        wasmtime_config.strategy(Strategy::Cranelift);
        wasmtime_config.consume_fuel(config.max_fuel().is_some());
        wasmtime_config.epoch_interruption(true);

        let engine = Engine::new(&wasmtime_config).context("failed to create wasmtime engine")?;
        let mut linker = Linker::new(&engine);
        host_functions::link(&mut linker)?;

        Ok(Self {
            engine,
            linker,
            config,
        })
    }

    /// Limits in force.
    #[must_use]
    pub const fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Compiles WebAssembly text or binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or the module does not
    /// validate.
    pub fn compile(&self, source: &[u8]) -> anyhow::Result<Module> {
        let start = Instant::now();
        let wasm = wat::parse_bytes(source).context("module does not parse")?;
        let module = Module::new(&self.engine, &wasm).context("module does not compile")?;
        debug!(
            bytes = wasm.len(),
            elapsed = ?start.elapsed(),
            "module compiled"
        );
        Ok(module)
    }

    /// Instantiates `module` in a fresh store owning `host`.
    ///
    /// Instantiation runs the module's start function, so it is guarded like
    /// any other call.
    ///
    /// # Errors
    ///
    /// Returns an error if an import cannot be satisfied, the initial memory
    /// exceeds the limit, or the start function traps or runs out of budget.
    pub fn instantiate(&self, module: &Module, host: HostState) -> anyhow::Result<ItemInstance> {
        let store_data = StoreData {
            host: host.with_max_calls(self.config.max_host_calls()),
            limiter: MemoryLimiter {
                max_memory_bytes: self.config.memory_limit_bytes(),
            },
        };
        let mut store = Store::new(&self.engine, store_data);
        store.limiter(|data| &mut data.limiter);

        let instance = guarded(&self.engine, &self.config, &mut store, |store| {
            self.linker.instantiate(store, module)
        })?;

        Ok(ItemInstance {
            engine: self.engine.clone(),
            config: self.config.clone(),
            store,
            instance,
        })
    }
}

/// Runs `call` under a fresh fuel budget and wall-clock deadline.
fn guarded<R>(
    engine: &Engine,
    config: &SecurityConfig,
    store: &mut Store<StoreData>,
    call: impl FnOnce(&mut Store<StoreData>) -> anyhow::Result<R>,
) -> anyhow::Result<R> {
    if let Some(fuel) = config.max_fuel() {
        store.set_fuel(fuel)?;
    }
    store.set_epoch_deadline(1);

    let watchdog = Watchdog::start(engine, config.execution_timeout())?;
    let result = call(store);
    drop(watchdog);

    result.map_err(|e| match e.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => e.context(format!(
            "fuel budget of {} exhausted",
            config.max_fuel().unwrap_or_default()
        )),
        Some(Trap::Interrupt) => e.context(format!(
            "execution exceeded deadline of {:?}",
            config.execution_timeout()
        )),
        _ => e,
    })
}

/// An instantiated item inside its store.
pub struct ItemInstance {
    engine: Engine,
    config: SecurityConfig,
    store: Store<StoreData>,
    instance: Instance,
}

impl std::fmt::Debug for ItemInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemInstance")
            .field("host", &self.store.data().host)
            .finish_non_exhaustive()
    }
}

impl ItemInstance {
    /// Calls `use` and returns its status.
    ///
    /// # Errors
    ///
    /// Returns an error if `use` is missing or mistyped, traps, exhausts its
    /// fuel, outlives the deadline or exceeds the host call limit.
    pub fn call_use(&mut self) -> anyhow::Result<i32> {
        let func = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, USE_EXPORT)
            .context("no `use` operation found")?;
        guarded(&self.engine, &self.config, &mut self.store, |store| {
            func.call(store, ())
        })
    }

    /// Calls `describe` and reads the returned string from memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `describe` fails like [`Self::call_use`], or if
    /// the returned range is out of bounds, too long or not UTF-8.
    pub fn call_describe(&mut self) -> anyhow::Result<String> {
        let func = self
            .instance
            .get_typed_func::<(), (i32, i32)>(&mut self.store, DESCRIBE_EXPORT)
            .context("no `describe` operation found")?;
        let (ptr, len) = guarded(&self.engine, &self.config, &mut self.store, |store| {
            func.call(store, ())
        })?;

        if usize::try_from(len).is_ok_and(|len| len > MAX_DESCRIPTION_BYTES) {
            bail!("description exceeds {MAX_DESCRIPTION_BYTES} bytes");
        }
        let memory = self
            .instance
            .get_memory(&mut self.store, MEMORY_EXPORT)
            .ok_or_else(|| anyhow!("item does not export `memory`"))?;
        let data = memory.data(&self.store);
        let range = checked_range(ptr, len, data.len()).context("describe")?;
        let text = std::str::from_utf8(&data[range]).context("description is not valid UTF-8")?;
        Ok(text.to_string())
    }

    /// Host state of the store.
    #[must_use]
    pub fn host(&self) -> &HostState {
        &self.store.data().host
    }

    /// Consumes the instance and returns its host state.
    #[must_use]
    pub fn into_host(self) -> HostState {
        self.store.into_data().host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEBBLE: &str = r#"
        (module $Pebble
            (import "whorl" "emit" (func $emit (param i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "a smooth pebble")
            (data (i32.const 32) "you skip the pebble")
            (func (export "describe") (result i32 i32)
                (i32.const 0) (i32.const 15))
            (func $use (export "use") (result i32)
                (call $emit (i32.const 32) (i32.const 19))
                (i32.const 0)))
    "#;

    #[test]
    fn test_sandbox_creation() {
        assert!(Sandbox::new(SecurityConfig::default()).is_ok());
        assert!(
            Sandbox::new(SecurityConfig::builder().unlimited_fuel().build()).is_ok()
        );
    }

    #[test]
    fn test_invalid_module() {
        let sandbox = Sandbox::new(SecurityConfig::default()).unwrap();
        assert!(sandbox.compile(&[0x00, 0x01, 0x02, 0x03]).is_err());
        assert!(sandbox.compile(b"(module").is_err());
    }

    #[test]
    fn test_binary_module_accepted() {
        let sandbox = Sandbox::new(SecurityConfig::default()).unwrap();
        let wasm = wat::parse_str(PEBBLE).unwrap();
        let module = sandbox.compile(&wasm).unwrap();
        assert_eq!(module.name(), Some("Pebble"));
    }

    #[test]
    fn test_use_collects_messages() {
        let sandbox = Sandbox::new(SecurityConfig::default()).unwrap();
        let module = sandbox.compile(PEBBLE.as_bytes()).unwrap();
        let mut instance = sandbox
            .instantiate(&module, HostState::for_use("pebble", b"{}".to_vec()))
            .unwrap();
        assert_eq!(instance.call_use().unwrap(), 0);
        assert_eq!(instance.into_host().into_messages(), vec!["you skip the pebble"]);
    }

    #[test]
    fn test_describe_reads_memory() {
        let sandbox = Sandbox::new(SecurityConfig::default()).unwrap();
        let module = sandbox.compile(PEBBLE.as_bytes()).unwrap();
        let mut instance = sandbox
            .instantiate(&module, HostState::detached("pebble"))
            .unwrap();
        assert_eq!(instance.call_describe().unwrap(), "a smooth pebble");
    }

    #[test]
    fn test_describe_out_of_bounds() {
        let sandbox = Sandbox::new(SecurityConfig::default()).unwrap();
        let module = sandbox
            .compile(
                br#"(module $Pebble
                    (memory (export "memory") 1)
                    (func (export "describe") (result i32 i32)
                        (i32.const 65530) (i32.const 100))
                    (func (export "use") (result i32) (i32.const 0)))"#,
            )
            .unwrap();
        let mut instance = sandbox
            .instantiate(&module, HostState::detached("pebble"))
            .unwrap();
        let err = instance.call_describe().unwrap_err();
        assert!(format!("{err:#}").contains("out-of-bounds"));
    }

    #[test]
    fn test_memory_limiter_rejects_growth() {
        let mut limiter = MemoryLimiter {
            max_memory_bytes: 1024,
        };
        assert!(limiter.memory_growing(0, 512, None).unwrap());
        assert!(limiter.memory_growing(512, 2048, None).is_err());
    }

    #[test]
    fn test_watchdog_stops_without_bumping_epoch() {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).unwrap();
        let watchdog = Watchdog::start(&engine, Duration::from_secs(60)).unwrap();
        let start = Instant::now();
        drop(watchdog);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
