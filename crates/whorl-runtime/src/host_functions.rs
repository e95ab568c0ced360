//! Host interface exposed to items.
//!
//! Items may import exactly three functions from the `whorl` module:
//!
//! | Import | Signature | Behavior |
//! |--------|-----------|----------|
//! | `emit` | `(ptr: i32, len: i32)` | report one UTF-8 message |
//! | `context_len` | `() -> i32` | byte length of the use context JSON |
//! | `context_read` | `(ptr: i32, cap: i32) -> i32` | copy up to `cap` context bytes to `ptr`, return the count |
//!
//! Every call is counted against the host call limit. Out-of-bounds
//! pointers, oversized messages and invalid UTF-8 trap the item.

use anyhow::{Context as _, anyhow, bail};
use tracing::debug;
use wasmtime::{Caller, Extern, Linker, Memory};

/// Module name under which host functions are registered.
pub const HOST_MODULE: &str = "whorl";

/// Largest message an item may emit in one call.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Per-materialization host state.
///
/// Holds the use context delivered to the item and the messages it emits.
#[derive(Debug, Default)]
pub struct HostState {
    identifier: String,
    context: Vec<u8>,
    messages: Vec<String>,
    capture: bool,
    call_count: usize,
    max_calls: Option<usize>,
}

impl HostState {
    /// Host state for a `use` call: the context is readable and emitted
    /// messages are collected.
    #[must_use]
    pub fn for_use(identifier: impl Into<String>, context_json: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            context: context_json,
            capture: true,
            ..Self::default()
        }
    }

    /// Host state with no context whose emitted messages are discarded.
    #[must_use]
    pub fn detached(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Sets the host call limit.
    #[must_use]
    pub const fn with_max_calls(mut self, max_calls: Option<usize>) -> Self {
        self.max_calls = max_calls;
        self
    }

    /// Number of host calls made so far.
    #[must_use]
    pub const fn call_count(&self) -> usize {
        self.call_count
    }

    /// Messages collected so far.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Consumes the state and returns the collected messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }

    fn check_call_limit(&mut self, function: &str) -> anyhow::Result<()> {
        self.call_count += 1;
        if let Some(max) = self.max_calls
            && self.call_count > max
        {
            bail!(
                "host call limit exceeded: {}/{max} (last call: {function})",
                self.call_count
            );
        }
        Ok(())
    }

    fn record(&mut self, message: String) {
        debug!(target: "whorl::plugin", item = %self.identifier, "{message}");
        if self.capture {
            self.messages.push(message);
        }
    }
}

/// Access to [`HostState`] from a store's data.
pub trait HasHostState {
    /// Shared access.
    fn host(&self) -> &HostState;
    /// Exclusive access.
    fn host_mut(&mut self) -> &mut HostState;
}

fn memory_of<T>(caller: &mut Caller<'_, T>) -> anyhow::Result<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => Err(anyhow!("item does not export `memory`")),
    }
}

pub(crate) fn checked_range(ptr: i32, len: i32, memory_size: usize) -> anyhow::Result<std::ops::Range<usize>> {
    let start = usize::try_from(ptr).context("negative pointer")?;
    let len = usize::try_from(len).context("negative length")?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow!("pointer overflow"))?;
    if end > memory_size {
        bail!("out-of-bounds access: {start}..{end} exceeds memory size {memory_size}");
    }
    Ok(start..end)
}

/// Registers the host interface on `linker`.
///
/// # Errors
///
/// Returns an error if a function cannot be registered.
pub fn link<T: HasHostState + 'static>(linker: &mut Linker<T>) -> anyhow::Result<()> {
    linker.func_wrap(
        HOST_MODULE,
        "emit",
        |mut caller: Caller<'_, T>, ptr: i32, len: i32| -> anyhow::Result<()> {
            caller.data_mut().host_mut().check_call_limit("emit")?;
            if usize::try_from(len).is_ok_and(|len| len > MAX_MESSAGE_BYTES) {
                bail!("emit: message exceeds {MAX_MESSAGE_BYTES} bytes");
            }
            let memory = memory_of(&mut caller)?;
            let data = memory.data(&caller);
            let range = checked_range(ptr, len, data.len()).context("emit")?;
            let message = std::str::from_utf8(&data[range])
                .context("emit: message is not valid UTF-8")?
                .to_string();
            caller.data_mut().host_mut().record(message);
            Ok(())
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "context_len",
        |mut caller: Caller<'_, T>| -> anyhow::Result<i32> {
            let host = caller.data_mut().host_mut();
            host.check_call_limit("context_len")?;
            i32::try_from(host.context.len()).context("context_len: context too large")
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "context_read",
        |mut caller: Caller<'_, T>, ptr: i32, cap: i32| -> anyhow::Result<i32> {
            caller.data_mut().host_mut().check_call_limit("context_read")?;
            let cap = usize::try_from(cap).context("context_read: negative capacity")?;
            let len = caller.data().host().context.len().min(cap);
            let count = i32::try_from(len).context("context_read: context too large")?;

            let memory = memory_of(&mut caller)?;
            let range = checked_range(ptr, count, memory.data_size(&caller)).context("context_read")?;
            let (memory_data, store_data) = memory.data_and_store_mut(&mut caller);
            memory_data[range].copy_from_slice(&store_data.host().context[..len]);
            Ok(count)
        },
    )?;

    debug!("host functions linked: emit, context_len, context_read");
    Ok(())
}
