//! Sandboxed loading and execution of Whorl items.
//!
//! Items are WebAssembly modules. They run in a wasmtime store with no WASI,
//! a memory ceiling, a fuel budget, a wall-clock deadline and a host
//! interface of three functions (see [`host_functions`]).
//!
//! - [`loader`]: materializes items from text, binary or archive bytes
//! - [`contract`]: structural check against the item interface
//! - [`sandbox`]: engine, store and guarded calls
//! - [`registry`]: in-flight load tracking
//! - [`security`]: sandbox limits and profiles

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod contract;
pub mod host_functions;
pub mod loader;
pub mod registry;
pub mod sandbox;
pub mod security;

pub use contract::{ContractViolation, ContractViolations};
pub use loader::{ItemLoader, LoadedItem, UseFailure, WasmItem};
pub use registry::{Generation, LoadRegistry};
pub use security::{SecurityConfig, SecurityProfile};
