//! Charon Bridge - foreign-function bridge and operation dispatcher
//!
//! This library provides the complete bridge runtime including:
//! - Value conversion between the host universe and the native ABI
//! - Dynamic library loading with cached symbol resolution
//! - Marshalled native calls driven by immutable call descriptors
//! - Native-callable trampolines around host functions
//! - Tracked raw allocations and record layouts
//! - Named-operation dispatch across native and host backends

/// Charon bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod bridge;
pub mod dispatch;
pub mod ffi;
pub mod manifest;
pub mod value;

// Re-export commonly used types
pub use bridge::Bridge;
pub use dispatch::{BackendHint, DispatchError, OperationDispatcher};
pub use ffi::{
    CallDescriptor, CallError, CallbackError, ConvertContext, ConvertError, FunctionHandle,
    LibraryCache, LibraryHandle, LoadError, MemoryError, MemoryManager, NativeCallable,
    NativeFunction, NativeValue, StructLayout, StructLayoutBuilder, SymbolError, TypeDescriptor,
};
pub use manifest::{Manifest, ManifestError, OperationRecord};
pub use value::{HostError, HostFn, Value};
