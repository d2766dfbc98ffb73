//! Foreign Function Interface infrastructure
//!
//! Everything that crosses the native boundary lives here:
//! - Type descriptors and native value representations
//! - Value conversion (host ↔ native)
//! - Dynamic library loading and symbol resolution
//! - Marshalled native calls
//! - Native-callable trampolines around host functions
//! - Raw allocation tracking and record layouts
//!
//! # Safety
//!
//! FFI involves `unsafe` code and careful lifetime management. All
//! unsafe code is isolated in this module behind safe wrappers; the
//! remaining obligations (trusting loaded libraries, keeping callables
//! alive while native code holds their pointers) are documented on the
//! types that carry them.

pub mod callbacks;
pub mod caller;
pub mod convert;
pub mod layout;
pub mod loader;
pub mod memory;
pub mod types;

pub use callbacks::{CallbackError, NativeCallable};
pub use caller::{CallDescriptor, CallError, NativeFunction};
pub use convert::{ConvertContext, ConvertError};
pub use layout::{FieldLayout, LayoutError, StructLayout, StructLayoutBuilder};
pub use loader::{FunctionHandle, LibraryCache, LibraryHandle, LoadError, SymbolError};
pub use memory::{MemoryError, MemoryManager};
pub use types::{NativeValue, TypeDescriptor};
