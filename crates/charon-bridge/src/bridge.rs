//! Bridge context for embedding
//!
//! `Bridge` is the explicit context object an embedder creates, holds,
//! and tears down: it owns the library cache, the allocation table, and
//! the operation registry. Nothing here is a process-wide singleton;
//! lifecycle is entirely caller-controlled.

use crate::dispatch::{BackendHint, DispatchError, OperationDispatcher};
use crate::ffi::caller::{CallDescriptor, NativeFunction};
use crate::ffi::loader::{FunctionHandle, LibraryCache, LibraryHandle, LoadError, SymbolError};
use crate::ffi::memory::{MemoryError, MemoryManager};
use crate::manifest::{Manifest, ManifestError};
use crate::value::{HostError, Value};
use charon_config::BridgeSettings;
use std::sync::Arc;

/// An embedder-owned bridge instance.
///
/// # Example
///
/// ```
/// use charon_bridge::{BackendHint, Bridge, HostError, Value};
///
/// let bridge = Bridge::new();
/// bridge.register_host("add", |args: &[Value]| match (&args[0], &args[1]) {
///     (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
///     _ => Err(HostError::Type("add expects ints".into())),
/// });
///
/// let result = bridge
///     .dispatch("add", &[Value::Int(2), Value::Int(3)], BackendHint::Auto)
///     .unwrap();
/// assert_eq!(result, Value::Int(5));
/// ```
#[derive(Default)]
pub struct Bridge {
    libraries: LibraryCache,
    memory: MemoryManager,
    operations: OperationDispatcher,
}

impl Bridge {
    /// Create a bridge with platform-default library search paths and an
    /// empty registry.
    pub fn new() -> Self {
        Self {
            libraries: LibraryCache::new(),
            memory: MemoryManager::new(),
            operations: OperationDispatcher::new(),
        }
    }

    /// Create a bridge from resolved configuration: configured search
    /// paths take priority, and every configured manifest is registered.
    pub fn with_settings(settings: &BridgeSettings) -> Result<Self, ManifestError> {
        let bridge = Self::new();
        // Prepending reverses order, so walk the list back-to-front to
        // keep the configured priority
        for path in settings.search_paths.iter().rev() {
            bridge.libraries.add_search_path(path.clone());
        }
        for path in &settings.manifest_paths {
            let manifest = Manifest::load_file(path)?;
            bridge.register_manifest(&manifest);
        }
        Ok(bridge)
    }

    /// The library and symbol cache.
    pub fn libraries(&self) -> &LibraryCache {
        &self.libraries
    }

    /// The allocation table.
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// The operation registry.
    pub fn operations(&self) -> &OperationDispatcher {
        &self.operations
    }

    /// Load (or fetch the cached handle for) a library.
    pub fn load(&self, name: &str) -> Result<LibraryHandle, LoadError> {
        self.libraries.load(name)
    }

    /// Resolve a symbol, loading its library first if needed.
    pub fn resolve(&self, name: &str, symbol: &str) -> Result<FunctionHandle, SymbolError> {
        self.libraries.resolve(name, symbol)
    }

    /// Register a native operation from its call descriptor.
    pub fn register_native(&self, name: impl Into<String>, descriptor: CallDescriptor) {
        self.operations
            .register_native(name, NativeFunction::new(descriptor));
    }

    /// Register a host operation.
    pub fn register_host(
        &self,
        name: impl Into<String>,
        host_fn: impl Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    ) {
        self.operations.register_host(name, Arc::new(host_fn));
    }

    /// Register every operation in a parsed manifest; returns the count.
    pub fn register_manifest(&self, manifest: &Manifest) -> usize {
        for record in &manifest.operations {
            self.register_native(record.op_name.clone(), record.descriptor());
        }
        manifest.len()
    }

    /// Parse and register manifest JSON; returns the count.
    pub fn register_manifest_json(&self, json: &str) -> Result<usize, ManifestError> {
        let manifest = Manifest::parse(json)?;
        Ok(self.register_manifest(&manifest))
    }

    /// Route one operation per the backend hint.
    pub fn dispatch(
        &self,
        name: &str,
        args: &[Value],
        hint: BackendHint,
    ) -> Result<Value, DispatchError> {
        self.operations.dispatch(&self.libraries, name, args, hint)
    }

    /// Pure registration lookup under the same routing rules.
    pub fn has(&self, name: &str, hint: BackendHint) -> bool {
        self.operations.has(name, hint)
    }

    /// Allocate a tracked native buffer.
    pub fn allocate(&self, size: usize) -> Result<Value, MemoryError> {
        self.memory.allocate(size).map(|ptr| Value::Ptr(ptr as usize))
    }

    /// Free a tracked native buffer previously returned by `allocate`.
    pub fn free(&self, ptr: &Value) -> Result<(), MemoryError> {
        match ptr {
            Value::Ptr(addr) => self.memory.free(*addr as *mut u8),
            _ => Err(MemoryError::DoubleFree { addr: 0 }),
        }
    }

    /// Release every tracked allocation; idempotent.
    pub fn release_all(&self) {
        self.memory.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::types::TypeDescriptor;

    #[test]
    fn host_registration_and_dispatch() {
        let bridge = Bridge::new();
        bridge.register_host("neg", |args: &[Value]| match &args[0] {
            Value::Int(i) => Ok(Value::Int(-i)),
            _ => Err(HostError::Type("neg expects int".into())),
        });

        assert!(bridge.has("neg", BackendHint::Host));
        assert!(!bridge.has("neg", BackendHint::Native));
        assert_eq!(
            bridge
                .dispatch("neg", &[Value::Int(5)], BackendHint::Auto)
                .unwrap(),
            Value::Int(-5)
        );
    }

    #[test]
    fn native_registration_is_visible_without_loading() {
        let bridge = Bridge::new();
        bridge.register_native(
            "cosine",
            CallDescriptor::new(
                "m",
                "cos",
                TypeDescriptor::Float64,
                vec![TypeDescriptor::Float64],
            ),
        );
        // Registration never touches the loader
        assert!(bridge.has("cosine", BackendHint::Native));
        assert_eq!(bridge.libraries().loaded_count(), 0);
    }

    #[test]
    fn manifest_json_registers_operations() {
        let bridge = Bridge::new();
        let count = bridge
            .register_manifest_json(
                r#"[
                    {"opName": "a", "libraryPath": "liba.so", "symbolName": "a",
                     "returnType": "int", "argTypes": ["int"]},
                    {"opName": "b", "libraryPath": "libb.so", "symbolName": "b",
                     "returnType": "void", "argTypes": []}
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 2);
        assert!(bridge.has("a", BackendHint::Native));
        assert!(bridge.has("b", BackendHint::Native));
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let bridge = Bridge::new();
        let ptr = bridge.allocate(64).unwrap();
        assert!(matches!(ptr, Value::Ptr(_)));
        assert_eq!(bridge.memory().tracked(), 1);

        bridge.free(&ptr).unwrap();
        assert_eq!(bridge.memory().tracked(), 0);
        assert!(bridge.free(&ptr).is_err());
    }

    #[test]
    fn free_of_non_pointer_value_is_rejected() {
        let bridge = Bridge::new();
        assert!(bridge.free(&Value::Int(42)).is_err());
    }

    #[test]
    fn release_all_through_the_bridge() {
        let bridge = Bridge::new();
        bridge.allocate(8).unwrap();
        bridge.allocate(8).unwrap();
        bridge.release_all();
        assert_eq!(bridge.memory().tracked(), 0);
        bridge.release_all();
        assert_eq!(bridge.memory().tracked(), 0);
    }
}
