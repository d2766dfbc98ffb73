//! Named-operation dispatch
//!
//! `OperationDispatcher` maps operation names to up to two backends: a
//! native implementation (a marshalled library call) and a host
//! implementation (an in-process closure). Dispatch follows the backend
//! hint exactly: explicit hints never fall back, and `Auto` prefers
//! Native over Host. That precedence is fixed, not a heuristic.
//!
//! Registration is last-write-wins per (name, backend); entries are never
//! implicitly removed. Each dispatch is independent: there is no state
//! beyond registry membership, and the registry lock is released before
//! any backend executes.

use crate::ffi::caller::{CallError, NativeFunction};
use crate::ffi::loader::LibraryCache;
use crate::value::{HostError, HostFn, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Which backend a dispatch should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendHint {
    /// Native if registered, else Host; Native always wins ties
    #[default]
    Auto,
    /// Native only; never falls back
    Native,
    /// Host only; never falls back
    Host,
}

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No implementation registered for this name under this hint
    #[error("operation '{name}' not registered for {hint:?} backend")]
    NotFound { name: String, hint: BackendHint },
    /// The native call failed
    #[error(transparent)]
    Call(#[from] CallError),
    /// The host implementation raised a domain error (forwarded
    /// unchanged)
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Both possible implementations of one operation name.
#[derive(Default, Clone)]
struct OperationEntry {
    native: Option<NativeFunction>,
    host: Option<HostFn>,
}

/// Registry routing operation names to native or host implementations.
///
/// # Example
///
/// ```
/// use charon_bridge::dispatch::{BackendHint, OperationDispatcher};
/// use charon_bridge::ffi::LibraryCache;
/// use charon_bridge::{HostError, Value};
/// use std::sync::Arc;
///
/// let dispatcher = OperationDispatcher::new();
/// dispatcher.register_host("add", Arc::new(|args: &[Value]| {
///     match (&args[0], &args[1]) {
///         (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
///         _ => Err(HostError::Type("add expects ints".into())),
///     }
/// }));
///
/// let cache = LibraryCache::new();
/// let result = dispatcher
///     .dispatch(&cache, "add", &[Value::Int(2), Value::Int(3)], BackendHint::Auto)
///     .unwrap();
/// assert_eq!(result, Value::Int(5));
/// ```
#[derive(Default)]
pub struct OperationDispatcher {
    operations: Mutex<HashMap<String, OperationEntry>>,
}

impl OperationDispatcher {
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the native implementation of an operation.
    pub fn register_native(&self, name: impl Into<String>, function: NativeFunction) {
        self.lock().entry(name.into()).or_default().native = Some(function);
    }

    /// Register (or replace) the host implementation of an operation.
    pub fn register_host(&self, name: impl Into<String>, host_fn: HostFn) {
        self.lock().entry(name.into()).or_default().host = Some(host_fn);
    }

    /// Route one operation to a backend and execute it.
    ///
    /// The lookup clones the chosen implementation out of the registry so
    /// no lock is held while the backend runs.
    pub fn dispatch(
        &self,
        cache: &LibraryCache,
        name: &str,
        args: &[Value],
        hint: BackendHint,
    ) -> Result<Value, DispatchError> {
        let entry = self.lock().get(name).cloned().unwrap_or_default();

        match hint {
            BackendHint::Native => match entry.native {
                Some(function) => Ok(function.call(cache, args)?),
                None => Err(self.not_found(name, hint)),
            },
            BackendHint::Host => match entry.host {
                Some(host_fn) => Ok(host_fn(args)?),
                None => Err(self.not_found(name, hint)),
            },
            BackendHint::Auto => {
                if let Some(function) = entry.native {
                    Ok(function.call(cache, args)?)
                } else if let Some(host_fn) = entry.host {
                    Ok(host_fn(args)?)
                } else {
                    Err(self.not_found(name, hint))
                }
            }
        }
    }

    /// Pure lookup mirroring `dispatch`'s routing without executing
    /// anything.
    pub fn has(&self, name: &str, hint: BackendHint) -> bool {
        let operations = self.lock();
        let Some(entry) = operations.get(name) else {
            return false;
        };
        match hint {
            BackendHint::Native => entry.native.is_some(),
            BackendHint::Host => entry.host.is_some(),
            BackendHint::Auto => entry.native.is_some() || entry.host.is_some(),
        }
    }

    /// Registered operation names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn not_found(&self, name: &str, hint: BackendHint) -> DispatchError {
        log::debug!("dispatch miss: {} ({:?})", name, hint);
        DispatchError::NotFound {
            name: name.to_string(),
            hint,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OperationEntry>> {
        self.operations.lock().unwrap_or_else(|e| e.into_inner())
    }
}
