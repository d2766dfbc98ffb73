//! Callbacks - native-callable trampolines around host functions
//!
//! A `NativeCallable` wraps a `HostFn` in a libffi closure so compiled
//! code can invoke it through an ordinary C function pointer. On each
//! invocation the trampoline converts the native arguments to host
//! values in argument order, calls the host function, and converts its
//! result back to the declared native return representation.
//!
//! # Ownership contract
//!
//! The embedder that requests a trampoline must keep the returned
//! `NativeCallable` alive for the entire period native code might invoke
//! `code_ptr()`. The factory does not track or extend this lifetime;
//! dropping the callable while native code still holds the pointer is
//! undefined behavior. This is a caller obligation, not an internal
//! guard.
//!
//! Host errors and panics never unwind across the FFI boundary: the
//! trampoline produces the zero value of the declared return type
//! instead.

use crate::ffi::convert::{zero_of, ConvertContext};
use crate::ffi::types::{NativeValue, TypeDescriptor};
use crate::value::{HostFn, Value};
use libffi::low::ffi_cif;
use libffi::middle::{Cif, Closure};
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::sync::Mutex;
use thiserror::Error;

/// Callback construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallbackError {
    /// Signature not expressible as a native callback
    #[error("invalid callback signature: {0}")]
    InvalidSignature(String),
}

/// State shared with the trampoline for the callable's lifetime.
struct TrampolineState {
    host_fn: HostFn,
    arg_types: Vec<TypeDescriptor>,
    return_type: TypeDescriptor,
    /// C strings returned to native code; live as long as the callable
    retained: Mutex<Vec<CString>>,
}

/// A host function wrapped for invocation from native code.
///
/// See the module docs for the lifetime obligation on the caller.
pub struct NativeCallable {
    // Field order matters: the closure borrows `state` and must drop
    // first.
    closure: Closure<'static>,
    state: Box<TrampolineState>,
    code: *const c_void,
}

// The closure's code page and state are only touched through the
// trampoline, which locks its own interior state.
unsafe impl Send for NativeCallable {}
unsafe impl Sync for NativeCallable {}

impl NativeCallable {
    /// Build a trampoline around `host_fn` with the declared signature.
    ///
    /// `Void` is valid only as the return type.
    pub fn new(
        host_fn: HostFn,
        return_type: TypeDescriptor,
        arg_types: Vec<TypeDescriptor>,
    ) -> Result<Self, CallbackError> {
        if arg_types.contains(&TypeDescriptor::Void) {
            return Err(CallbackError::InvalidSignature(
                "void argument type".to_string(),
            ));
        }

        let cif = Cif::new(
            arg_types.iter().map(|t| t.libffi_type()),
            return_type.libffi_type(),
        );

        let state = Box::new(TrampolineState {
            host_fn,
            arg_types,
            return_type,
            retained: Mutex::new(Vec::new()),
        });
        // The box gives the state a stable address for the closure's
        // lifetime; the struct keeps both and drops the closure first.
        let state_ref: &'static TrampolineState =
            unsafe { &*(state.as_ref() as *const TrampolineState) };
        let closure = Closure::new(cif, trampoline, state_ref);
        let code: *const c_void = unsafe { *closure.instantiate_code_ptr::<*const c_void>() };

        Ok(Self {
            closure,
            state,
            code,
        })
    }

    /// C function pointer for native code.
    pub fn code_ptr(&self) -> *const c_void {
        self.code
    }

    /// Declared signature of this callable.
    pub fn signature(&self) -> (&[TypeDescriptor], TypeDescriptor) {
        (&self.state.arg_types, self.state.return_type)
    }

    /// View the trampoline as a typed function pointer.
    ///
    /// # Safety
    ///
    /// `T` must be an `extern "C"` function pointer type matching the
    /// declared argument and return types.
    pub unsafe fn typed<T: Copy>(&self) -> T {
        *self.closure.instantiate_code_ptr::<T>()
    }
}

impl std::fmt::Debug for NativeCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCallable")
            .field("code", &self.code)
            .field("return_type", &self.state.return_type)
            .field("arg_types", &self.state.arg_types)
            .finish()
    }
}

/// The single generic trampoline: libffi hands over raw argument slots,
/// which are decoded per the declared signature.
unsafe extern "C" fn trampoline(
    _cif: &ffi_cif,
    result: &mut u64,
    args: *const *const c_void,
    state: &TrampolineState,
) {
    let ctx = ConvertContext::new();
    let mut values = Vec::with_capacity(state.arg_types.len());
    for (i, ty) in state.arg_types.iter().enumerate() {
        let slot = *args.add(i);
        let native = read_arg(slot, *ty);
        match ctx.from_native(&native, *ty) {
            Ok(value) => values.push(value),
            Err(_) => {
                write_result(result, state.return_type, None, &state.retained);
                return;
            }
        }
    }

    // Never unwind into native code
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (state.host_fn)(&values)
    }));
    let produced = match outcome {
        Ok(Ok(value)) => Some(value),
        _ => None,
    };

    write_result(result, state.return_type, produced, &state.retained);
}

/// Decode one argument slot as its declared type.
unsafe fn read_arg(slot: *const c_void, ty: TypeDescriptor) -> NativeValue {
    match ty {
        TypeDescriptor::Bool => NativeValue::Bool(*(slot as *const u8)),
        TypeDescriptor::Int8 => NativeValue::I8(*(slot as *const i8)),
        TypeDescriptor::Int16 => NativeValue::I16(*(slot as *const i16)),
        TypeDescriptor::Int32 => NativeValue::I32(*(slot as *const i32)),
        TypeDescriptor::Int64 => NativeValue::I64(*(slot as *const i64)),
        TypeDescriptor::UInt8 => NativeValue::U8(*(slot as *const u8)),
        TypeDescriptor::UInt16 => NativeValue::U16(*(slot as *const u16)),
        TypeDescriptor::UInt32 => NativeValue::U32(*(slot as *const u32)),
        TypeDescriptor::UInt64 => NativeValue::U64(*(slot as *const u64)),
        TypeDescriptor::Float32 => NativeValue::F32(*(slot as *const f32)),
        TypeDescriptor::Float64 => NativeValue::F64(*(slot as *const f64)),
        TypeDescriptor::CString => NativeValue::CStr(*(slot as *const *const c_char)),
        TypeDescriptor::RawPointer => NativeValue::Ptr(*(slot as *const *mut c_void)),
        // Rejected at construction
        TypeDescriptor::Void => NativeValue::Void,
    }
}

/// Write the host result (or the zero value when `None`) into the libffi
/// result slot. Integral results are widened to the full slot as the
/// closure ABI expects.
unsafe fn write_result(
    result: &mut u64,
    ty: TypeDescriptor,
    value: Option<Value>,
    retained: &Mutex<Vec<CString>>,
) {
    let slot = result as *mut u64;

    // String results need their storage kept alive past this frame.
    if ty == TypeDescriptor::CString {
        let ptr = match value {
            Some(Value::Str(s)) => match CString::new(s.as_bytes()) {
                Ok(c_string) => {
                    let ptr = c_string.as_ptr();
                    retained
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(c_string);
                    ptr
                }
                Err(_) => std::ptr::null(),
            },
            _ => std::ptr::null(),
        };
        *(slot as *mut *const c_char) = ptr;
        return;
    }

    let mut ctx = ConvertContext::new();
    let native = match value {
        Some(value) => ctx.to_native(&value, ty).unwrap_or_else(|_| zero_of(ty)),
        None => zero_of(ty),
    };

    match native {
        NativeValue::Void => {}
        NativeValue::Bool(v) => *slot = u64::from(v),
        NativeValue::I8(v) => *slot = v as i64 as u64,
        NativeValue::I16(v) => *slot = v as i64 as u64,
        NativeValue::I32(v) => *slot = v as i64 as u64,
        NativeValue::I64(v) => *slot = v as u64,
        NativeValue::U8(v) => *slot = u64::from(v),
        NativeValue::U16(v) => *slot = u64::from(v),
        NativeValue::U32(v) => *slot = u64::from(v),
        NativeValue::U64(v) => *slot = v,
        NativeValue::F32(v) => *(slot as *mut f32) = v,
        NativeValue::F64(v) => *(slot as *mut f64) = v,
        NativeValue::Ptr(v) => *(slot as *mut *mut c_void) = v,
        // Handled above
        NativeValue::CStr(_) => {}
    }
}
