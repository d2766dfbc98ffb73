//! Native function calling
//!
//! A `NativeFunction` binds a `CallDescriptor` to a callable target and
//! drives one marshalled call: arity validation, in-order argument
//! conversion, symbol resolution, a single libffi invocation, and return
//! conversion. Conversion failures abort before any native code runs.
//!
//! Calls are synchronous and blocking with no timeout or cancellation;
//! a hanging native function blocks its caller indefinitely. That risk is
//! the caller's to manage. Nothing here retries.

use crate::ffi::convert::{ConvertContext, ConvertError};
use crate::ffi::loader::{LibraryCache, LoadError, SymbolError};
use crate::ffi::types::{NativeValue, TypeDescriptor};
use crate::value::Value;
use libffi::middle::{Arg, Cif, CodePtr};
use std::os::raw::{c_char, c_void};
use thiserror::Error;

/// Declaration of one native call: where the code lives and how to
/// marshal across it. Immutable once constructed; produced by external
/// wrapper generators and consumed read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    /// Library path or bare name, resolved through the cache
    pub library: String,
    /// Exported symbol name
    pub symbol: String,
    /// Declared return type
    pub return_type: TypeDescriptor,
    /// Declared argument types, in call order
    pub arg_types: Vec<TypeDescriptor>,
}

impl CallDescriptor {
    pub fn new(
        library: impl Into<String>,
        symbol: impl Into<String>,
        return_type: TypeDescriptor,
        arg_types: Vec<TypeDescriptor>,
    ) -> Self {
        Self {
            library: library.into(),
            symbol: symbol.into(),
            return_type,
            arg_types,
        }
    }

    /// Declared argument count.
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }
}

/// Call execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// Argument count differs from the descriptor
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    /// Descriptor not executable (e.g. void argument type)
    #[error("invalid call descriptor: {0}")]
    InvalidDescriptor(String),
    /// Argument or return conversion failed
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// Library load failed
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Symbol resolution failed
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

#[derive(Clone)]
enum Target {
    /// Resolve `library`/`symbol` through the cache at call time
    Symbol,
    /// Pre-resolved code pointer supplied by the embedder
    Raw(*const c_void),
}

/// A callable native function.
///
/// The default target resolves through a `LibraryCache` (loading the
/// library on first use); embedders and tests may bind a raw code pointer
/// directly via [`NativeFunction::from_raw`].
#[derive(Clone)]
pub struct NativeFunction {
    descriptor: CallDescriptor,
    target: Target,
}

// Only a code pointer into immutable loaded text is held.
unsafe impl Send for NativeFunction {}
unsafe impl Sync for NativeFunction {}

impl NativeFunction {
    /// Bind a descriptor for cache-resolved calling.
    pub fn new(descriptor: CallDescriptor) -> Self {
        Self {
            descriptor,
            target: Target::Symbol,
        }
    }

    /// Bind a descriptor to an explicit code pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure `code` points to a function whose actual
    /// ABI signature matches the descriptor, and that it remains valid
    /// for the lifetime of this value.
    pub unsafe fn from_raw(code: *const (), descriptor: CallDescriptor) -> Self {
        Self {
            descriptor,
            target: Target::Raw(code as *const c_void),
        }
    }

    pub fn descriptor(&self) -> &CallDescriptor {
        &self.descriptor
    }

    /// Execute one marshalled call.
    ///
    /// Ordering is fixed: arity check, then argument conversion in
    /// declared order (a failure on any argument means the native
    /// function is never entered), then resolution, then exactly one
    /// invocation, then return conversion.
    pub fn call(&self, cache: &LibraryCache, args: &[Value]) -> Result<Value, CallError> {
        let descriptor = &self.descriptor;

        if args.len() != descriptor.arity() {
            return Err(CallError::Arity {
                expected: descriptor.arity(),
                got: args.len(),
            });
        }

        if descriptor.arg_types.contains(&TypeDescriptor::Void) {
            return Err(CallError::InvalidDescriptor(format!(
                "'{}' declares a void argument",
                descriptor.symbol
            )));
        }

        // Convert every argument before touching native code; the
        // conversion context keeps C-string storage alive until the call
        // returns.
        let mut ctx = ConvertContext::new();
        let mut natives = Vec::with_capacity(args.len());
        for (value, ty) in args.iter().zip(descriptor.arg_types.iter()) {
            natives.push(ctx.to_native(value, *ty)?);
        }

        let code = match self.target {
            Target::Raw(code) => code,
            Target::Symbol => cache
                .resolve(&descriptor.library, &descriptor.symbol)?
                .code_ptr(),
        };

        let native_ret = invoke(code, descriptor, &natives);
        Ok(ctx.from_native(&native_ret, descriptor.return_type)?)
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Perform the single native invocation through a libffi CIF built from
/// the descriptor. Total over the closed descriptor set: every return
/// type has an arm.
fn invoke(code: *const c_void, descriptor: &CallDescriptor, natives: &[NativeValue]) -> NativeValue {
    let cif = Cif::new(
        descriptor.arg_types.iter().map(|t| t.libffi_type()),
        descriptor.return_type.libffi_type(),
    );
    let code = CodePtr(code as *mut c_void);
    let args: Vec<Arg> = natives.iter().map(native_arg).collect();

    unsafe {
        match descriptor.return_type {
            TypeDescriptor::Void => {
                cif.call::<()>(code, &args);
                NativeValue::Void
            }
            TypeDescriptor::Bool => NativeValue::Bool(cif.call::<u8>(code, &args)),
            TypeDescriptor::Int8 => NativeValue::I8(cif.call::<i8>(code, &args)),
            TypeDescriptor::Int16 => NativeValue::I16(cif.call::<i16>(code, &args)),
            TypeDescriptor::Int32 => NativeValue::I32(cif.call::<i32>(code, &args)),
            TypeDescriptor::Int64 => NativeValue::I64(cif.call::<i64>(code, &args)),
            TypeDescriptor::UInt8 => NativeValue::U8(cif.call::<u8>(code, &args)),
            TypeDescriptor::UInt16 => NativeValue::U16(cif.call::<u16>(code, &args)),
            TypeDescriptor::UInt32 => NativeValue::U32(cif.call::<u32>(code, &args)),
            TypeDescriptor::UInt64 => NativeValue::U64(cif.call::<u64>(code, &args)),
            TypeDescriptor::Float32 => NativeValue::F32(cif.call::<f32>(code, &args)),
            TypeDescriptor::Float64 => NativeValue::F64(cif.call::<f64>(code, &args)),
            TypeDescriptor::CString => {
                NativeValue::CStr(cif.call::<*const c_char>(code, &args))
            }
            TypeDescriptor::RawPointer => NativeValue::Ptr(cif.call::<*mut c_void>(code, &args)),
        }
    }
}

/// Borrow one marshalled value as a libffi argument. The `NativeValue`
/// storage must outlive the call, which `NativeFunction::call` guarantees
/// by keeping the vector alive across the invocation.
fn native_arg(native: &NativeValue) -> Arg {
    match native {
        NativeValue::Bool(v) => Arg::new(v),
        NativeValue::I8(v) => Arg::new(v),
        NativeValue::I16(v) => Arg::new(v),
        NativeValue::I32(v) => Arg::new(v),
        NativeValue::I64(v) => Arg::new(v),
        NativeValue::U8(v) => Arg::new(v),
        NativeValue::U16(v) => Arg::new(v),
        NativeValue::U32(v) => Arg::new(v),
        NativeValue::U64(v) => Arg::new(v),
        NativeValue::F32(v) => Arg::new(v),
        NativeValue::F64(v) => Arg::new(v),
        NativeValue::CStr(v) => Arg::new(v),
        NativeValue::Ptr(v) => Arg::new(v),
        // Void arguments are rejected before marshalling
        NativeValue::Void => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::os::raw::c_int;
    use std::sync::atomic::{AtomicUsize, Ordering};

    extern "C" fn stub_add(a: c_int, b: c_int) -> c_int {
        a + b
    }

    extern "C" fn stub_scale(x: f64) -> f64 {
        x * 2.0
    }

    extern "C" fn stub_answer() -> i64 {
        42
    }

    extern "C" fn stub_strlen(s: *const c_char) -> i64 {
        if s.is_null() {
            return -1;
        }
        unsafe { CStr::from_ptr(s) }.to_bytes().len() as i64
    }

    static INVOCATIONS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn stub_counting(a: c_int, b: c_int) -> c_int {
        INVOCATIONS.fetch_add(1, Ordering::SeqCst);
        a + b
    }

    fn raw(f: *const (), descriptor: CallDescriptor) -> NativeFunction {
        unsafe { NativeFunction::from_raw(f, descriptor) }
    }

    #[test]
    fn call_binary_int() {
        let func = raw(
            stub_add as *const (),
            CallDescriptor::new(
                "",
                "stub_add",
                TypeDescriptor::Int32,
                vec![TypeDescriptor::Int32, TypeDescriptor::Int32],
            ),
        );
        let cache = LibraryCache::new();
        let result = func
            .call(&cache, &[Value::Int(10), Value::Int(20)])
            .unwrap();
        assert_eq!(result, Value::Int(30));
    }

    #[test]
    fn call_unary_double() {
        let func = raw(
            stub_scale as *const (),
            CallDescriptor::new(
                "",
                "stub_scale",
                TypeDescriptor::Float64,
                vec![TypeDescriptor::Float64],
            ),
        );
        let cache = LibraryCache::new();
        let result = func.call(&cache, &[Value::Float(21.0)]).unwrap();
        assert_eq!(result, Value::Float(42.0));
    }

    #[test]
    fn call_nullary() {
        let func = raw(
            stub_answer as *const (),
            CallDescriptor::new("", "stub_answer", TypeDescriptor::Int64, vec![]),
        );
        let cache = LibraryCache::new();
        assert_eq!(func.call(&cache, &[]).unwrap(), Value::Int(42));
    }

    #[test]
    fn call_with_string_argument() {
        let func = raw(
            stub_strlen as *const (),
            CallDescriptor::new(
                "",
                "stub_strlen",
                TypeDescriptor::Int64,
                vec![TypeDescriptor::CString],
            ),
        );
        let cache = LibraryCache::new();
        let result = func.call(&cache, &[Value::string("hello")]).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn null_crosses_as_null_pointer() {
        let func = raw(
            stub_strlen as *const (),
            CallDescriptor::new(
                "",
                "stub_strlen",
                TypeDescriptor::Int64,
                vec![TypeDescriptor::CString],
            ),
        );
        let cache = LibraryCache::new();
        assert_eq!(func.call(&cache, &[Value::Null]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn arity_mismatch_fails_before_conversion() {
        let func = raw(
            stub_add as *const (),
            CallDescriptor::new(
                "",
                "stub_add",
                TypeDescriptor::Int32,
                vec![TypeDescriptor::Int32, TypeDescriptor::Int32],
            ),
        );
        let cache = LibraryCache::new();
        let result = func.call(&cache, &[Value::Int(10)]);
        assert_eq!(
            result,
            Err(CallError::Arity {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn conversion_failure_skips_invocation() {
        let func = raw(
            stub_counting as *const (),
            CallDescriptor::new(
                "",
                "stub_counting",
                TypeDescriptor::Int32,
                vec![TypeDescriptor::Int32, TypeDescriptor::Int32],
            ),
        );
        let cache = LibraryCache::new();

        let before = INVOCATIONS.load(Ordering::SeqCst);
        let result = func.call(&cache, &[Value::Int(1), Value::string("oops")]);
        assert!(matches!(result, Err(CallError::Convert(_))));
        assert_eq!(INVOCATIONS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn void_argument_type_is_invalid() {
        let func = raw(
            stub_add as *const (),
            CallDescriptor::new(
                "",
                "stub_add",
                TypeDescriptor::Int32,
                vec![TypeDescriptor::Void],
            ),
        );
        let cache = LibraryCache::new();
        let result = func.call(&cache, &[Value::Null]);
        assert!(matches!(result, Err(CallError::InvalidDescriptor(_))));
    }

    #[test]
    fn unresolvable_library_surfaces_symbol_error() {
        let func = NativeFunction::new(CallDescriptor::new(
            "nonexistent_library_xyz",
            "no_such_fn",
            TypeDescriptor::Int32,
            vec![],
        ));
        let cache = LibraryCache::new();
        let result = func.call(&cache, &[]);
        assert!(matches!(result, Err(CallError::Symbol(_))));
    }
}
