//! Value conversion across the bridge boundary
//!
//! Bidirectional conversion between host `Value`s and native ABI
//! representations:
//! - `ConvertContext::to_native()`: host value -> `NativeValue` under a
//!   declared descriptor
//! - `ConvertContext::from_native()`: inverse
//!
//! # Memory safety
//!
//! Every C string allocated on the outbound path is tracked by the
//! context and stays alive until the context drops, so argument pointers
//! remain valid for the duration of the call they were marshalled for.
//!
//! Inbound C strings are decoded as UTF-8 with invalid sequences
//! replaced; malformed bytes never fail the conversion.

use crate::ffi::types::{NativeValue, TypeDescriptor};
use crate::value::Value;
use std::ffi::{CStr, CString};
use thiserror::Error;

/// Conversion errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// Value's runtime shape is incompatible with the declared type
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    /// Numeric value does not fit the declared type
    #[error("value {value} out of range for {target}")]
    OutOfRange {
        value: String,
        target: &'static str,
    },
    /// String not representable as a C string (interior NUL)
    #[error("invalid string: {0}")]
    InvalidString(String),
}

/// Conversion context for one logical call.
///
/// Owns the C strings it allocates; pointers handed out in `NativeValue`s
/// are valid until the context is dropped.
///
/// # Example
///
/// ```
/// use charon_bridge::ffi::{ConvertContext, TypeDescriptor};
/// use charon_bridge::Value;
///
/// let mut ctx = ConvertContext::new();
/// let native = ctx.to_native(&Value::Int(42), TypeDescriptor::Int32).unwrap();
/// let back = ctx.from_native(&native, TypeDescriptor::Int32).unwrap();
/// assert_eq!(back, Value::Int(42));
/// ```
#[derive(Default)]
pub struct ConvertContext {
    /// Keeps outbound C strings alive for the duration of the call
    allocated_strings: Vec<CString>,
}

impl ConvertContext {
    pub fn new() -> Self {
        Self {
            allocated_strings: Vec::new(),
        }
    }

    /// Number of C strings currently kept alive by this context.
    pub fn retained_strings(&self) -> usize {
        self.allocated_strings.len()
    }

    /// Convert a host value to the native representation declared by `ty`.
    ///
    /// Null maps to the zero/null representation of any declared type.
    /// Integer descriptors accept Int/UInt (range-checked), Bool (as 0/1),
    /// and Float with a zero fractional part in range.
    pub fn to_native(
        &mut self,
        value: &Value,
        ty: TypeDescriptor,
    ) -> Result<NativeValue, ConvertError> {
        match value {
            Value::Null => Ok(zero_of(ty)),

            Value::Bool(b) => {
                let bit = u64::from(*b);
                match ty {
                    TypeDescriptor::Bool => Ok(NativeValue::Bool(bit as u8)),
                    _ if ty.is_integer() => narrow_unsigned(bit, ty),
                    _ => Err(mismatch(ty, value)),
                }
            }

            Value::Int(i) => match ty {
                TypeDescriptor::Float32 => Ok(NativeValue::F32(*i as f32)),
                TypeDescriptor::Float64 => Ok(NativeValue::F64(*i as f64)),
                _ if ty.is_integer() => narrow_signed(*i, ty),
                _ => Err(mismatch(ty, value)),
            },

            Value::UInt(u) => match ty {
                TypeDescriptor::Float32 => Ok(NativeValue::F32(*u as f32)),
                TypeDescriptor::Float64 => Ok(NativeValue::F64(*u as f64)),
                _ if ty.is_integer() => narrow_unsigned(*u, ty),
                _ => Err(mismatch(ty, value)),
            },

            Value::Float(x) => match ty {
                TypeDescriptor::Float32 => Ok(NativeValue::F32(*x as f32)),
                TypeDescriptor::Float64 => Ok(NativeValue::F64(*x)),
                _ if ty.is_integer() => narrow_float(*x, ty),
                _ => Err(mismatch(ty, value)),
            },

            Value::Str(s) => match ty {
                TypeDescriptor::CString => {
                    // UTF-8 bytes, null-terminated; pointer stays valid
                    // while this context lives
                    let c_string = CString::new(s.as_bytes()).map_err(|e| {
                        ConvertError::InvalidString(format!("interior NUL byte: {}", e))
                    })?;
                    let ptr = c_string.as_ptr();
                    self.allocated_strings.push(c_string);
                    Ok(NativeValue::CStr(ptr))
                }
                _ => Err(mismatch(ty, value)),
            },

            Value::Ptr(p) => match ty {
                TypeDescriptor::RawPointer => Ok(NativeValue::Ptr(*p as *mut std::os::raw::c_void)),
                _ => Err(mismatch(ty, value)),
            },
        }
    }

    /// Convert a native value back to a host value under `ty`.
    ///
    /// A null pointer maps to `Value::Null` only for the pointer
    /// descriptors. Unsigned values canonicalize into `Value::Int` when
    /// they fit; `Value::UInt` is reserved for magnitudes above
    /// `i64::MAX`.
    ///
    /// # Safety note
    ///
    /// For `CStr` payloads the pointer must reference a valid
    /// null-terminated string; bytes are copied out immediately.
    pub fn from_native(
        &self,
        native: &NativeValue,
        ty: TypeDescriptor,
    ) -> Result<Value, ConvertError> {
        match native {
            NativeValue::Void => Ok(Value::Null),
            NativeValue::Bool(b) => Ok(Value::Bool(*b != 0)),
            NativeValue::I8(v) => Ok(Value::Int(i64::from(*v))),
            NativeValue::I16(v) => Ok(Value::Int(i64::from(*v))),
            NativeValue::I32(v) => Ok(Value::Int(i64::from(*v))),
            NativeValue::I64(v) => Ok(Value::Int(*v)),
            NativeValue::U8(v) => Ok(Value::Int(i64::from(*v))),
            NativeValue::U16(v) => Ok(Value::Int(i64::from(*v))),
            NativeValue::U32(v) => Ok(Value::Int(i64::from(*v))),
            NativeValue::U64(v) => Ok(match i64::try_from(*v) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::UInt(*v),
            }),
            NativeValue::F32(v) => Ok(Value::Float(f64::from(*v))),
            NativeValue::F64(v) => Ok(Value::Float(*v)),

            NativeValue::CStr(p) => {
                if p.is_null() {
                    if ty.is_pointer() {
                        return Ok(Value::Null);
                    }
                    return Err(ConvertError::TypeMismatch {
                        expected: ty.display_name(),
                        got: "null pointer",
                    });
                }
                // Replace-invalid-sequences policy: malformed bytes decode
                // to U+FFFD, never an error
                let s = unsafe { CStr::from_ptr(*p) }.to_string_lossy().into_owned();
                Ok(Value::string(s))
            }

            NativeValue::Ptr(p) => {
                if p.is_null() && ty.is_pointer() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Ptr(*p as usize))
                }
            }
        }
    }

    /// Infer a descriptor for a value with no declared type.
    ///
    /// Bool is matched before the integer cases: a boolean is never
    /// silently widened into an integer slot. This ordering is part of
    /// the contract.
    pub fn infer(value: &Value) -> TypeDescriptor {
        match value {
            Value::Bool(_) => TypeDescriptor::Bool,
            Value::Int(_) => TypeDescriptor::Int64,
            Value::UInt(_) => TypeDescriptor::UInt64,
            Value::Float(_) => TypeDescriptor::Float64,
            Value::Str(_) => TypeDescriptor::CString,
            Value::Null | Value::Ptr(_) => TypeDescriptor::RawPointer,
        }
    }
}

/// Zero/null representation of a declared type; the uniform mapping for
/// absent values.
pub(crate) fn zero_of(ty: TypeDescriptor) -> NativeValue {
    match ty {
        TypeDescriptor::Void => NativeValue::Void,
        TypeDescriptor::Bool => NativeValue::Bool(0),
        TypeDescriptor::Int8 => NativeValue::I8(0),
        TypeDescriptor::Int16 => NativeValue::I16(0),
        TypeDescriptor::Int32 => NativeValue::I32(0),
        TypeDescriptor::Int64 => NativeValue::I64(0),
        TypeDescriptor::UInt8 => NativeValue::U8(0),
        TypeDescriptor::UInt16 => NativeValue::U16(0),
        TypeDescriptor::UInt32 => NativeValue::U32(0),
        TypeDescriptor::UInt64 => NativeValue::U64(0),
        TypeDescriptor::Float32 => NativeValue::F32(0.0),
        TypeDescriptor::Float64 => NativeValue::F64(0.0),
        TypeDescriptor::CString => NativeValue::CStr(std::ptr::null()),
        TypeDescriptor::RawPointer => NativeValue::Ptr(std::ptr::null_mut()),
    }
}

fn mismatch(expected: TypeDescriptor, got: &Value) -> ConvertError {
    ConvertError::TypeMismatch {
        expected: expected.display_name(),
        got: got.type_name(),
    }
}

fn out_of_range(value: impl std::fmt::Display, target: TypeDescriptor) -> ConvertError {
    ConvertError::OutOfRange {
        value: value.to_string(),
        target: target.display_name(),
    }
}

fn narrow_signed(i: i64, ty: TypeDescriptor) -> Result<NativeValue, ConvertError> {
    match ty {
        TypeDescriptor::Int8 => i8::try_from(i).map(NativeValue::I8),
        TypeDescriptor::Int16 => i16::try_from(i).map(NativeValue::I16),
        TypeDescriptor::Int32 => i32::try_from(i).map(NativeValue::I32),
        TypeDescriptor::Int64 => Ok(NativeValue::I64(i)),
        TypeDescriptor::UInt8 => u8::try_from(i).map(NativeValue::U8),
        TypeDescriptor::UInt16 => u16::try_from(i).map(NativeValue::U16),
        TypeDescriptor::UInt32 => u32::try_from(i).map(NativeValue::U32),
        TypeDescriptor::UInt64 => u64::try_from(i).map(NativeValue::U64),
        _ => return Err(out_of_range(i, ty)),
    }
    .map_err(|_| out_of_range(i, ty))
}

fn narrow_unsigned(u: u64, ty: TypeDescriptor) -> Result<NativeValue, ConvertError> {
    match ty {
        TypeDescriptor::Int8 => i8::try_from(u).map(NativeValue::I8),
        TypeDescriptor::Int16 => i16::try_from(u).map(NativeValue::I16),
        TypeDescriptor::Int32 => i32::try_from(u).map(NativeValue::I32),
        TypeDescriptor::Int64 => i64::try_from(u).map(NativeValue::I64),
        TypeDescriptor::UInt8 => u8::try_from(u).map(NativeValue::U8),
        TypeDescriptor::UInt16 => u16::try_from(u).map(NativeValue::U16),
        TypeDescriptor::UInt32 => u32::try_from(u).map(NativeValue::U32),
        TypeDescriptor::UInt64 => Ok(NativeValue::U64(u)),
        _ => return Err(out_of_range(u, ty)),
    }
    .map_err(|_| out_of_range(u, ty))
}

fn narrow_float(x: f64, ty: TypeDescriptor) -> Result<NativeValue, ConvertError> {
    if x.fract() != 0.0 || !x.is_finite() {
        return Err(out_of_range(x, ty));
    }
    // Bounds are exclusive at the top so the casts below never saturate:
    // every integral f64 below 2^64 is exactly representable in u64, and
    // -2^63 is exactly i64::MIN.
    if x >= 0.0 {
        if x < 18_446_744_073_709_551_616.0 {
            return narrow_unsigned(x as u64, ty);
        }
    } else if x >= i64::MIN as f64 {
        return narrow_signed(x as i64, ty);
    }
    Err(out_of_range(x, ty))
}
