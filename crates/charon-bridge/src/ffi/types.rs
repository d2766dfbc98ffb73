//! FFI type system - the closed descriptor set and the native value
//! representation
//!
//! Two layers:
//! - `TypeDescriptor`: the declared type of one call slot (argument or
//!   return), a closed enumeration
//! - `NativeValue`: the runtime representation of one ABI value during
//!   marshalling
//!
//! Descriptor names accepted at the boundary form a closed vocabulary
//! (`parse_name`); names outside it degrade to `RawPointer` so manifests
//! produced by newer generators still register.

use libffi::middle::Type;
use serde::{Deserialize, Serialize};
use std::os::raw::{c_char, c_void};

/// Declared type of a single call slot.
///
/// Closed set; immutable once constructed. `Void` is only meaningful as a
/// return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Null-terminated `char*`
    CString,
    /// Untyped `void*`
    RawPointer,
}

impl TypeDescriptor {
    /// Parse a descriptor from the boundary vocabulary.
    ///
    /// `int`/`long`/`char`/`size_t` follow the C ABI on LP64 targets.
    /// Unrecognized names map to `RawPointer` rather than failing, so
    /// descriptors from future generator versions remain registrable.
    pub fn parse_name(name: &str) -> Self {
        match name {
            "void" => TypeDescriptor::Void,
            "bool" => TypeDescriptor::Bool,
            "char" | "int8" => TypeDescriptor::Int8,
            "int16" => TypeDescriptor::Int16,
            "int" | "int32" => TypeDescriptor::Int32,
            "long" | "int64" => TypeDescriptor::Int64,
            "uint8" => TypeDescriptor::UInt8,
            "uint16" => TypeDescriptor::UInt16,
            "uint32" => TypeDescriptor::UInt32,
            "uint64" | "size_t" => TypeDescriptor::UInt64,
            "float" => TypeDescriptor::Float32,
            "double" => TypeDescriptor::Float64,
            "char*" | "string" => TypeDescriptor::CString,
            "void*" | "ptr" => TypeDescriptor::RawPointer,
            _ => TypeDescriptor::RawPointer,
        }
    }

    /// Boundary-facing name for this descriptor.
    pub fn display_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Void => "void",
            TypeDescriptor::Bool => "bool",
            TypeDescriptor::Int8 => "int8",
            TypeDescriptor::Int16 => "int16",
            TypeDescriptor::Int32 => "int32",
            TypeDescriptor::Int64 => "int64",
            TypeDescriptor::UInt8 => "uint8",
            TypeDescriptor::UInt16 => "uint16",
            TypeDescriptor::UInt32 => "uint32",
            TypeDescriptor::UInt64 => "uint64",
            TypeDescriptor::Float32 => "float",
            TypeDescriptor::Float64 => "double",
            TypeDescriptor::CString => "string",
            TypeDescriptor::RawPointer => "ptr",
        }
    }

    /// Size in bytes of this type's ABI representation.
    pub fn size(&self) -> usize {
        match self {
            TypeDescriptor::Void => 0,
            TypeDescriptor::Bool | TypeDescriptor::Int8 | TypeDescriptor::UInt8 => 1,
            TypeDescriptor::Int16 | TypeDescriptor::UInt16 => 2,
            TypeDescriptor::Int32 | TypeDescriptor::UInt32 | TypeDescriptor::Float32 => 4,
            TypeDescriptor::Int64 | TypeDescriptor::UInt64 | TypeDescriptor::Float64 => 8,
            TypeDescriptor::CString | TypeDescriptor::RawPointer => {
                std::mem::size_of::<*const c_void>()
            }
        }
    }

    /// ABI alignment in bytes. Zero-sized `Void` aligns to 1.
    pub fn alignment(&self) -> usize {
        self.size().max(1)
    }

    /// The libffi type used to build call interfaces for this slot.
    pub(crate) fn libffi_type(&self) -> Type {
        match self {
            TypeDescriptor::Void => Type::void(),
            TypeDescriptor::Bool => Type::u8(),
            TypeDescriptor::Int8 => Type::i8(),
            TypeDescriptor::Int16 => Type::i16(),
            TypeDescriptor::Int32 => Type::i32(),
            TypeDescriptor::Int64 => Type::i64(),
            TypeDescriptor::UInt8 => Type::u8(),
            TypeDescriptor::UInt16 => Type::u16(),
            TypeDescriptor::UInt32 => Type::u32(),
            TypeDescriptor::UInt64 => Type::u64(),
            TypeDescriptor::Float32 => Type::f32(),
            TypeDescriptor::Float64 => Type::f64(),
            TypeDescriptor::CString | TypeDescriptor::RawPointer => Type::pointer(),
        }
    }

    /// True for the sized integer descriptors (signed or unsigned).
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Int8
                | TypeDescriptor::Int16
                | TypeDescriptor::Int32
                | TypeDescriptor::Int64
                | TypeDescriptor::UInt8
                | TypeDescriptor::UInt16
                | TypeDescriptor::UInt32
                | TypeDescriptor::UInt64
        )
    }

    /// True for `CString` and `RawPointer`.
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeDescriptor::CString | TypeDescriptor::RawPointer)
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Runtime representation of one ABI value during marshalling.
///
/// `CStr` pointers borrow storage owned by the `ConvertContext` that
/// produced them; they are valid for the duration of that context.
#[derive(Debug, Clone, Copy)]
pub enum NativeValue {
    Void,
    /// C bool, 0 or 1
    Bool(u8),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Null-terminated string pointer
    CStr(*const c_char),
    /// Untyped pointer
    Ptr(*mut c_void),
}

// Manual PartialEq because raw pointer payloads compare by address.
impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Void, NativeValue::Void) => true,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::I8(a), NativeValue::I8(b)) => a == b,
            (NativeValue::I16(a), NativeValue::I16(b)) => a == b,
            (NativeValue::I32(a), NativeValue::I32(b)) => a == b,
            (NativeValue::I64(a), NativeValue::I64(b)) => a == b,
            (NativeValue::U8(a), NativeValue::U8(b)) => a == b,
            (NativeValue::U16(a), NativeValue::U16(b)) => a == b,
            (NativeValue::U32(a), NativeValue::U32(b)) => a == b,
            (NativeValue::U64(a), NativeValue::U64(b)) => a == b,
            (NativeValue::F32(a), NativeValue::F32(b)) => a == b,
            (NativeValue::F64(a), NativeValue::F64(b)) => a == b,
            (NativeValue::CStr(a), NativeValue::CStr(b)) => a == b,
            (NativeValue::Ptr(a), NativeValue::Ptr(b)) => a == b,
            _ => false,
        }
    }
}

impl NativeValue {
    /// Descriptor this value naturally belongs to.
    pub fn descriptor(&self) -> TypeDescriptor {
        match self {
            NativeValue::Void => TypeDescriptor::Void,
            NativeValue::Bool(_) => TypeDescriptor::Bool,
            NativeValue::I8(_) => TypeDescriptor::Int8,
            NativeValue::I16(_) => TypeDescriptor::Int16,
            NativeValue::I32(_) => TypeDescriptor::Int32,
            NativeValue::I64(_) => TypeDescriptor::Int64,
            NativeValue::U8(_) => TypeDescriptor::UInt8,
            NativeValue::U16(_) => TypeDescriptor::UInt16,
            NativeValue::U32(_) => TypeDescriptor::UInt32,
            NativeValue::U64(_) => TypeDescriptor::UInt64,
            NativeValue::F32(_) => TypeDescriptor::Float32,
            NativeValue::F64(_) => TypeDescriptor::Float64,
            NativeValue::CStr(_) => TypeDescriptor::CString,
            NativeValue::Ptr(_) => TypeDescriptor::RawPointer,
        }
    }
}
