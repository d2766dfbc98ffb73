//! Host value representation
//!
//! Shared value representation for everything crossing the bridge.
//! - Null, Bool, Int, UInt, Float: immediate values
//! - Str: heap-allocated, reference-counted (Arc<String>), immutable
//! - Ptr: an opaque native address carried by value
//!
//! Sized integers from the native side widen into `Int`/`UInt`; which of
//! the two a native value lands in is decided by its descriptor's
//! signedness, so every representable native integer survives a round
//! trip unchanged.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Host-side operation callable. Receives the dispatched arguments and
/// returns a value or a domain error that propagates unchanged through
/// the dispatcher.
pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;

/// A value crossing the bridge boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value; marshals to the zero/null representation of any
    /// declared native type.
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer (i64 at rest, narrowed per descriptor when crossing)
    Int(i64),
    /// Unsigned integer; only produced for native values outside i64 range
    /// or under explicitly unsigned descriptors
    UInt(u64),
    /// Floating point (f64 at rest)
    Float(f64),
    /// String value (reference-counted, immutable)
    Str(Arc<String>),
    /// Opaque native address
    Ptr(usize),
}

impl Value {
    /// Convenience constructor for string values.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Arc::new(s.into()))
    }

    /// Name of this value's runtime shape, as reported in errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Ptr(_) => "ptr",
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Ptr(p) => write!(f, "0x{:x}", p),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// Domain errors raised by host-side operation implementations.
///
/// These are the embedder's errors: the dispatcher forwards them to its
/// caller without translation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// Division by zero
    #[error("division by zero")]
    DivideByZero,
    /// Operand shape rejected by the host implementation
    #[error("type error: {0}")]
    Type(String),
    /// Any other embedder-defined failure
    #[error("{0}")]
    Message(String),
}
