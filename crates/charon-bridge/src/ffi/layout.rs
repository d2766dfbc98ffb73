//! Record layout computation
//!
//! Native struct layouts are computed once, at registration time:
//! `StructLayoutBuilder` accumulates named fields and `build` produces an
//! immutable `StructLayout` with C-rule offsets, padded size, and
//! alignment. There is no runtime field mutation; consumers index the
//! fields by offset.

use crate::ffi::types::TypeDescriptor;
use thiserror::Error;

/// Layout construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// Field name used twice within one record
    #[error("duplicate field '{0}'")]
    DuplicateField(String),
    /// `void` is not a storable field type
    #[error("field '{0}' has void type")]
    VoidField(String),
}

/// One field of a computed layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Byte offset from the start of the record
    pub offset: usize,
}

/// Immutable record layout: fields with offsets, total size padded to the
/// record alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    name: String,
    fields: Vec<FieldLayout>,
    size: usize,
    alignment: usize,
}

impl StructLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Total size in bytes, padded to the record alignment. An empty
    /// record has size zero.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Byte offset of a field, if present.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.offset)
    }
}

/// Builder accumulating fields for one record layout.
///
/// # Example
///
/// ```
/// use charon_bridge::ffi::{StructLayoutBuilder, TypeDescriptor};
///
/// let layout = StructLayoutBuilder::new("Point")
///     .field("x", TypeDescriptor::Int32)
///     .field("y", TypeDescriptor::Int32)
///     .build()
///     .unwrap();
/// assert_eq!(layout.offset_of("y"), Some(4));
/// assert_eq!(layout.size(), 8);
/// ```
pub struct StructLayoutBuilder {
    name: String,
    fields: Vec<(String, TypeDescriptor)>,
}

impl StructLayoutBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field; declaration order is layout order.
    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    /// Compute offsets and produce the immutable layout.
    pub fn build(self) -> Result<StructLayout, LayoutError> {
        let mut fields: Vec<FieldLayout> = Vec::with_capacity(self.fields.len());
        let mut offset = 0usize;
        let mut alignment = 1usize;

        for (name, ty) in self.fields {
            if ty == TypeDescriptor::Void {
                return Err(LayoutError::VoidField(name));
            }
            if fields.iter().any(|existing| existing.name == name) {
                return Err(LayoutError::DuplicateField(name));
            }

            let align = ty.alignment();
            offset = round_up(offset, align);
            alignment = alignment.max(align);

            fields.push(FieldLayout {
                name,
                ty,
                offset,
            });
            offset += ty.size();
        }

        let size = if fields.is_empty() {
            0
        } else {
            round_up(offset, alignment)
        };

        Ok(StructLayout {
            name: self.name,
            fields,
            size,
            alignment,
        })
    }
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}
