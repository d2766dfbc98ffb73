//! Operation manifests
//!
//! External wrapper generators describe native operations as JSON
//! records:
//!
//! ```json
//! {
//!   "opName": "vec_add",
//!   "libraryPath": "libvecmath.so",
//!   "symbolName": "vec_add",
//!   "returnType": "double",
//!   "argTypes": ["double", "double"]
//! }
//! ```
//!
//! A manifest is either a bare array of records or an object with an
//! `"operations"` key; both shapes are produced by generator tooling.
//! Type names come from the closed boundary vocabulary; unrecognized
//! names degrade to the generic pointer descriptor so manifests from
//! newer generators still register.

use crate::ffi::caller::CallDescriptor;
use crate::ffi::types::TypeDescriptor;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Manifest ingestion errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Not valid manifest JSON
    #[error("invalid manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// Manifest file unreadable
    #[error("failed to read manifest '{path}': {message}")]
    Io { path: String, message: String },
}

/// One generator-produced operation record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationRecord {
    pub op_name: String,
    pub library_path: String,
    pub symbol_name: String,
    pub return_type: String,
    #[serde(default)]
    pub arg_types: Vec<String>,
}

impl OperationRecord {
    /// Resolve the record's type names into a call descriptor.
    pub fn descriptor(&self) -> CallDescriptor {
        CallDescriptor::new(
            self.library_path.clone(),
            self.symbol_name.clone(),
            TypeDescriptor::parse_name(&self.return_type),
            self.arg_types
                .iter()
                .map(|name| TypeDescriptor::parse_name(name))
                .collect(),
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Records(Vec<OperationRecord>),
    Keyed { operations: Vec<OperationRecord> },
}

/// A parsed operation manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub operations: Vec<OperationRecord>,
}

impl Manifest {
    /// Parse manifest JSON (bare array or `{"operations": [...]}`).
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let document: ManifestDocument = serde_json::from_str(json)?;
        let operations = match document {
            ManifestDocument::Records(operations) => operations,
            ManifestDocument::Keyed { operations } => operations,
        };
        Ok(Self { operations })
    }

    /// Read and parse a manifest file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&json)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
