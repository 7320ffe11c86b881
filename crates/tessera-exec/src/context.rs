//! Per-client table of named intermediate results.

use std::collections::HashMap;
use tessera_common::{Result, Scalar, TesseraError};

/// A named intermediate result.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleValue {
    /// Row positions, as produced by selects and joins.
    Positions(Vec<u32>),
    /// Column values, as produced by fetches and element-wise aggregates.
    Values(Vec<i32>),
    /// A single aggregate result.
    Scalar(Scalar),
}

impl HandleValue {
    fn kind(&self) -> &'static str {
        match self {
            HandleValue::Positions(_) => "position list",
            HandleValue::Values(_) => "value list",
            HandleValue::Scalar(_) => "scalar",
        }
    }
}

/// Handles owned by one client session.
#[derive(Debug, Default)]
pub struct ClientContext {
    handles: HashMap<String, HandleValue>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a handle, replacing any previous value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: HandleValue) {
        self.handles.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Result<&HandleValue> {
        self.handles
            .get(name)
            .ok_or_else(|| TesseraError::HandleNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn mismatch(name: &str, expected: &str) -> TesseraError {
        TesseraError::HandleTypeMismatch {
            handle: name.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn positions(&self, name: &str) -> Result<&[u32]> {
        match self.get(name)? {
            HandleValue::Positions(p) => Ok(p),
            _ => Err(Self::mismatch(name, "position list")),
        }
    }

    pub fn values(&self, name: &str) -> Result<&[i32]> {
        match self.get(name)? {
            HandleValue::Values(v) => Ok(v),
            _ => Err(Self::mismatch(name, "value list")),
        }
    }

    pub fn scalar(&self, name: &str) -> Result<Scalar> {
        match self.get(name)? {
            HandleValue::Scalar(s) => Ok(*s),
            other => Err(Self::mismatch(name, &format!("scalar, found {}", other.kind()))),
        }
    }
}
