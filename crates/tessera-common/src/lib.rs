//! Tessera common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all Tessera components.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{EngineConfig, ExecConfig, StorageConfig};
pub use constants::{
    BTREE_NODE_CAPACITY, DEFAULT_COLUMN_CAPACITY, DEFAULT_MAX_TABLES, DELETE_BUFFER_SIZE,
    MAX_NAME_LEN, UPDATE_BUFFER_SIZE,
};
pub use error::{Result, TesseraError};
pub use types::{Scalar, ValueRange};
