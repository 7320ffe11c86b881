//! Engine-wide constants.
//!
//! These values are part of the index geometry or the on-disk format and
//! are therefore not exposed through configuration.

/// Maximum number of fence keys in a B+ tree node.
pub const BTREE_NODE_CAPACITY: usize = 512;

/// Updated positions buffered per column before the index is rebuilt.
pub const UPDATE_BUFFER_SIZE: usize = 128;

/// Deleted positions buffered per column before the column is compacted.
pub const DELETE_BUFFER_SIZE: usize = 128;

/// Maximum length of a database, table or column name in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Default number of tables a database can hold.
pub const DEFAULT_MAX_TABLES: usize = 16;

/// Default initial capacity of a column, in values.
pub const DEFAULT_COLUMN_CAPACITY: usize = 4096;
