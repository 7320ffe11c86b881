//! Column storage engine for Tessera.
//!
//! This crate provides:
//! - Columns of 32-bit integers with buffered updates and deletes
//! - Tables and the database catalog
//! - Sorted and B+ tree indexes, clustered or unclustered
//! - Range selects and positional fetches that respect index staleness
//! - A checksummed single-file database format and session bootstrap

mod column;
mod coordinator;
mod database;
mod index;
pub mod persist;
mod table;

pub use column::{Column, PositionBuffer};
pub use coordinator::{fetch, scan, select, select_positions, select_refreshed};
pub use database::{ColumnRef, Database, TableId};
pub use index::{BPlusTree, ColumnIndex, IndexKind, IndexState, SortedIndex, sort_permutation};
pub use table::Table;
