//! Error types for Tessera.

use thiserror::Error;

/// Result type alias using TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Errors that can occur in Tessera operations.
#[derive(Debug, Error)]
pub enum TesseraError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database file corrupted: {0}")]
    Corrupted(String),

    // Allocation errors
    #[error("Out of memory: unable to reserve {requested} values")]
    OutOfMemory { requested: usize },

    // Lookup errors
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("No active database")]
    NoActiveDatabase,

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Handle not found: {0}")]
    HandleNotFound(String),

    // Capacity errors
    #[error("Table limit reached for database {database} (capacity {capacity})")]
    TableLimitReached { database: String, capacity: usize },

    #[error("Column limit reached for table {table} (capacity {capacity})")]
    ColumnLimitReached { table: String, capacity: usize },

    // Catalog conflicts
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Column already exists: {0}")]
    ColumnAlreadyExists(String),

    #[error("Index already exists on column: {0}")]
    IndexAlreadyExists(String),

    #[error("Table {0} already has a clustered index")]
    ClusteredIndexExists(String),

    #[error("Table {0} already has rows, columns can no longer be added")]
    TableNotEmpty(String),

    // Shape errors
    #[error("Row width mismatch: expected {expected} values, got {actual}")]
    RowWidthMismatch { expected: usize, actual: usize },

    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Position {position} out of bounds (length {length})")]
    PositionOutOfBounds { position: usize, length: usize },

    #[error("Handle {handle} is not a {expected}")]
    HandleTypeMismatch { handle: String, expected: String },

    #[error("Aggregate over empty input")]
    EmptyAggregate,

    // Execution errors
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TesseraError {
    /// Returns true for errors that leave the engine unable to continue the
    /// current operation because memory could not be obtained.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, TesseraError::OutOfMemory { .. })
    }
}
