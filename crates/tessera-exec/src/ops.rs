//! Resolved operator records.
//!
//! Operators arrive already bound to table and column handles. Names only
//! appear for objects that do not exist yet (creation) and for client
//! handles.

use tessera_common::ValueRange;
use tessera_storage::{ColumnRef, IndexKind, TableId};

/// Join algorithm requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    NestedLoop,
    Hash,
}

/// Aggregate and element-wise arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Avg,
    Sum,
    Min,
    Max,
    Add,
    Sub,
}

impl AggregateOp {
    /// Number of inputs the operator takes.
    pub fn arity(&self) -> usize {
        match self {
            AggregateOp::Add | AggregateOp::Sub => 2,
            _ => 1,
        }
    }
}

/// Input to an aggregate: a stored column or a client handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Column(ColumnRef),
    Handle(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    CreateDb {
        name: String,
    },
    /// `name` is `db.tbl`.
    CreateTable {
        name: String,
        columns: usize,
    },
    /// `name` is `db.tbl.col`.
    CreateColumn {
        name: String,
    },
    CreateIndex {
        column: ColumnRef,
        kind: IndexKind,
        clustered: bool,
    },
    Insert {
        table: TableId,
        values: Vec<i32>,
    },
    /// Row-major values for every column of the table.
    Load {
        table: TableId,
        values: Vec<i32>,
    },
    Update {
        column: ColumnRef,
        positions: String,
        value: i32,
    },
    Delete {
        table: TableId,
        positions: String,
    },
    Select {
        column: ColumnRef,
        range: ValueRange,
        out: String,
    },
    /// Select over a position/value handle pair.
    SelectPositions {
        positions: String,
        values: String,
        range: ValueRange,
        out: String,
    },
    Fetch {
        column: ColumnRef,
        positions: String,
        out: String,
    },
    Join {
        positions_1: String,
        values_1: String,
        positions_2: String,
        values_2: String,
        kind: JoinKind,
        out_1: String,
        out_2: String,
    },
    Aggregate {
        op: AggregateOp,
        inputs: Vec<Operand>,
        out: String,
    },
    Print {
        handles: Vec<String>,
    },
    Shutdown,
}

impl Operator {
    /// Returns true for operators that only read the database.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Operator::Select { .. }
                | Operator::SelectPositions { .. }
                | Operator::Fetch { .. }
                | Operator::Join { .. }
                | Operator::Aggregate { .. }
                | Operator::Print { .. }
        )
    }

    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::CreateDb { .. } => "create_db",
            Operator::CreateTable { .. } => "create_table",
            Operator::CreateColumn { .. } => "create_column",
            Operator::CreateIndex { .. } => "create_index",
            Operator::Insert { .. } => "insert",
            Operator::Load { .. } => "load",
            Operator::Update { .. } => "update",
            Operator::Delete { .. } => "delete",
            Operator::Select { .. } => "select",
            Operator::SelectPositions { .. } => "select_positions",
            Operator::Fetch { .. } => "fetch",
            Operator::Join { .. } => "join",
            Operator::Aggregate { .. } => "aggregate",
            Operator::Print { .. } => "print",
            Operator::Shutdown => "shutdown",
        }
    }
}
