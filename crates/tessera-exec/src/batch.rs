//! Batched execution of read operators with shared scans.
//!
//! A batch runs in three phases, each fully joined before the next starts:
//!
//! ```text
//!   phase 1: selects     grouped by column, one pass over the column per group
//!   phase 2: fetches     grouped by source position handle
//!   phase 3: the rest    one task per operator
//! ```
//!
//! Outputs of a phase are committed to the client context before the next
//! phase begins, so a fetch can consume positions selected in the same batch.
//! Tasks within a phase see the context as it was when the phase started.
//! Print operators render last, in queue order, after phase 3 has committed.

use crate::context::{ClientContext, HandleValue};
use crate::eval::{Output, evaluate};
use crate::fork::fork_join;
use crate::ops::Operator;
use tessera_common::{ExecConfig, Result, TesseraError, ValueRange};
use tessera_storage::{Column, ColumnRef, Database, IndexState};
use tracing::debug;

/// One unit of work inside a phase.
enum Task<'a> {
    /// Selects over the same column answered by one scan.
    SharedScan {
        column: ColumnRef,
        members: Vec<(&'a ValueRange, &'a str)>,
    },
    /// Fetches driven by the same position handle.
    SharedFetch {
        positions: &'a str,
        members: Vec<(ColumnRef, &'a str)>,
    },
    Single(&'a Operator),
}

impl Task<'_> {
    fn run(
        &self,
        db: Option<&Database>,
        ctx: &ClientContext,
        config: &ExecConfig,
    ) -> Result<Output> {
        match self {
            Task::SharedScan { column, members } => {
                let db = db.ok_or(TesseraError::NoActiveDatabase)?;
                Ok(shared_scan(db.column(*column)?, members))
            }
            Task::SharedFetch { positions, members } => {
                let db = db.ok_or(TesseraError::NoActiveDatabase)?;
                shared_fetch(db, ctx.positions(positions)?, members)
            }
            Task::Single(op) => evaluate(db, ctx, op, config),
        }
    }
}

fn shared_scan(column: &Column, members: &[(&ValueRange, &str)]) -> Output {
    let deleted = column.deleted_positions();
    let mut buffers: Vec<Vec<u32>> = vec![Vec::new(); members.len()];
    for (pos, &value) in column.values().iter().enumerate() {
        let pos = pos as u32;
        if deleted.contains(pos) {
            continue;
        }
        for ((range, _), buffer) in members.iter().zip(buffers.iter_mut()) {
            if range.contains(value) {
                buffer.push(pos);
            }
        }
    }
    Output {
        handles: members
            .iter()
            .zip(buffers)
            .map(|((_, out), positions)| (out.to_string(), HandleValue::Positions(positions)))
            .collect(),
        printed: None,
    }
}

fn shared_fetch(db: &Database, positions: &[u32], members: &[(ColumnRef, &str)]) -> Result<Output> {
    let columns = members
        .iter()
        .map(|(col, _)| db.column(*col).map(Column::values))
        .collect::<Result<Vec<_>>>()?;
    let mut buffers: Vec<Vec<i32>> = members
        .iter()
        .map(|_| Vec::with_capacity(positions.len()))
        .collect();
    for &p in positions {
        for (values, buffer) in columns.iter().zip(buffers.iter_mut()) {
            let value = values
                .get(p as usize)
                .ok_or(TesseraError::PositionOutOfBounds {
                    position: p as usize,
                    length: values.len(),
                })?;
            buffer.push(*value);
        }
    }
    Ok(Output {
        handles: members
            .iter()
            .zip(buffers)
            .map(|((_, out), values)| (out.to_string(), HandleValue::Values(values)))
            .collect(),
        printed: None,
    })
}

/// Groups members by key, starting a new group for a key once its current
/// group holds `fan_in` members. Groups keep first-appearance order.
fn group_by<K: PartialEq, M>(
    items: impl IntoIterator<Item = (K, M)>,
    fan_in: usize,
) -> Vec<(K, Vec<M>)> {
    let mut groups: Vec<(K, Vec<M>)> = Vec::new();
    for (key, member) in items {
        match groups
            .iter()
            .position(|(k, members)| *k == key && members.len() < fan_in)
        {
            Some(i) => groups[i].1.push(member),
            None => groups.push((key, vec![member])),
        }
    }
    groups
}

/// Executes queued read operators in shared-scan phases.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    config: ExecConfig,
}

impl BatchScheduler {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    /// Rejects any operator that would modify the database.
    pub fn validate(ops: &[Operator]) -> Result<()> {
        match ops.iter().find(|op| !op.is_read_only()) {
            Some(op) => Err(TesseraError::InvalidOperator(format!(
                "{} cannot be batched",
                op.name()
            ))),
            None => Ok(()),
        }
    }

    /// Returns true if a select in `ops` targets a column with a stale index.
    pub fn needs_refresh(db: &Database, ops: &[Operator]) -> bool {
        ops.iter().any(|op| match op {
            Operator::Select { column, .. } => db
                .column(*column)
                .is_ok_and(|c| c.index_state() == IndexState::Stale),
            _ => false,
        })
    }

    /// Rebuilds stale indexes on every column a batched select targets.
    ///
    /// Runs on the caller's thread before any worker is spawned. Returns the
    /// number of indexes rebuilt.
    pub fn refresh(db: &mut Database, ops: &[Operator]) -> Result<usize> {
        let mut rebuilt = 0;
        for op in ops {
            if let Operator::Select { column, .. } = op
                && db.column(*column)?.index_state() == IndexState::Stale
            {
                db.table_mut(column.table)?.rebuild_index(column.column)?;
                rebuilt += 1;
            }
        }
        if rebuilt > 0 {
            debug!(rebuilt, "refreshed stale indexes before batch");
        }
        Ok(rebuilt)
    }

    /// Runs `ops` against `db`, committing results into `ctx`.
    ///
    /// Returns the text of every print operator, in queue order. On error
    /// nothing from the failing phase is committed.
    pub fn run(
        &self,
        db: Option<&Database>,
        ctx: &mut ClientContext,
        ops: &[Operator],
    ) -> Result<Vec<String>> {
        Self::validate(ops)?;
        let fan_in = self.config.shared_scan_fan_in.max(1);

        let selects = group_by(
            ops.iter().filter_map(|op| match op {
                Operator::Select { column, range, out } => {
                    Some((*column, (range, out.as_str(), op)))
                }
                _ => None,
            }),
            fan_in,
        );
        let fetches = group_by(
            ops.iter().filter_map(|op| match op {
                Operator::Fetch {
                    column,
                    positions,
                    out,
                } => Some((positions.as_str(), (*column, out.as_str()))),
                _ => None,
            }),
            fan_in,
        );
        let others: Vec<&Operator> = ops
            .iter()
            .filter(|op| {
                !matches!(
                    op,
                    Operator::Select { .. } | Operator::Fetch { .. } | Operator::Print { .. }
                )
            })
            .collect();
        let prints: Vec<&Operator> = ops
            .iter()
            .filter(|op| matches!(op, Operator::Print { .. }))
            .collect();

        debug!(
            select_groups = selects.len(),
            fetch_groups = fetches.len(),
            others = others.len(),
            prints = prints.len(),
            "running batch"
        );

        let scan_phase = selects
            .into_iter()
            .map(|(column, members)| match members.as_slice() {
                // A lone select can use the column's index.
                [(_, _, op)] => Task::Single(*op),
                _ => Task::SharedScan {
                    column,
                    members: members.iter().map(|&(range, out, _)| (range, out)).collect(),
                },
            })
            .collect();
        self.run_phase(db, ctx, scan_phase)?;

        let fetch_phase = fetches
            .into_iter()
            .map(|(positions, members)| Task::SharedFetch { positions, members })
            .collect();
        self.run_phase(db, ctx, fetch_phase)?;

        self.run_phase(db, ctx, others.into_iter().map(Task::Single).collect())?;

        let mut printed = Vec::with_capacity(prints.len());
        for op in prints {
            if let Some(text) = evaluate(db, ctx, op, &self.config)?.commit(ctx) {
                printed.push(text);
            }
        }
        Ok(printed)
    }

    fn run_phase(
        &self,
        db: Option<&Database>,
        ctx: &mut ClientContext,
        tasks: Vec<Task<'_>>,
    ) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let snapshot: &ClientContext = ctx;
        let config = &self.config;
        let jobs: Vec<_> = tasks
            .iter()
            .map(|task| move || task.run(db, snapshot, config))
            .collect();
        let outputs = fork_join(jobs, self.config.max_worker_threads)?;
        for output in outputs {
            output.commit(ctx);
        }
        Ok(())
    }
}
