//! Evaluation of read-only operators.
//!
//! Evaluation never mutates the database or the client context. Results come
//! back as an [`Output`] that the caller commits, which lets batch workers
//! run against shared borrows.

use crate::aggregate::{self, AggregateValue};
use crate::context::{ClientContext, HandleValue};
use crate::join::{JoinInput, join};
use crate::ops::{Operand, Operator};
use crate::print::format_handles;
use std::borrow::Cow;
use tessera_common::{ExecConfig, Result, TesseraError};
use tessera_storage::{Database, fetch, select, select_positions};

/// Handles produced by an operator and any printed text.
#[derive(Debug, Default, PartialEq)]
pub struct Output {
    pub handles: Vec<(String, HandleValue)>,
    pub printed: Option<String>,
}

impl Output {
    fn handle(name: &str, value: HandleValue) -> Self {
        Self {
            handles: vec![(name.to_string(), value)],
            printed: None,
        }
    }

    /// Stores produced handles in `ctx`, returning any printed text.
    pub fn commit(self, ctx: &mut ClientContext) -> Option<String> {
        for (name, value) in self.handles {
            ctx.insert(name, value);
        }
        self.printed
    }
}

fn require(db: Option<&Database>) -> Result<&Database> {
    db.ok_or(TesseraError::NoActiveDatabase)
}

/// Evaluates a read-only operator.
pub fn evaluate(
    db: Option<&Database>,
    ctx: &ClientContext,
    op: &Operator,
    config: &ExecConfig,
) -> Result<Output> {
    match op {
        Operator::Select { column, range, out } => {
            let positions = select(require(db)?.column(*column)?, range);
            Ok(Output::handle(out, HandleValue::Positions(positions)))
        }
        Operator::SelectPositions {
            positions,
            values,
            range,
            out,
        } => {
            let selected = select_positions(ctx.positions(positions)?, ctx.values(values)?, range)?;
            Ok(Output::handle(out, HandleValue::Positions(selected)))
        }
        Operator::Fetch {
            column,
            positions,
            out,
        } => {
            let values = fetch(require(db)?.column(*column)?, ctx.positions(positions)?)?;
            Ok(Output::handle(out, HandleValue::Values(values)))
        }
        Operator::Join {
            positions_1,
            values_1,
            positions_2,
            values_2,
            kind,
            out_1,
            out_2,
        } => {
            let left = JoinInput::new(ctx.positions(positions_1)?, ctx.values(values_1)?)?;
            let right = JoinInput::new(ctx.positions(positions_2)?, ctx.values(values_2)?)?;
            let result = join(left, right, *kind, config)?;
            Ok(Output {
                handles: vec![
                    (out_1.clone(), HandleValue::Positions(result.left)),
                    (out_2.clone(), HandleValue::Positions(result.right)),
                ],
                printed: None,
            })
        }
        Operator::Aggregate { op, inputs, out } => {
            let resolved = inputs
                .iter()
                .map(|input| operand_values(db, ctx, input))
                .collect::<Result<Vec<_>>>()?;
            let slices: Vec<&[i32]> = resolved.iter().map(|c| c.as_ref()).collect();
            let value = match aggregate::evaluate(*op, &slices)? {
                AggregateValue::Scalar(s) => HandleValue::Scalar(s),
                AggregateValue::Values(v) => HandleValue::Values(v),
            };
            Ok(Output::handle(out, value))
        }
        Operator::Print { handles } => Ok(Output {
            handles: Vec::new(),
            printed: Some(format_handles(ctx, handles)?),
        }),
        other => Err(TesseraError::InvalidOperator(format!(
            "{} modifies the database",
            other.name()
        ))),
    }
}

fn operand_values<'a>(
    db: Option<&Database>,
    ctx: &'a ClientContext,
    operand: &Operand,
) -> Result<Cow<'a, [i32]>> {
    match operand {
        Operand::Column(col) => Ok(Cow::Owned(require(db)?.column(*col)?.live_values())),
        Operand::Handle(name) => Ok(Cow::Borrowed(ctx.values(name)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{AggregateOp, JoinKind};
    use tessera_common::{Scalar, ValueRange};
    use tessera_storage::{ColumnRef, TableId};

    fn sample() -> (Database, ColumnRef, ColumnRef) {
        let mut db = Database::new("db1", 1).unwrap();
        let t = db.create_table("tbl1", 2).unwrap();
        let a = db.create_column(t, "a").unwrap();
        let b = db.create_column(t, "b").unwrap();
        db.load_rows(t, &[1, 10, 3, 30, 2, 20]).unwrap();
        (db, a, b)
    }

    #[test]
    fn test_select_fetch_aggregate() {
        let (db, a, b) = sample();
        let config = ExecConfig::default();
        let mut ctx = ClientContext::new();

        let select = Operator::Select {
            column: a,
            range: ValueRange::bounded(2, 4),
            out: "s1".to_string(),
        };
        evaluate(Some(&db), &ctx, &select, &config).unwrap().commit(&mut ctx);
        assert_eq!(ctx.positions("s1").unwrap(), &[1, 2]);

        let fetch = Operator::Fetch {
            column: b,
            positions: "s1".to_string(),
            out: "f1".to_string(),
        };
        evaluate(Some(&db), &ctx, &fetch, &config).unwrap().commit(&mut ctx);
        assert_eq!(ctx.values("f1").unwrap(), &[30, 20]);

        let sum = Operator::Aggregate {
            op: AggregateOp::Sum,
            inputs: vec![Operand::Handle("f1".to_string())],
            out: "total".to_string(),
        };
        evaluate(Some(&db), &ctx, &sum, &config).unwrap().commit(&mut ctx);
        assert_eq!(ctx.scalar("total").unwrap(), Scalar::Long(50));

        let avg_column = Operator::Aggregate {
            op: AggregateOp::Avg,
            inputs: vec![Operand::Column(a)],
            out: "mean".to_string(),
        };
        evaluate(Some(&db), &ctx, &avg_column, &config).unwrap().commit(&mut ctx);
        assert_eq!(ctx.scalar("mean").unwrap(), Scalar::Float(2.0));
    }

    #[test]
    fn test_aggregate_skips_deleted_rows() {
        let (mut db, a, _) = sample();
        db.delete(TableId(0), &[1]).unwrap();
        let op = Operator::Aggregate {
            op: AggregateOp::Max,
            inputs: vec![Operand::Column(a)],
            out: "m".to_string(),
        };
        let ctx = ClientContext::new();
        let output = evaluate(Some(&db), &ctx, &op, &ExecConfig::default()).unwrap();
        assert_eq!(
            output.handles,
            vec![("m".to_string(), HandleValue::Scalar(Scalar::Int(2)))]
        );
    }

    #[test]
    fn test_join_outputs_two_handles() {
        let mut ctx = ClientContext::new();
        ctx.insert("p1", HandleValue::Positions(vec![0, 1]));
        ctx.insert("v1", HandleValue::Values(vec![5, 6]));
        ctx.insert("p2", HandleValue::Positions(vec![9]));
        ctx.insert("v2", HandleValue::Values(vec![6]));
        let op = Operator::Join {
            positions_1: "p1".to_string(),
            values_1: "v1".to_string(),
            positions_2: "p2".to_string(),
            values_2: "v2".to_string(),
            kind: JoinKind::Hash,
            out_1: "r1".to_string(),
            out_2: "r2".to_string(),
        };
        evaluate(None, &ctx, &op, &ExecConfig::default())
            .unwrap()
            .commit(&mut ctx);
        assert_eq!(ctx.positions("r1").unwrap(), &[1]);
        assert_eq!(ctx.positions("r2").unwrap(), &[9]);
    }

    #[test]
    fn test_requires_database_and_read_only() {
        let ctx = ClientContext::new();
        let select = Operator::Select {
            column: ColumnRef::new(TableId(0), 0),
            range: ValueRange::all(),
            out: "s".to_string(),
        };
        assert!(matches!(
            evaluate(None, &ctx, &select, &ExecConfig::default()),
            Err(TesseraError::NoActiveDatabase)
        ));
        assert!(matches!(
            evaluate(None, &ctx, &Operator::Shutdown, &ExecConfig::default()),
            Err(TesseraError::InvalidOperator(_))
        ));
    }
}
