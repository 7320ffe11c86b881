//! Aggregates and element-wise arithmetic over value lists.

use crate::ops::AggregateOp;
use tessera_common::{Result, Scalar, TesseraError};

/// Result of an aggregate operator.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Scalar(Scalar),
    Values(Vec<i32>),
}

/// Mean as a float.
pub fn avg(values: &[i32]) -> Result<Scalar> {
    if values.is_empty() {
        return Err(TesseraError::EmptyAggregate);
    }
    let total: i64 = values.iter().map(|&v| v as i64).sum();
    Ok(Scalar::Float(total as f64 / values.len() as f64))
}

/// Sum widened to 64 bits. The sum of no values is zero.
pub fn sum(values: &[i32]) -> Scalar {
    Scalar::Long(values.iter().map(|&v| v as i64).sum())
}

pub fn min(values: &[i32]) -> Result<Scalar> {
    values
        .iter()
        .min()
        .map(|&v| Scalar::Int(v))
        .ok_or(TesseraError::EmptyAggregate)
}

pub fn max(values: &[i32]) -> Result<Scalar> {
    values
        .iter()
        .max()
        .map(|&v| Scalar::Int(v))
        .ok_or(TesseraError::EmptyAggregate)
}

fn zip_with(a: &[i32], b: &[i32], f: impl Fn(i32, i32) -> i32) -> Result<Vec<i32>> {
    if a.len() != b.len() {
        return Err(TesseraError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect())
}

/// Element-wise `a + b`, wrapping on overflow.
pub fn add(a: &[i32], b: &[i32]) -> Result<Vec<i32>> {
    zip_with(a, b, i32::wrapping_add)
}

/// Element-wise `a - b`, wrapping on overflow.
pub fn sub(a: &[i32], b: &[i32]) -> Result<Vec<i32>> {
    zip_with(a, b, i32::wrapping_sub)
}

/// Applies `op` to its inputs.
pub fn evaluate(op: AggregateOp, inputs: &[&[i32]]) -> Result<AggregateValue> {
    if inputs.len() != op.arity() {
        return Err(TesseraError::InvalidOperator(format!(
            "{:?} takes {} inputs, got {}",
            op,
            op.arity(),
            inputs.len()
        )));
    }
    Ok(match op {
        AggregateOp::Avg => AggregateValue::Scalar(avg(inputs[0])?),
        AggregateOp::Sum => AggregateValue::Scalar(sum(inputs[0])),
        AggregateOp::Min => AggregateValue::Scalar(min(inputs[0])?),
        AggregateOp::Max => AggregateValue::Scalar(max(inputs[0])?),
        AggregateOp::Add => AggregateValue::Values(add(inputs[0], inputs[1])?),
        AggregateOp::Sub => AggregateValue::Values(sub(inputs[0], inputs[1])?),
    })
}
