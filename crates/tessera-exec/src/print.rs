//! Text rendering of client handles.

use crate::context::{ClientContext, HandleValue};
use std::fmt::Write;
use tessera_common::{Result, TesseraError};

/// Renders the named handles.
///
/// Columns (position or value lists) are printed row by row with values
/// separated by `,` and rows by newlines. Scalars are printed on one line
/// separated by `,`. Columns and scalars cannot be mixed.
pub fn format_handles(ctx: &ClientContext, names: &[String]) -> Result<String> {
    let Some(first) = names.first() else {
        return Ok(String::new());
    };
    let values: Vec<&HandleValue> = names
        .iter()
        .map(|n| ctx.get(n))
        .collect::<Result<_>>()?;

    if matches!(ctx.get(first)?, HandleValue::Scalar(_)) {
        format_scalars(names, &values)
    } else {
        format_columns(names, &values)
    }
}

fn format_scalars(names: &[String], values: &[&HandleValue]) -> Result<String> {
    let mut out = String::new();
    for (i, (name, value)) in names.iter().zip(values).enumerate() {
        let HandleValue::Scalar(scalar) = value else {
            return Err(TesseraError::HandleTypeMismatch {
                handle: name.clone(),
                expected: "scalar".to_string(),
            });
        };
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", scalar);
    }
    Ok(out)
}

enum ColumnView<'a> {
    Positions(&'a [u32]),
    Values(&'a [i32]),
}

impl ColumnView<'_> {
    fn len(&self) -> usize {
        match self {
            ColumnView::Positions(p) => p.len(),
            ColumnView::Values(v) => v.len(),
        }
    }

    fn write_row(&self, out: &mut String, row: usize) {
        let _ = match self {
            ColumnView::Positions(p) => write!(out, "{}", p[row]),
            ColumnView::Values(v) => write!(out, "{}", v[row]),
        };
    }
}

fn format_columns(names: &[String], values: &[&HandleValue]) -> Result<String> {
    let mut columns = Vec::with_capacity(values.len());
    for (name, value) in names.iter().zip(values) {
        columns.push(match value {
            HandleValue::Positions(p) => ColumnView::Positions(p),
            HandleValue::Values(v) => ColumnView::Values(v),
            HandleValue::Scalar(_) => {
                return Err(TesseraError::HandleTypeMismatch {
                    handle: name.clone(),
                    expected: "column".to_string(),
                });
            }
        });
    }

    let rows = columns[0].len();
    if let Some(other) = columns.iter().find(|c| c.len() != rows) {
        return Err(TesseraError::LengthMismatch {
            left: rows,
            right: other.len(),
        });
    }

    let mut out = String::new();
    for row in 0..rows {
        if row > 0 {
            out.push('\n');
        }
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            column.write_row(&mut out, row);
        }
    }
    Ok(out)
}
