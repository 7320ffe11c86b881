//! Tables: fixed sets of equal-length columns.

use crate::column::Column;
use crate::index::{ColumnIndex, IndexKind, IndexState, SortedIndex, sort_permutation};
use tessera_common::{DELETE_BUFFER_SIZE, Result, TesseraError};
use tracing::debug;

/// A table of `width` integer columns sharing one row count.
#[derive(Debug)]
pub struct Table {
    name: String,
    width: usize,
    columns: Vec<Column>,
    length: usize,
}

impl Table {
    /// Creates a table that will hold `width` columns.
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            columns: Vec::with_capacity(width),
            length: 0,
        }
    }

    pub(crate) fn from_parts(
        name: String,
        width: usize,
        columns: Vec<Column>,
        length: usize,
    ) -> Self {
        Self {
            name,
            width,
            columns,
            length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows, including rows pending deletion.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Result<&Column> {
        self.columns
            .get(idx)
            .ok_or_else(|| TesseraError::ColumnNotFound(format!("{}[{}]", self.name, idx)))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Adds a column. Columns can only be added while the table is empty.
    pub fn add_column(&mut self, name: &str, capacity: usize) -> Result<usize> {
        if self.column_index(name).is_some() {
            return Err(TesseraError::ColumnAlreadyExists(format!("{}.{}", self.name, name)));
        }
        if self.columns.len() >= self.width {
            return Err(TesseraError::ColumnLimitReached {
                table: self.name.clone(),
                capacity: self.width,
            });
        }
        if self.length > 0 {
            return Err(TesseraError::TableNotEmpty(self.name.clone()));
        }
        self.columns.push(Column::new(name, capacity)?);
        Ok(self.columns.len() - 1)
    }

    fn check_complete(&self, values: usize) -> Result<()> {
        if self.columns.len() != self.width || values != self.width {
            return Err(TesseraError::RowWidthMismatch {
                expected: self.width,
                actual: values.min(self.columns.len()),
            });
        }
        Ok(())
    }

    fn check_positions(&self, positions: &[u32]) -> Result<()> {
        if let Some(&bad) = positions.iter().find(|&&p| p as usize >= self.length) {
            return Err(TesseraError::PositionOutOfBounds {
                position: bad as usize,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Appends one row.
    ///
    /// Space is reserved in every column before any value is written, so a
    /// failed allocation leaves the table unchanged.
    pub fn insert(&mut self, row: &[i32]) -> Result<()> {
        self.check_complete(row.len())?;
        for column in &mut self.columns {
            column.reserve(1)?;
        }
        for (column, &value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        self.length += 1;
        Ok(())
    }

    /// Appends many rows from a row-major buffer, then rebuilds indexes once.
    pub fn load(&mut self, values: &[i32]) -> Result<usize> {
        if self.width == 0 || values.len() % self.width != 0 {
            return Err(TesseraError::RowWidthMismatch {
                expected: self.width,
                actual: values.len(),
            });
        }
        self.check_complete(self.width)?;

        let rows = values.len() / self.width;
        for column in &mut self.columns {
            column.reserve(rows)?;
        }
        for row in values.chunks_exact(self.width) {
            for (column, &value) in self.columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        self.length += rows;
        self.rebuild_all_indexes()?;
        Ok(rows)
    }

    /// Overwrites `positions` of column `col` with `value`.
    pub fn update(&mut self, col: usize, positions: &[u32], value: i32) -> Result<()> {
        self.column(col)?;
        self.check_positions(positions)?;

        let column = &mut self.columns[col];
        for &pos in positions {
            column.set(pos, value);
        }
        if column.buffer_updates(positions) {
            debug!(table = %self.name, column = col, "update buffer full, rebuilding index");
            self.rebuild_index(col)?;
        }
        Ok(())
    }

    /// Marks rows deleted in every column.
    ///
    /// Once the pending set would reach the delete buffer size, all pending
    /// rows are removed at once and every index is rebuilt.
    pub fn delete(&mut self, positions: &[u32]) -> Result<()> {
        self.check_positions(positions)?;

        let mut combined = self.pending_deletes();
        combined.extend_from_slice(positions);
        combined.sort_unstable();
        combined.dedup();
        if combined.len() >= DELETE_BUFFER_SIZE {
            return self.remove_rows(&combined);
        }

        for column in &mut self.columns {
            column.buffer_deletes(positions);
        }
        Ok(())
    }

    /// Positions buffered for deletion, ascending.
    pub fn pending_deletes(&self) -> Vec<u32> {
        // Every column receives the same deletes.
        self.columns
            .first()
            .map(|c| c.deleted_positions().sorted())
            .unwrap_or_default()
    }

    fn remove_rows(&mut self, doomed: &[u32]) -> Result<()> {
        for column in &mut self.columns {
            column.remove_rows(doomed);
        }
        self.length -= doomed.len();
        debug!(table = %self.name, removed = doomed.len(), rows = self.length, "compacted deletes");
        self.rebuild_all_indexes()
    }

    /// Creates an index on column `col` and builds it.
    pub fn create_index(&mut self, col: usize, kind: IndexKind, clustered: bool) -> Result<()> {
        let column = self.column(col)?;
        if column.index().is_some() {
            return Err(TesseraError::IndexAlreadyExists(format!(
                "{}.{}",
                self.name,
                column.name()
            )));
        }
        if clustered && self.columns.iter().any(Column::is_clustered) {
            return Err(TesseraError::ClusteredIndexExists(self.name.clone()));
        }

        // Placeholder so the rebuild knows the declared kind.
        let placeholder = ColumnIndex::from_sorted(
            kind,
            if clustered {
                SortedIndex::build_clustered(&[])?
            } else {
                SortedIndex::build_unclustered(&[])?
            },
        );
        self.columns[col].install_index(placeholder);
        self.rebuild_index(col)
    }

    /// Rebuilds the index on column `col`.
    ///
    /// A clustered rebuild reorders every column of the table and then
    /// rebuilds the other indexes. Pending deletes follow their rows to the
    /// new positions and stay buffered.
    pub fn rebuild_index(&mut self, col: usize) -> Result<()> {
        let Some(index) = self.column(col)?.index() else {
            return Ok(());
        };
        let kind = index.kind();
        let clustered = index.is_clustered();

        if !clustered {
            let built = ColumnIndex::build(kind, false, self.columns[col].values())?;
            self.columns[col].install_index(built);
            debug!(table = %self.name, column = col, ?kind, "rebuilt unclustered index");
            return Ok(());
        }

        let permutation = sort_permutation(self.columns[col].values())?;
        let mut inverse = vec![0u32; permutation.len()];
        for (row, &old) in permutation.iter().enumerate() {
            inverse[old as usize] = row as u32;
        }
        for column in &mut self.columns {
            column.apply_permutation(&permutation, &inverse);
        }
        let built = ColumnIndex::build(kind, true, self.columns[col].values())?;
        self.columns[col].install_index(built);
        debug!(table = %self.name, column = col, ?kind, "reclustered table");

        for other in 0..self.columns.len() {
            if other == col {
                continue;
            }
            if let Some(index) = self.columns[other].index() {
                let built = ColumnIndex::build(index.kind(), false, self.columns[other].values())?;
                self.columns[other].install_index(built);
            }
        }
        Ok(())
    }

    /// Rebuilds every index, the clustered one first.
    pub fn rebuild_all_indexes(&mut self) -> Result<()> {
        if let Some(clustered) = self.columns.iter().position(Column::is_clustered) {
            return self.rebuild_index(clustered);
        }
        for col in 0..self.columns.len() {
            if self.columns[col].index().is_some() {
                self.rebuild_index(col)?;
            }
        }
        Ok(())
    }

    /// Rebuilds stale indexes. Returns the number of columns refreshed.
    pub fn refresh_stale(&mut self) -> Result<usize> {
        let stale: Vec<usize> = (0..self.columns.len())
            .filter(|&c| self.columns[c].index_state() == IndexState::Stale)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        // A clustered rebuild also rebuilds every other index.
        if let Some(&clustered) = stale.iter().find(|&&c| self.columns[c].is_clustered()) {
            self.rebuild_index(clustered)?;
            return Ok(stale.len());
        }
        for &col in &stale {
            self.rebuild_index(col)?;
        }
        Ok(stale.len())
    }
}
