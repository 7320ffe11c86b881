//! Range selects and positional fetches over columns.
//!
//! Selects use the column's index when it is fresh and fall back to a scan
//! otherwise. Either way, rows buffered for deletion are masked out and the
//! result is returned in ascending position order.

use crate::column::Column;
use crate::database::{ColumnRef, Database};
use crate::index::IndexState;
use tessera_common::{Result, TesseraError, ValueRange};
use tracing::{debug, warn};

/// Scans `column` for rows in `range`, skipping rows pending deletion.
pub fn scan(column: &Column, range: &ValueRange) -> Vec<u32> {
    if range.is_empty() {
        return Vec::new();
    }
    let deleted = column.deleted_positions();
    column
        .values()
        .iter()
        .enumerate()
        .filter(|&(pos, &v)| range.contains(v) && !deleted.contains(pos as u32))
        .map(|(pos, _)| pos as u32)
        .collect()
}

/// Removes positions in `deleted` (ascending) from `positions`.
fn mask_deleted(positions: &mut Vec<u32>, deleted: &[u32]) {
    if !deleted.is_empty() {
        positions.retain(|p| deleted.binary_search(p).is_err());
    }
}

/// Selects rows of `column` whose value lies in `range`.
///
/// A stale index is never trusted here; use [`select_refreshed`] to rebuild
/// it first.
pub fn select(column: &Column, range: &ValueRange) -> Vec<u32> {
    match (column.index_state(), column.index()) {
        (IndexState::Fresh, Some(index)) => {
            let mut positions = index.range(range);
            mask_deleted(&mut positions, &column.deleted_positions().sorted());
            positions.sort_unstable();
            positions
        }
        (IndexState::Stale, _) => {
            warn!(column = column.name(), "index is stale, scanning instead");
            scan(column, range)
        }
        _ => scan(column, range),
    }
}

/// Selects from a column, rebuilding its index first if it is stale.
pub fn select_refreshed(db: &mut Database, col: ColumnRef, range: &ValueRange) -> Result<Vec<u32>> {
    if db.column(col)?.index_state() == IndexState::Stale {
        debug!(table = col.table.0, column = col.column, "rebuilding stale index before select");
        db.table_mut(col.table)?.rebuild_index(col.column)?;
    }
    Ok(select(db.column(col)?, range))
}

/// Returns `positions[i]` for every `i` with `values[i]` in `range`.
pub fn select_positions(positions: &[u32], values: &[i32], range: &ValueRange) -> Result<Vec<u32>> {
    if positions.len() != values.len() {
        return Err(TesseraError::LengthMismatch {
            left: positions.len(),
            right: values.len(),
        });
    }
    Ok(positions
        .iter()
        .zip(values)
        .filter(|&(_, &v)| range.contains(v))
        .map(|(&p, _)| p)
        .collect())
}

/// Returns `column[p]` for each position, in order.
pub fn fetch(column: &Column, positions: &[u32]) -> Result<Vec<i32>> {
    let values = column.values();
    positions
        .iter()
        .map(|&p| {
            values
                .get(p as usize)
                .copied()
                .ok_or(TesseraError::PositionOutOfBounds {
                    position: p as usize,
                    length: values.len(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TableId;
    use crate::index::IndexKind;

    fn db_with(values: &[[i32; 2]]) -> (Database, ColumnRef, ColumnRef) {
        let mut db = Database::new("db", 2).unwrap();
        let t = db.create_table("t", 2).unwrap();
        let a = db.create_column(t, "a").unwrap();
        let b = db.create_column(t, "b").unwrap();
        for row in values {
            db.insert(t, row).unwrap();
        }
        (db, a, b)
    }

    #[test]
    fn test_select_without_index() {
        let (db, a, _) = db_with(&[[1, 10], [3, 30], [2, 20]]);
        let positions = select(db.column(a).unwrap(), &ValueRange::bounded(2, 4));
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn test_select_with_sorted_index_is_ascending() {
        let (mut db, a, _) = db_with(&[[1, 10], [3, 30], [2, 20]]);
        db.create_index(a, IndexKind::Sorted, false).unwrap();
        let positions = select(db.column(a).unwrap(), &ValueRange::bounded(2, 4));
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn test_select_masks_deletes() {
        let (mut db, a, _) = db_with(&[[5, 0], [5, 1], [5, 2]]);
        db.create_index(a, IndexKind::BTree, false).unwrap();
        db.delete(TableId(0), &[1]).unwrap();

        let stale = select(db.column(a).unwrap(), &ValueRange::bounded(5, 6));
        assert_eq!(stale, vec![0, 2]);

        let fresh = select_refreshed(&mut db, a, &ValueRange::bounded(5, 6)).unwrap();
        assert_eq!(fresh, vec![0, 2]);
        assert_eq!(db.column(a).unwrap().index_state(), IndexState::Fresh);
    }

    #[test]
    fn test_clustered_select_keeps_positions_after_delete() {
        let (mut db, a, _) = db_with(&[[1, 10], [2, 20], [3, 30], [4, 40]]);
        db.create_index(a, IndexKind::Sorted, true).unwrap();
        db.delete(TableId(0), &[1]).unwrap();

        let positions = select_refreshed(&mut db, a, &ValueRange::bounded(3, 5)).unwrap();
        assert_eq!(positions, vec![2, 3]);
        assert_eq!(db.table(TableId(0)).unwrap().len(), 4);
        assert_eq!(db.table(TableId(0)).unwrap().pending_deletes(), vec![1]);

        let all = select_refreshed(&mut db, a, &ValueRange::all()).unwrap();
        assert_eq!(all, vec![0, 2, 3]);
    }

    #[test]
    fn test_select_refreshed_sees_updates() {
        let (mut db, a, _) = db_with(&[[1, 0], [2, 0], [3, 0]]);
        db.create_index(a, IndexKind::Sorted, false).unwrap();
        db.update(a, &[0], 7).unwrap();

        let positions = select_refreshed(&mut db, a, &ValueRange::bounded(5, 10)).unwrap();
        assert_eq!(positions, vec![0]);
    }

    #[test]
    fn test_select_positions() {
        let positions = select_positions(&[4, 8, 9], &[10, 20, 30], &ValueRange::bounded(15, 31))
            .unwrap();
        assert_eq!(positions, vec![8, 9]);
        assert!(select_positions(&[1], &[], &ValueRange::all()).is_err());
    }

    #[test]
    fn test_fetch() {
        let (db, _, b) = db_with(&[[1, 10], [3, 30], [2, 20]]);
        let values = fetch(db.column(b).unwrap(), &[2, 0]).unwrap();
        assert_eq!(values, vec![20, 10]);
        assert!(matches!(
            fetch(db.column(b).unwrap(), &[3]),
            Err(TesseraError::PositionOutOfBounds { position: 3, .. })
        ));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let (mut db, a, _) = db_with(&[[1, 10], [3, 30]]);
        assert!(select(db.column(a).unwrap(), &ValueRange::bounded(3, 1)).is_empty());
        db.create_index(a, IndexKind::BTree, false).unwrap();
        assert!(select(db.column(a).unwrap(), &ValueRange::bounded(3, 1)).is_empty());
    }
}
