//! Storage integration tests.
//!
//! Exercises indexes, buffered mutation and persistence through the public
//! API with randomized data:
//! - Sorted and B+ tree range queries against a linear scan
//! - Clustered index row correspondence
//! - Delete masking before compaction
//! - Save and load of a multi-table database

use rand::Rng;
use tempfile::tempdir;

use tessera_common::{StorageConfig, ValueRange};
use tessera_storage::persist;
use tessera_storage::{
    ColumnRef, Database, IndexKind, IndexState, TableId, select, select_refreshed,
};

const ROWS: usize = 20_000;

fn random_db(rows: usize, width: usize, spread: i32) -> Database {
    let mut rng = rand::rng();
    let mut db = Database::new("db1", 4).unwrap();
    let t = db.create_table("tbl1", width).unwrap();
    for c in 0..width {
        db.create_column(t, &format!("col{}", c + 1)).unwrap();
    }
    let values: Vec<i32> = (0..rows * width)
        .map(|_| rng.random_range(-spread..spread))
        .collect();
    db.load_rows(t, &values).unwrap();
    db
}

fn linear(db: &Database, col: ColumnRef, range: &ValueRange) -> Vec<u32> {
    db.column(col)
        .unwrap()
        .values()
        .iter()
        .enumerate()
        .filter(|(_, v)| range.contains(**v))
        .map(|(p, _)| p as u32)
        .collect()
}

fn random_ranges(count: usize, spread: i32) -> Vec<ValueRange> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let low = rng.random_range(-spread - 10..spread + 10);
            let width = rng.random_range(0..spread / 4 + 1);
            ValueRange::bounded(low, low + width)
        })
        .collect()
}

#[test]
fn test_sorted_index_matches_scan() {
    let mut db = random_db(ROWS, 1, 5_000);
    let col = ColumnRef::new(TableId(0), 0);
    db.create_index(col, IndexKind::Sorted, false).unwrap();

    for range in random_ranges(100, 5_000) {
        let expected = linear(&db, col, &range);
        assert_eq!(select(db.column(col).unwrap(), &range), expected);
        // repeatable
        assert_eq!(select(db.column(col).unwrap(), &range), expected);
    }
}

#[test]
fn test_btree_agrees_with_sorted_index() {
    let mut sorted_db = random_db(ROWS, 1, 200);
    let values = sorted_db.column(ColumnRef::new(TableId(0), 0)).unwrap().values().to_vec();

    let mut btree_db = Database::new("db2", 1).unwrap();
    let t = btree_db.create_table("tbl1", 1).unwrap();
    let col = btree_db.create_column(t, "col1").unwrap();
    btree_db.load_rows(t, &values).unwrap();

    sorted_db
        .create_index(col, IndexKind::Sorted, false)
        .unwrap();
    btree_db.create_index(col, IndexKind::BTree, false).unwrap();

    for range in random_ranges(100, 200) {
        let a = select(sorted_db.column(col).unwrap(), &range);
        let b = select(btree_db.column(col).unwrap(), &range);
        assert_eq!(a, b, "range {:?}", range);
    }
}

fn rows_of(db: &Database, t: TableId) -> Vec<(i32, i32, i32)> {
    let table = db.table(t).unwrap();
    (0..table.len())
        .map(|r| {
            (
                table.column(0).unwrap().values()[r],
                table.column(1).unwrap().values()[r],
                table.column(2).unwrap().values()[r],
            )
        })
        .collect()
}

#[test]
fn test_clustered_index_preserves_rows() {
    let mut db = random_db(5_000, 3, 1_000);
    let t = TableId(0);
    let mut before = rows_of(&db, t);
    before.sort_unstable();

    db.create_index(ColumnRef::new(t, 1), IndexKind::BTree, true)
        .unwrap();

    let table = db.table(t).unwrap();
    let key = table.column(1).unwrap().values();
    assert!(key.windows(2).all(|w| w[0] <= w[1]));

    let mut after = rows_of(&db, t);
    after.sort_unstable();
    assert_eq!(before, after);
}

#[test]
fn test_clustered_select_matches_scan() {
    let mut db = random_db(8_000, 2, 300);
    let key = ColumnRef::new(TableId(0), 0);
    let other = ColumnRef::new(TableId(0), 1);
    db.create_index(key, IndexKind::Sorted, true).unwrap();
    db.create_index(other, IndexKind::BTree, false).unwrap();

    for range in random_ranges(50, 300) {
        assert_eq!(select(db.column(key).unwrap(), &range), linear(&db, key, &range));
        assert_eq!(
            select(db.column(other).unwrap(), &range),
            linear(&db, other, &range)
        );
    }
}

#[test]
fn test_deleted_rows_are_masked() {
    let mut db = random_db(1_000, 2, 50);
    let t = TableId(0);
    let col = ColumnRef::new(t, 0);
    db.create_index(col, IndexKind::BTree, false).unwrap();

    let doomed: Vec<u32> = (0..1_000).step_by(17).collect();
    assert!(doomed.len() < 128);
    db.delete(t, &doomed).unwrap();
    assert_eq!(db.table(t).unwrap().len(), 1_000);

    let all = select_refreshed(&mut db, col, &ValueRange::all()).unwrap();
    assert_eq!(all.len(), 1_000 - doomed.len());
    for p in &doomed {
        assert!(all.binary_search(p).is_err());
    }
    assert_eq!(db.column(col).unwrap().index_state(), IndexState::Fresh);
}

#[test]
fn test_compaction_keeps_columns_aligned() {
    let mut db = Database::new("db1", 1).unwrap();
    let t = db.create_table("tbl1", 2).unwrap();
    let a = db.create_column(t, "a").unwrap();
    db.create_column(t, "b").unwrap();
    let rows: Vec<i32> = (0..500).flat_map(|i| [i, i * 2]).collect();
    db.load_rows(t, &rows).unwrap();
    db.create_index(a, IndexKind::Sorted, false).unwrap();

    for chunk in (0..130u32).collect::<Vec<_>>().chunks(10) {
        // delete from the tail so earlier positions stay valid
        let positions: Vec<u32> = chunk.iter().map(|i| 499 - i).collect();
        db.delete(t, &positions).unwrap();
    }

    let table = db.table(t).unwrap();
    assert!(table.len() < 500);
    assert_eq!(table.len() + table.pending_deletes().len(), 370);
    let a_values = table.column(0).unwrap().values();
    let b_values = table.column(1).unwrap().values();
    for (a, b) in a_values.iter().zip(b_values) {
        assert_eq!(*b, a * 2);
    }
}

#[test]
fn test_database_roundtrip() {
    let dir = tempdir().unwrap();
    let config = StorageConfig {
        data_dir: dir.path().to_path_buf(),
        fsync_enabled: false,
        ..StorageConfig::default()
    };

    let mut db = Database::new("db1", 4).unwrap();
    for (name, kind, clustered) in [
        ("t1", IndexKind::Sorted, false),
        ("t2", IndexKind::BTree, true),
        ("t3", IndexKind::BTree, false),
    ] {
        let t = db.create_table(name, 2).unwrap();
        let a = db.create_column(t, "a").unwrap();
        db.create_column(t, "b").unwrap();
        let rows: Vec<i32> = (0..2_000).flat_map(|i| [(i * 7919) % 613, i]).collect();
        db.load_rows(t, &rows).unwrap();
        db.create_index(a, kind, clustered).unwrap();
    }
    db.delete(TableId(2), &[1, 2, 3]).unwrap();

    let probes = random_ranges(20, 613);
    let expected: Vec<Vec<Vec<u32>>> = (0..3)
        .map(|t| {
            probes
                .iter()
                .map(|r| select(db.column(ColumnRef::new(TableId(t), 0)).unwrap(), r))
                .collect()
        })
        .collect();

    persist::shutdown(&mut db, &config).unwrap();
    let restored = persist::startup(&config).unwrap().unwrap();

    assert_eq!(restored.tables().len(), 3);
    for t in 0..3 {
        let table = restored.table(TableId(t)).unwrap();
        assert_eq!(table.len(), db.table(TableId(t)).unwrap().len());
        let col = ColumnRef::new(TableId(t), 0);
        for (range, want) in probes.iter().zip(&expected[t]) {
            assert_eq!(&select(restored.column(col).unwrap(), range), want);
        }
    }
}
