//! Database catalog and resolved table/column handles.

use crate::column::Column;
use crate::index::IndexKind;
use crate::table::Table;
use tessera_common::{DEFAULT_COLUMN_CAPACITY, MAX_NAME_LEN, Result, TesseraError};
use tracing::info;

/// Handle to a table within a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub usize);

/// Handle to a column within a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table: TableId,
    pub column: usize,
}

impl ColumnRef {
    pub fn new(table: TableId, column: usize) -> Self {
        Self { table, column }
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('.') {
        return Err(TesseraError::ConfigError(format!(
            "invalid name {:?}: must be 1-{} bytes without '.'",
            name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// A named set of tables.
#[derive(Debug)]
pub struct Database {
    name: String,
    capacity: usize,
    column_capacity: usize,
    tables: Vec<Table>,
}

impl Database {
    /// Creates an empty database holding at most `capacity` tables.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        check_name(name)?;
        info!(database = name, capacity, "created database");
        Ok(Self {
            name: name.to_string(),
            capacity,
            column_capacity: DEFAULT_COLUMN_CAPACITY,
            tables: Vec::new(),
        })
    }

    pub(crate) fn from_parts(name: String, capacity: usize, tables: Vec<Table>) -> Self {
        Self {
            name,
            capacity,
            column_capacity: DEFAULT_COLUMN_CAPACITY,
            tables,
        }
    }

    /// Sets the initial capacity of columns created afterwards.
    pub fn with_column_capacity(mut self, capacity: usize) -> Self {
        self.column_capacity = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, id: TableId) -> Result<&Table> {
        self.tables
            .get(id.0)
            .ok_or_else(|| TesseraError::TableNotFound(format!("{}#{}", self.name, id.0)))
    }

    pub fn table_mut(&mut self, id: TableId) -> Result<&mut Table> {
        let name = format!("{}#{}", self.name, id.0);
        self.tables.get_mut(id.0).ok_or(TesseraError::TableNotFound(name))
    }

    pub fn column(&self, col: ColumnRef) -> Result<&Column> {
        self.table(col.table)?.column(col.column)
    }

    /// Creates a table with room for `width` columns.
    pub fn create_table(&mut self, name: &str, width: usize) -> Result<TableId> {
        check_name(name)?;
        if self.tables.iter().any(|t| t.name() == name) {
            return Err(TesseraError::TableAlreadyExists(format!("{}.{}", self.name, name)));
        }
        if self.tables.len() >= self.capacity {
            return Err(TesseraError::TableLimitReached {
                database: self.name.clone(),
                capacity: self.capacity,
            });
        }
        self.tables.push(Table::new(name, width));
        info!(database = %self.name, table = name, width, "created table");
        Ok(TableId(self.tables.len() - 1))
    }

    pub fn create_column(&mut self, table: TableId, name: &str) -> Result<ColumnRef> {
        check_name(name)?;
        let capacity = self.column_capacity;
        let column = self.table_mut(table)?.add_column(name, capacity)?;
        info!(database = %self.name, table = table.0, column = name, "created column");
        Ok(ColumnRef::new(table, column))
    }

    pub fn create_index(&mut self, col: ColumnRef, kind: IndexKind, clustered: bool) -> Result<()> {
        self.table_mut(col.table)?
            .create_index(col.column, kind, clustered)?;
        info!(
            database = %self.name,
            table = col.table.0,
            column = col.column,
            ?kind,
            clustered,
            "created index"
        );
        Ok(())
    }

    /// Resolves `db.tbl` to a table handle.
    pub fn resolve_table(&self, qualified: &str) -> Result<TableId> {
        let mut parts = qualified.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(db), Some(tbl), None) if db == self.name => self
                .tables
                .iter()
                .position(|t| t.name() == tbl)
                .map(TableId)
                .ok_or_else(|| TesseraError::TableNotFound(qualified.to_string())),
            _ => Err(TesseraError::TableNotFound(qualified.to_string())),
        }
    }

    /// Resolves `db.tbl.col` to a column handle.
    pub fn resolve_column(&self, qualified: &str) -> Result<ColumnRef> {
        let (table_name, column_name) = qualified
            .rsplit_once('.')
            .ok_or_else(|| TesseraError::ColumnNotFound(qualified.to_string()))?;
        let table = self
            .resolve_table(table_name)
            .map_err(|_| TesseraError::ColumnNotFound(qualified.to_string()))?;
        self.tables[table.0]
            .column_index(column_name)
            .map(|column| ColumnRef::new(table, column))
            .ok_or_else(|| TesseraError::ColumnNotFound(qualified.to_string()))
    }

    /// Returns `db.tbl.col` for a handle.
    pub fn qualified_name(&self, col: ColumnRef) -> Result<String> {
        let table = self.table(col.table)?;
        Ok(format!(
            "{}.{}.{}",
            self.name,
            table.name(),
            table.column(col.column)?.name()
        ))
    }

    pub fn insert(&mut self, table: TableId, row: &[i32]) -> Result<()> {
        self.table_mut(table)?.insert(row)
    }

    /// Bulk loads row-major values and rebuilds the table's indexes.
    pub fn load_rows(&mut self, table: TableId, values: &[i32]) -> Result<usize> {
        let rows = self.table_mut(table)?.load(values)?;
        info!(database = %self.name, table = table.0, rows, "loaded rows");
        Ok(rows)
    }

    pub fn update(&mut self, col: ColumnRef, positions: &[u32], value: i32) -> Result<()> {
        self.table_mut(col.table)?.update(col.column, positions, value)
    }

    pub fn delete(&mut self, table: TableId, positions: &[u32]) -> Result<()> {
        self.table_mut(table)?.delete(positions)
    }

    /// Rebuilds every stale index. Returns the number of columns refreshed.
    pub fn refresh_indexes(&mut self) -> Result<usize> {
        let mut refreshed = 0;
        for table in &mut self.tables {
            refreshed += table.refresh_stale()?;
        }
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db() -> Database {
        let mut db = Database::new("db1", 4).unwrap();
        let t = db.create_table("tbl1", 2).unwrap();
        db.create_column(t, "a").unwrap();
        db.create_column(t, "b").unwrap();
        db
    }

    #[test]
    fn test_resolve_names() {
        let db = sample_db();
        assert_eq!(db.resolve_table("db1.tbl1").unwrap(), TableId(0));
        let col = db.resolve_column("db1.tbl1.b").unwrap();
        assert_eq!(col, ColumnRef::new(TableId(0), 1));
        assert_eq!(db.qualified_name(col).unwrap(), "db1.tbl1.b");

        assert!(matches!(
            db.resolve_table("db2.tbl1"),
            Err(TesseraError::TableNotFound(_))
        ));
        assert!(matches!(
            db.resolve_column("db1.tbl1.z"),
            Err(TesseraError::ColumnNotFound(_))
        ));
        assert!(db.resolve_column("db1").is_err());
    }

    #[test]
    fn test_table_limit() {
        let mut db = Database::new("db1", 1).unwrap();
        db.create_table("t1", 1).unwrap();
        assert!(matches!(
            db.create_table("t2", 1),
            Err(TesseraError::TableLimitReached { capacity: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_table() {
        let mut db = sample_db();
        assert!(matches!(
            db.create_table("tbl1", 1),
            Err(TesseraError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn test_invalid_names() {
        assert!(Database::new("", 1).is_err());
        assert!(Database::new("a.b", 1).is_err());
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(Database::new(&long, 1).is_err());
    }

    #[test]
    fn test_column_capacity_applies() {
        let mut db = Database::new("db1", 1).unwrap().with_column_capacity(8);
        let t = db.create_table("t", 1).unwrap();
        let c = db.create_column(t, "a").unwrap();
        assert_eq!(db.column(c).unwrap().capacity(), 8);
    }

    #[test]
    fn test_refresh_indexes() {
        let mut db = sample_db();
        let t = TableId(0);
        let a = ColumnRef::new(t, 0);
        db.create_index(a, IndexKind::BTree, false).unwrap();
        db.insert(t, &[1, 2]).unwrap();
        assert_eq!(db.refresh_indexes().unwrap(), 1);
        assert_eq!(db.refresh_indexes().unwrap(), 0);
    }
}
