//! Database file format and session bootstrap.
//!
//! A database is written as one file. All integers are little-endian and
//! names are length-prefixed UTF-8:
//!
//! ```text
//! magic "TSDB"
//! database: name, table capacity u32, table count u32
//!   table: name, width u32, column count u32, length u64
//!     column: name, length u64, capacity u64,
//!             updated buffer (u32 count + u32s), deleted buffer (same),
//!             has index u8
//!       index: kind u8, clustered u8,
//!              position map (u64 count + u32s) if unclustered,
//!              array count u32, arrays (u64 count + i32s)
//!       raw data (u64 count + i32s)
//! checksum u32 (CRC32 of everything above)
//! ```
//!
//! An unclustered index stores its single sorted key array. A clustered
//! index stores the sorted arrays of every column of the table, which is
//! the table itself in clustered order. B+ trees are not written; they are
//! rebuilt from the sorted keys on load.

use crate::column::Column;
use crate::database::Database;
use crate::index::{ColumnIndex, IndexKind, SortedIndex};
use crate::table::Table;
use bytes::{Buf, BufMut, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tessera_common::{Result, StorageConfig, TesseraError};
use tracing::{info, warn};

const MAGIC: &[u8; 4] = b"TSDB";
const CHECKSUM_SIZE: usize = 4;

/// Serializes a database, rebuilding stale indexes first.
///
/// The image has no stale flag, so every index it carries must be fresh.
pub fn encode(db: &mut Database) -> Result<Vec<u8>> {
    db.refresh_indexes()?;
    let mut buf = BytesMut::with_capacity(4096);
    buf.put_slice(MAGIC);
    put_name(&mut buf, db.name())?;
    buf.put_u32_le(db.capacity() as u32);
    buf.put_u32_le(db.tables().len() as u32);

    for table in db.tables() {
        put_name(&mut buf, table.name())?;
        buf.put_u32_le(table.width() as u32);
        buf.put_u32_le(table.columns().len() as u32);
        buf.put_u64_le(table.len() as u64);

        for column in table.columns() {
            put_column(&mut buf, table, column)?;
        }
    }

    let checksum = crc32fast::hash(&buf);
    buf.put_u32_le(checksum);
    Ok(buf.to_vec())
}

fn put_name(buf: &mut BytesMut, name: &str) -> Result<()> {
    let len = u16::try_from(name.len())
        .map_err(|_| TesseraError::ConfigError(format!("name too long: {}", name.len())))?;
    buf.put_u16_le(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

fn put_positions(buf: &mut BytesMut, positions: &[u32]) {
    buf.put_u64_le(positions.len() as u64);
    for &p in positions {
        buf.put_u32_le(p);
    }
}

fn put_values(buf: &mut BytesMut, values: &[i32]) {
    buf.put_u64_le(values.len() as u64);
    for &v in values {
        buf.put_i32_le(v);
    }
}

fn put_column(buf: &mut BytesMut, table: &Table, column: &Column) -> Result<()> {
    put_name(buf, column.name())?;
    buf.put_u64_le(column.len() as u64);
    buf.put_u64_le(column.capacity() as u64);
    put_positions(buf, column.updated_positions().as_slice());
    put_positions(buf, column.deleted_positions().as_slice());

    match column.index() {
        None => buf.put_u8(0),
        Some(index) => {
            buf.put_u8(1);
            buf.put_u8(index.kind().code());
            buf.put_u8(index.is_clustered() as u8);
            match index.sorted().positions() {
                Some(map) => {
                    put_positions(buf, map);
                    buf.put_u32_le(1);
                    put_values(buf, index.sorted().keys());
                }
                None => {
                    buf.put_u32_le(table.columns().len() as u32);
                    for sibling in table.columns() {
                        put_values(buf, sibling.values());
                    }
                }
            }
        }
    }

    put_values(buf, column.values());
    Ok(())
}

/// Bounds-checked reader over a database image.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, bytes: usize, what: &str) -> Result<()> {
        if self.data.remaining() < bytes {
            return Err(TesseraError::Corrupted(format!("truncated {}", what)));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.data.get_u8())
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.need(4, what)?;
        Ok(self.data.get_u32_le())
    }

    fn u64(&mut self, what: &str) -> Result<usize> {
        self.need(8, what)?;
        usize::try_from(self.data.get_u64_le())
            .map_err(|_| TesseraError::Corrupted(format!("{} does not fit in memory", what)))
    }

    fn name(&mut self) -> Result<String> {
        self.need(2, "name length")?;
        let len = self.data.get_u16_le() as usize;
        self.need(len, "name")?;
        let name = std::str::from_utf8(&self.data[..len])
            .map_err(|_| TesseraError::Corrupted("name is not UTF-8".to_string()))?
            .to_string();
        self.data.advance(len);
        Ok(name)
    }

    fn positions(&mut self, what: &str) -> Result<Vec<u32>> {
        let count = self.u64(what)?;
        self.need(count.saturating_mul(4), what)?;
        Ok((0..count).map(|_| self.data.get_u32_le()).collect())
    }

    fn values(&mut self, what: &str) -> Result<Vec<i32>> {
        let count = self.u64(what)?;
        self.need(count.saturating_mul(4), what)?;
        Ok((0..count).map(|_| self.data.get_i32_le()).collect())
    }
}

/// Deserializes a database image produced by [`encode`].
pub fn decode(image: &[u8]) -> Result<Database> {
    if image.len() < MAGIC.len() + CHECKSUM_SIZE {
        return Err(TesseraError::Corrupted("file too short".to_string()));
    }
    let (body, mut trailer) = image.split_at(image.len() - CHECKSUM_SIZE);
    let stored = trailer.get_u32_le();
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(TesseraError::Corrupted(format!(
            "checksum mismatch: stored={}, computed={}",
            stored, computed
        )));
    }
    if &body[..MAGIC.len()] != MAGIC {
        return Err(TesseraError::Corrupted("bad magic".to_string()));
    }

    let mut reader = Reader {
        data: &body[MAGIC.len()..],
    };
    let name = reader.name()?;
    let capacity = reader.u32("table capacity")? as usize;
    let table_count = reader.u32("table count")? as usize;
    if table_count > capacity {
        return Err(TesseraError::Corrupted(format!(
            "{} tables exceed capacity {}",
            table_count, capacity
        )));
    }

    let mut tables = Vec::with_capacity(table_count);
    for _ in 0..table_count {
        tables.push(read_table(&mut reader)?);
    }
    if reader.data.has_remaining() {
        return Err(TesseraError::Corrupted(format!(
            "{} trailing bytes",
            reader.data.remaining()
        )));
    }
    Ok(Database::from_parts(name, capacity, tables))
}

fn read_table(reader: &mut Reader<'_>) -> Result<Table> {
    let name = reader.name()?;
    let width = reader.u32("table width")? as usize;
    let column_count = reader.u32("column count")? as usize;
    let length = reader.u64("table length")?;
    if column_count > width {
        return Err(TesseraError::Corrupted(format!(
            "table {} has {} columns for width {}",
            name, column_count, width
        )));
    }

    let mut columns = Vec::with_capacity(column_count);
    for col in 0..column_count {
        columns.push(read_column(reader, &name, col, column_count, length)?);
    }
    Ok(Table::from_parts(name, width, columns, length))
}

fn read_column(
    reader: &mut Reader<'_>,
    table: &str,
    col: usize,
    column_count: usize,
    length: usize,
) -> Result<Column> {
    let name = reader.name()?;
    let column_length = reader.u64("column length")?;
    let capacity = reader.u64("column capacity")?;
    let updated = reader.positions("update buffer")?;
    let deleted = reader.positions("delete buffer")?;
    if column_length != length {
        return Err(TesseraError::Corrupted(format!(
            "column {}.{} has {} rows, table has {}",
            table, name, column_length, length
        )));
    }

    let index = match reader.u8("index flag")? {
        0 => None,
        _ => {
            let kind = IndexKind::from_code(reader.u8("index kind")?)?;
            let clustered = reader.u8("clustered flag")? != 0;
            let map = if clustered {
                None
            } else {
                Some(reader.positions("position map")?)
            };
            let arrays = reader.u32("index array count")? as usize;
            let expected = if clustered { column_count } else { 1 };
            if arrays != expected {
                return Err(TesseraError::Corrupted(format!(
                    "index on {}.{} has {} arrays, expected {}",
                    table, name, arrays, expected
                )));
            }
            let mut keys = Vec::new();
            for i in 0..arrays {
                let array = reader.values("index array")?;
                if array.len() != length {
                    return Err(TesseraError::Corrupted(format!(
                        "index array on {}.{} has {} entries, table has {}",
                        table,
                        name,
                        array.len(),
                        length
                    )));
                }
                // Clustered images carry every column; only this one's keys are kept.
                if !clustered || i == col {
                    keys = array;
                }
            }
            let sorted = SortedIndex::from_parts(keys, map)?;
            Some(ColumnIndex::from_sorted(kind, sorted))
        }
    };

    let data = reader.values("column data")?;
    if data.len() != length {
        return Err(TesseraError::Corrupted(format!(
            "column {}.{} data has {} values, table has {}",
            table,
            name,
            data.len(),
            length
        )));
    }
    if let Some(index) = &index {
        if index.is_clustered() && index.sorted().keys() != data.as_slice() {
            return Err(TesseraError::Corrupted(format!(
                "clustered column {}.{} is out of order",
                table, name
            )));
        }
    }
    Ok(Column::from_parts(name, data, capacity, index, updated, deleted))
}

/// Refreshes stale indexes and writes the database to `path`.
pub fn save(db: &mut Database, path: &Path, fsync: bool) -> Result<()> {
    let image = encode(db)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&image)?;
        if fsync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)?;

    info!(database = db.name(), path = %path.display(), bytes = image.len(), "saved database");
    Ok(())
}

/// Reads a database from `path`, rebuilding B+ trees in memory.
pub fn load(path: &Path) -> Result<Database> {
    let image = fs::read(path)?;
    let db = decode(&image)?;
    info!(
        database = db.name(),
        path = %path.display(),
        tables = db.tables().len(),
        "loaded database"
    );
    Ok(db)
}

/// Saves `db` and records it as the active database.
pub fn shutdown(db: &mut Database, config: &StorageConfig) -> Result<()> {
    fs::create_dir_all(&config.data_dir)?;
    save(db, &config.database_path(db.name()), config.fsync_enabled)?;

    let mut session = File::create(config.session_path())?;
    session.write_all(db.name().as_bytes())?;
    if config.fsync_enabled {
        session.sync_all()?;
    }
    Ok(())
}

/// Loads the database named in the session file, if there is one.
pub fn startup(config: &StorageConfig) -> Result<Option<Database>> {
    let name = match fs::read_to_string(config.session_path()) {
        Ok(name) => name.trim().to_string(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %config.session_path().display(), "no session file, starting empty");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if name.is_empty() {
        return Ok(None);
    }

    let path = config.database_path(&name);
    if !path.exists() {
        return Err(TesseraError::DatabaseNotFound(name));
    }
    let db = load(&path)?.with_column_capacity(config.column_base_capacity);
    info!(database = db.name(), "restored session");
    Ok(Some(db))
}
