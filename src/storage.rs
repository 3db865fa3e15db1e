use rusqlite::{params, Connection, ToSql, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::types::{CleanTable, Year};

/// Column stamped on every persisted row with the run's year.
pub const YEAR_COLUMN: &str = "year";

/// What the existence check found for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// The table has not been created yet.
    Missing,
    Present { rows_for_year: u64 },
}

impl TableStatus {
    pub fn has_rows(&self) -> bool {
        matches!(self, TableStatus::Present { rows_for_year } if *rows_for_year > 0)
    }
}

/// SQLite database holding the persisted yearly tables.
///
/// The connection is owned by the store and closed when the store is dropped.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let open_err = |source| IngestError::StorageOpen {
            path: path.clone(),
            source,
        };
        let conn = Connection::open(&path).map_err(open_err)?;
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| IngestError::StorageOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self { conn })
    }

    /// Start a write-locked transaction scoped to `table`.
    ///
    /// `BEGIN IMMEDIATE` takes SQLite's write lock up front, so the
    /// existence check and the append inside one `TableTx` cannot be
    /// interleaved with another writer.
    pub fn begin(&mut self, table: &str) -> Result<TableTx<'_>> {
        self.begin_with(table, TransactionBehavior::Immediate)
    }

    fn begin_with(&mut self, table: &str, behavior: TransactionBehavior) -> Result<TableTx<'_>> {
        validate_table_name(table)?;
        let tx = self
            .conn
            .transaction_with_behavior(behavior)
            .map_err(|source| IngestError::StorageQuery {
                table: table.to_string(),
                source,
            })?;
        Ok(TableTx {
            tx,
            table: table.to_string(),
        })
    }

    /// Existence gate as a standalone read. Deferred, so it takes no write lock.
    pub fn year_exists(&mut self, table: &str, year: Year) -> Result<bool> {
        let tx = self.begin_with(table, TransactionBehavior::Deferred)?;
        let exists = tx.year_exists(year)?;
        tx.rollback()?;
        Ok(exists)
    }

    /// Append as a standalone committed write.
    pub fn append(&mut self, table: &str, year: Year, clean: &CleanTable) -> Result<usize> {
        let tx = self.begin(table)?;
        let written = tx.append(year, clean)?;
        tx.commit()?;
        Ok(written)
    }

    /// Total rows in `table`, 0 when it does not exist.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        validate_table_name(table)?;
        let query_err = |source| IngestError::StorageQuery {
            table: table.to_string(),
            source,
        };
        if !table_exists(&self.conn, table).map_err(query_err)? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as u64)
    }
}

/// One gate-then-append unit of work against a single table.
///
/// Dropping it without `commit` rolls back.
pub struct TableTx<'a> {
    tx: Transaction<'a>,
    table: String,
}

impl<'a> TableTx<'a> {
    /// Check the table for rows of `year`. Only a missing table maps to
    /// `TableStatus::Missing`; every other failure is a `StorageQuery` error.
    pub fn status(&self, year: Year) -> Result<TableStatus> {
        let query_err = |source| IngestError::StorageQuery {
            table: self.table.clone(),
            source,
        };
        if !table_exists(&self.tx, &self.table).map_err(query_err)? {
            return Ok(TableStatus::Missing);
        }
        // Bare identifier: a double-quoted one silently becomes a string
        // literal when the column is missing, and the count would read 0.
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(&self.table),
            YEAR_COLUMN
        );
        let count: i64 = self
            .tx
            .query_row(&sql, params![year.get()], |row| row.get(0))
            .map_err(query_err)?;
        Ok(TableStatus::Present {
            rows_for_year: count as u64,
        })
    }

    pub fn year_exists(&self, year: Year) -> Result<bool> {
        Ok(self.status(year)?.has_rows())
    }

    /// Append every row of `clean`, stamping the `year` column. Creates the
    /// table from the clean schema when it is missing; never touches
    /// existing rows.
    pub fn append(&self, year: Year, clean: &CleanTable) -> Result<usize> {
        let write_err = |source| IngestError::StorageWrite {
            table: self.table.clone(),
            source,
        };

        self.tx
            .execute(&create_table_sql(&self.table, clean), [])
            .map_err(write_err)?;

        if clean.rows.is_empty() {
            return Ok(0);
        }

        let mut columns: Vec<String> = clean.column_names().map(quote_ident).collect();
        columns.push(quote_ident(YEAR_COLUMN));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut stmt = self.tx.prepare(&sql).map_err(write_err)?;
        let year_value = i64::from(year.get());
        for row in &clean.rows {
            let mut values: Vec<&dyn ToSql> = row.iter().map(|c| c as &dyn ToSql).collect();
            values.push(&year_value);
            stmt.execute(values.as_slice()).map_err(write_err)?;
        }

        debug!(table = %self.table, rows = clean.rows.len(), "appended rows");
        Ok(clean.rows.len())
    }

    pub fn commit(self) -> Result<()> {
        let table = self.table;
        self.tx
            .commit()
            .map_err(|source| IngestError::StorageWrite { table, source })
    }

    pub fn rollback(self) -> Result<()> {
        let table = self.table;
        self.tx
            .rollback()
            .map_err(|source| IngestError::StorageQuery { table, source })
    }
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )
}

fn create_table_sql(table: &str, clean: &CleanTable) -> String {
    let mut defs: Vec<String> = clean
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} {}", quote_ident(&col.name), clean.column_type(i).as_sql()))
        .collect();
    defs.push(format!("{} INTEGER", quote_ident(YEAR_COLUMN)));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        defs.join(", ")
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(IngestError::InvalidTableName(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, CleanColumn};

    fn year(y: u16) -> Year {
        Year::new(y).unwrap()
    }

    fn sample_table() -> CleanTable {
        CleanTable {
            columns: vec![
                CleanColumn { name: "col_0".into(), coerced: true },
                CleanColumn { name: "col_1".into(), coerced: false },
            ],
            rows: vec![
                vec![Cell::Integer(1), Cell::Text("a".into())],
                vec![Cell::Integer(2), Cell::Null],
            ],
        }
    }

    #[test]
    fn test_missing_table_is_not_an_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let tx = store.begin("mi_tabla").unwrap();
        assert_eq!(tx.status(year(2020)).unwrap(), TableStatus::Missing);
        assert!(!tx.year_exists(year(2020)).unwrap());
    }

    #[test]
    fn test_gate_reports_committed_year() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.append("mi_tabla", year(2020), &sample_table()).unwrap(), 2);

        assert!(store.year_exists("mi_tabla", year(2020)).unwrap());
        assert!(!store.year_exists("mi_tabla", year(2021)).unwrap());

        let tx = store.begin("mi_tabla").unwrap();
        assert_eq!(tx.status(year(2020)).unwrap(), TableStatus::Present { rows_for_year: 2 });
        assert_eq!(tx.status(year(2021)).unwrap(), TableStatus::Present { rows_for_year: 0 });
    }

    #[test]
    fn test_append_is_append_only() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.append("mi_tabla", year(2019), &sample_table()).unwrap();
        store.append("mi_tabla", year(2020), &sample_table()).unwrap();
        assert_eq!(store.row_count("mi_tabla").unwrap(), 4);
    }

    #[test]
    fn test_uncommitted_append_is_rolled_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        {
            let tx = store.begin("mi_tabla").unwrap();
            tx.append(year(2020), &sample_table()).unwrap();
        }
        assert_eq!(store.row_count("mi_tabla").unwrap(), 0);
        assert!(!store.year_exists("mi_tabla", year(2020)).unwrap());
    }

    #[test]
    fn test_table_without_year_column_is_a_query_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("CREATE TABLE legacy (col_0 INTEGER)", [])
            .unwrap();

        let err = store.year_exists("legacy", year(2020)).unwrap_err();
        assert!(matches!(err, IngestError::StorageQuery { .. }));

        let tx = store.begin("legacy").unwrap();
        assert!(matches!(tx.status(year(2020)), Err(IngestError::StorageQuery { .. })));
    }

    #[test]
    fn test_append_to_table_without_year_column_fails() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("CREATE TABLE legacy (col_0 INTEGER, col_1 TEXT)", [])
            .unwrap();

        let err = store.append("legacy", year(2020), &sample_table()).unwrap_err();
        assert!(matches!(err, IngestError::StorageWrite { .. }));
        assert_eq!(store.row_count("legacy").unwrap(), 0);
    }

    #[test]
    fn test_standalone_check_reads_while_writer_holds_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let mut writer = SqliteStore::open(&path, Duration::ZERO).unwrap();
        writer.append("mi_tabla", year(2020), &sample_table()).unwrap();

        let _held = writer.begin("mi_tabla").unwrap();
        // No busy wait: an immediate transaction here would fail with SQLITE_BUSY
        let mut reader = SqliteStore::open(&path, Duration::ZERO).unwrap();
        assert!(reader.year_exists("mi_tabla", year(2020)).unwrap());
        assert!(matches!(
            reader.begin("mi_tabla"),
            Err(IngestError::StorageQuery { .. })
        ));
    }

    #[test]
    fn test_schema_mismatch_is_a_write_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("CREATE TABLE mi_tabla (col_0 INTEGER, year INTEGER)", [])
            .unwrap();

        let err = store.append("mi_tabla", year(2020), &sample_table()).unwrap_err();
        assert!(matches!(err, IngestError::StorageWrite { .. }));
        assert_eq!(store.row_count("mi_tabla").unwrap(), 0);
    }

    #[test]
    fn test_created_schema_types() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.append("typed", year(2020), &sample_table()).unwrap();

        let mut stmt = store
            .conn
            .prepare("SELECT name, type FROM pragma_table_info('typed') ORDER BY cid")
            .unwrap();
        let cols: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(
            cols,
            vec![
                ("col_0".to_string(), "INTEGER".to_string()),
                ("col_1".to_string(), "TEXT".to_string()),
                ("year".to_string(), "INTEGER".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_table_creates_schema_only() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let empty = CleanTable {
            columns: sample_table().columns,
            rows: vec![],
        };
        assert_eq!(store.append("mi_tabla", year(2020), &empty).unwrap(), 0);

        let tx = store.begin("mi_tabla").unwrap();
        assert_eq!(tx.status(year(2020)).unwrap(), TableStatus::Present { rows_for_year: 0 });
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("mi_tabla").is_ok());
        assert!(validate_table_name("_t2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2t").is_err());
        assert!(validate_table_name("t; DROP TABLE x").is_err());
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.begin("bad-name"),
            Err(IngestError::InvalidTableName(_))
        ));
    }
}
