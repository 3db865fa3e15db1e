//! Tabular shapes shared by the loader, the normalizer and the store.

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::fmt;

/// Marker used in source data for a missing or invalid measurement.
pub const PLACEHOLDER: char = '*';

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    /// Infer a cell from a raw CSV field: empty → `Null`, then integer, then
    /// finite float, otherwise text (kept verbatim).
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Cell::Null;
        }
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Cell::Integer(i);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Cell::Real(f),
            _ => Cell::Text(raw.to_string()),
        }
    }

    /// Number of placeholders this cell stands for. Only cells made entirely
    /// of `*` count, one per marker.
    pub fn placeholder_count(&self) -> usize {
        match self {
            Cell::Text(s) if !s.is_empty() && s.chars().all(|c| c == PLACEHOLDER) => s.len(),
            _ => 0,
        }
    }

    /// Integer coercion: never fails, anything unparsable becomes 0.
    pub fn coerce_integer(&self) -> i64 {
        match self {
            Cell::Integer(i) => *i,
            Cell::Real(f) => truncate(*f),
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(truncate))
                    .unwrap_or(0)
            }
            Cell::Null => 0,
        }
    }
}

fn truncate(f: f64) -> i64 {
    // `as` saturates at the i64 bounds
    if f.is_finite() {
        f.trunc() as i64
    } else {
        0
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(Value::Null),
            Cell::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Cell::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Table as read from the input file, original headers intact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Every row has exactly `headers.len()` cells.
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

/// Declared SQLite affinity for a persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A cleaned column: positional name plus whether it was integer-coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanColumn {
    pub name: String,
    pub coerced: bool,
}

/// Table after filtering, coercion and positional renaming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanTable {
    pub columns: Vec<CleanColumn>,
    pub rows: Vec<Vec<Cell>>,
}

impl CleanTable {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Infer the column's storage type from its cells.
    pub fn column_type(&self, index: usize) -> ColumnType {
        if self.columns[index].coerced {
            return ColumnType::Integer;
        }
        let mut ty = ColumnType::Integer;
        let mut seen = false;
        for cell in self.rows.iter().map(|r| &r[index]) {
            match cell {
                Cell::Null => continue,
                Cell::Integer(_) => {}
                Cell::Real(_) => ty = ColumnType::Real,
                Cell::Text(_) => return ColumnType::Text,
            }
            seen = true;
        }
        if seen {
            ty
        } else {
            ColumnType::Text
        }
    }
}

/// Year extracted from an identifier, always within 1900..=2099.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Year(u16);

impl Year {
    pub const MIN: u16 = 1900;
    pub const MAX: u16 = 2099;

    pub fn new(value: u16) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Year(value))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
