use tracing::debug;

use crate::types::{Cell, CleanColumn, CleanTable, RawTable};

/// Default fraction of a row's columns that may hold placeholders.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Counts reported alongside a normalized table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub kept: usize,
    pub dropped: usize,
    pub allowed_stars: usize,
}

/// Row filter + integer coercion + positional rename.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    threshold: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Normalizer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Placeholders a row may carry and still be kept: `floor(columns * threshold)`.
    pub fn allowed_stars(&self, column_count: usize) -> usize {
        let allowed = (column_count as f64 * self.threshold).floor();
        if allowed.is_finite() && allowed > 0.0 {
            allowed as usize
        } else {
            0
        }
    }

    /// Produce a new `CleanTable`; the input is left untouched.
    pub fn normalize(&self, raw: &RawTable) -> (CleanTable, NormalizeStats) {
        let allowed_stars = self.allowed_stars(raw.column_count());

        let kept: Vec<&Vec<Cell>> = raw
            .rows
            .iter()
            .filter(|row| placeholder_count(row) <= allowed_stars)
            .collect();

        // Coercion looks at the original names, so it runs before the rename.
        let coerced: Vec<bool> = raw.headers.iter().map(|h| is_integer_column(h)).collect();

        let rows: Vec<Vec<Cell>> = kept
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&coerced)
                    .map(|(cell, &coerce)| {
                        if coerce {
                            Cell::Integer(cell.coerce_integer())
                        } else {
                            cell.clone()
                        }
                    })
                    .collect()
            })
            .collect();

        let columns = coerced
            .iter()
            .enumerate()
            .map(|(i, &coerced)| CleanColumn {
                name: format!("col_{}", i),
                coerced,
            })
            .collect();

        let stats = NormalizeStats {
            kept: rows.len(),
            dropped: raw.rows.len() - rows.len(),
            allowed_stars,
        };
        debug!(
            kept = stats.kept,
            dropped = stats.dropped,
            allowed_stars,
            "normalized table"
        );

        (CleanTable { columns, rows }, stats)
    }
}

fn placeholder_count(row: &[Cell]) -> usize {
    row.iter().map(Cell::placeholder_count).sum()
}

/// Columns named like an identifier or a year are stored as integers.
pub fn is_integer_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("id") || lower.contains("year")
}
