use csv::ReaderBuilder;
use std::path::Path;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::types::{Cell, RawTable};

/// Read a delimited file with a header row into a `RawTable`.
///
/// Rows whose field count differs from the header are rejected by the
/// reader and surface as `IngestError::Load`.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_table<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<RawTable> {
    let path = path.as_ref();
    let load_err = |source: csv::Error| IngestError::Load {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(load_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(load_err)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(load_err)?;
        rows.push(record.iter().map(Cell::infer).collect());
    }

    debug!(columns = headers.len(), rows = rows.len(), "loaded raw table");
    Ok(RawTable { headers, rows })
}
