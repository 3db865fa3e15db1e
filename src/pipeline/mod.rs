// Ingestion pipeline: parse → gate → normalize → write

pub mod ingestion;
pub mod processing;
pub mod year;

use std::cell::Cell;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::Result;
use crate::metrics::IngestMetrics;
use crate::storage::SqliteStore;
use crate::types::Year;
use ingestion::loader::load_table;
use processing::normalize::Normalizer;

/// Where a run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Parsing,
    Gating,
    Normalizing,
    Writing,
    /// Rows were appended and committed.
    Done,
    /// The year was already persisted; nothing was written.
    Skipped,
    /// A step returned an error; nothing was committed by this run.
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Skipped | PipelineState::Failed
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Parsing => "PARSING",
            PipelineState::Gating => "GATING",
            PipelineState::Normalizing => "NORMALIZING",
            PipelineState::Writing => "WRITING",
            PipelineState::Done => "DONE",
            PipelineState::Skipped => "SKIPPED",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub year: Year,
    pub table: String,
    /// `Done` or `Skipped`
    pub state: PipelineState,
    pub rows_loaded: usize,
    pub rows_dropped: usize,
    pub rows_written: usize,
}

/// Runs one file through the ingestion steps against the configured database.
pub struct Pipeline {
    config: Config,
    last_state: Cell<Option<PipelineState>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            last_state: Cell::new(None),
        }
    }

    /// Terminal state of the most recent `run`: `Done`, `Skipped` or `Failed`.
    pub fn last_state(&self) -> Option<PipelineState> {
        self.last_state.get()
    }

    /// Ingest `input` once. The year comes from the path itself; when the
    /// table already holds rows for that year the run is `Skipped`.
    ///
    /// The database is only opened after a year has been found, and the
    /// connection is released before this returns, whatever the outcome.
    #[tracing::instrument(level = "info", skip(self, input), fields(input = %input.as_ref().display(), table = %self.config.table))]
    pub fn run<P: AsRef<Path>>(&self, input: P) -> Result<PipelineReport> {
        let mut state = PipelineState::Parsing;
        let result = self.execute(input.as_ref(), &mut state);
        if let Err(e) = &result {
            error!(failed_in = %state, error = %e, "pipeline failed");
            IngestMetrics::record_failed();
            advance(&mut state, PipelineState::Failed);
        }
        self.last_state.set(Some(state));
        result
    }

    fn execute(&self, input: &Path, state: &mut PipelineState) -> Result<PipelineReport> {
        let table = self.config.table.as_str();

        let year = year::extract_year(&input.to_string_lossy())?;
        info!(%year, "extracted year");
        advance(state, PipelineState::Gating);

        let mut store = SqliteStore::open(&self.config.database_path, self.config.busy_timeout())?;
        // Gate and append share one write-locked transaction
        let tx = store.begin(table)?;
        if tx.year_exists(year)? {
            tx.rollback()?;
            advance(state, PipelineState::Skipped);
            info!(%year, "data for year already present, skipping");
            IngestMetrics::record_skipped();
            return Ok(PipelineReport {
                year,
                table: table.to_string(),
                state: *state,
                rows_loaded: 0,
                rows_dropped: 0,
                rows_written: 0,
            });
        }
        advance(state, PipelineState::Normalizing);

        let raw = load_table(input, self.config.delimiter_byte())?;
        let (clean, stats) = Normalizer::new(self.config.threshold).normalize(&raw);
        IngestMetrics::record_loaded(raw.rows.len());
        IngestMetrics::record_dropped(stats.dropped);
        info!(
            rows = raw.rows.len(),
            kept = stats.kept,
            dropped = stats.dropped,
            allowed_stars = stats.allowed_stars,
            "normalized input"
        );
        advance(state, PipelineState::Writing);

        let rows_written = tx.append(year, &clean)?;
        tx.commit()?;
        IngestMetrics::record_written(rows_written);
        IngestMetrics::record_done();
        advance(state, PipelineState::Done);
        info!(%year, rows_written, "data appended");

        Ok(PipelineReport {
            year,
            table: table.to_string(),
            state: *state,
            rows_loaded: raw.rows.len(),
            rows_dropped: stats.dropped,
            rows_written,
        })
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug_assert!(!state.is_terminal(), "no transition out of {}", state);
    debug!(from = %state, to = %next, "pipeline transition");
    *state = next;
}
