//! Ingest pipeline metrics
//!
//! Counters are emitted through the `metrics` facade. The binary installs no
//! recorder, so they cost nothing unless an embedding application installs one.

/// Build a metric name following `ingest_{phase}_{name}_total`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("ingest_", $phase, "_", $name, "_total")
    };
}

pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_loaded(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "normalize", "rows_loaded")).increment(rows as u64);
    }

    pub fn record_dropped(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "normalize", "rows_dropped")).increment(rows as u64);
    }

    pub fn record_written(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "write", "rows_written")).increment(rows as u64);
    }

    pub fn record_done() {
        ::metrics::counter!(phase_metric!(counter, "run", "done")).increment(1);
    }

    pub fn record_skipped() {
        ::metrics::counter!(phase_metric!(counter, "run", "skipped")).increment(1);
    }

    pub fn record_failed() {
        ::metrics::counter!(phase_metric!(counter, "run", "failed")).increment(1);
    }
}
