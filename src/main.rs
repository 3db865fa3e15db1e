use anyhow::{Context, Result};
use annual_ingest::{logging, Config, Pipeline, PipelineState};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "annual_ingest")]
#[command(about = "Append a yearly CSV file to a SQLite table, at most once per year")]
#[command(version)]
struct Cli {
    /// CSV file to ingest; its path must contain the year (e.g. data/ventas_2020.csv)
    file_path: PathBuf,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    let _guard = logging::init_logging(&config.log_dir);

    let pipeline = Pipeline::new(config);
    let report = pipeline
        .run(&cli.file_path)
        .with_context(|| format!("ingesting {}", cli.file_path.display()))?;

    match report.state {
        PipelineState::Skipped => {
            println!(
                "Data for year {} already exists in table '{}', nothing written.",
                report.year, report.table
            );
        }
        _ => {
            println!(
                "✅ Appended {} rows for year {} to '{}' ({} of {} dropped)",
                report.rows_written,
                report.year,
                report.table,
                report.rows_dropped,
                report.rows_loaded
            );
        }
    }
    Ok(())
}
