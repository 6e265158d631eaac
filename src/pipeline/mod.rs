//! Pipeline orchestration
//!
//! Opens the failure log once, then runs each configured dataset through
//! the batch runner into its own streamed table.

pub mod failure_log;
pub mod runner;

pub use failure_log::{read_records, FailureLog, FailureRecord};
pub use runner::{process_entry, BatchReport, BatchRunner, FileOutcome, RunnerOptions};

use crate::audio::FeatureExtractor;
use crate::config::Settings;
use crate::dataset::{Dataset, DatasetCounts};
use crate::error::{ExportError, PipelineError, Result};
use crate::export::{write_summary, CsvTableWriter, DatasetSummary, RunSummary};
use std::sync::Arc;

/// File name of the JSON run summary inside the output directory.
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Outcome of a whole run.
#[derive(Debug)]
pub struct PipelineResult {
    pub datasets: Vec<DatasetSummary>,
}

impl PipelineResult {
    pub fn failed_datasets(&self) -> usize {
        self.datasets
            .iter()
            .filter(|d| d.error.is_some())
            .count()
    }

    pub fn total_failed(&self) -> usize {
        self.datasets.iter().map(|d| d.failed).sum()
    }

    pub fn total_unlogged(&self) -> usize {
        self.datasets.iter().map(|d| d.unlogged).sum()
    }
}

/// Extract features for every configured dataset.
///
/// A dataset whose table cannot be written is reported in the result and
/// the run moves on to the next dataset.
pub fn run(settings: &Settings) -> Result<PipelineResult> {
    std::fs::create_dir_all(&settings.output_dir).map_err(|source| ExportError::CreateDir {
        path: settings.output_dir.clone(),
        source,
    })?;

    let extractor = FeatureExtractor::new(settings.analysis.clone())
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    let runner = BatchRunner::new(Arc::new(extractor), settings.runner_options())?;

    let mut failures = FailureLog::open(&settings.error_log)?;
    log::info!("Logging failures to {}", failures.path().display());

    let mut summaries = Vec::with_capacity(settings.datasets.len());
    for dataset in &settings.datasets {
        let summary = match run_dataset(&runner, dataset, settings, &mut failures) {
            Ok(report) => DatasetSummary {
                name: dataset.name.clone(),
                table: settings.table_path(dataset).to_string_lossy().into_owned(),
                seen: report.seen,
                written: report.written,
                failed: report.failed,
                skipped: report.skipped,
                unlogged: report.unlogged,
                elapsed_secs: report.elapsed.as_secs_f64(),
                error: None,
            },
            Err(e) => {
                log::error!("{}: {}", dataset.name, e);
                DatasetSummary {
                    name: dataset.name.clone(),
                    table: settings.table_path(dataset).to_string_lossy().into_owned(),
                    seen: 0,
                    written: 0,
                    failed: 0,
                    skipped: 0,
                    unlogged: 0,
                    elapsed_secs: 0.0,
                    error: Some(e.to_string()),
                }
            }
        };
        summaries.push(summary);
    }

    let summary = RunSummary::new(failures.path(), summaries);
    if let Err(e) = write_summary(&summary, &settings.output_dir.join(SUMMARY_FILE)) {
        log::warn!("{}", e);
    }

    Ok(PipelineResult {
        datasets: summary.datasets,
    })
}

fn run_dataset(
    runner: &BatchRunner,
    dataset: &Dataset,
    settings: &Settings,
    failures: &mut FailureLog,
) -> Result<BatchReport> {
    let table_path = settings.table_path(dataset);
    let mut table = CsvTableWriter::create(&table_path, dataset.has_split())?;
    let report = runner.run(dataset, &mut table, failures)?;
    table.finish()?;
    Ok(report)
}

/// Count files per split/label without extracting anything.
pub fn count(settings: &Settings) -> Result<Vec<(Dataset, DatasetCounts)>> {
    settings
        .datasets
        .iter()
        .map(|d| Ok((d.clone(), d.walker(&settings.extension).count()?)))
        .collect()
}
