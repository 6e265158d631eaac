//! Per-dataset batch processing
//!
//! Every enumerated file ends as exactly one row or exactly one failure
//! record. Rows are handed to the sink in traversal order, also when files
//! are processed on the worker pool.

use crate::audio::{load_audio, FeatureExtractor};
use crate::dataset::{Dataset, DatasetEntry};
use crate::error::{FeatureError, PipelineError, Result};
use crate::export::{FeatureRow, RowSink};
use crossbeam_channel::{bounded, RecvTimeoutError};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::failure_log::FailureLog;

/// Files handed to the worker pool per job slot before results are merged.
const FILES_PER_JOB: usize = 16;

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Recognized audio extension, without the dot
    pub extension: String,
    /// Worker threads; 1 processes files sequentially on the calling thread
    pub jobs: usize,
    /// Per-file limit on load + extraction
    pub timeout: Option<Duration>,
    pub show_progress: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            extension: "wav".to_string(),
            jobs: 1,
            timeout: None,
            show_progress: true,
        }
    }
}

/// Result of processing one file.
#[derive(Debug)]
pub enum FileOutcome {
    Row(FeatureRow),
    Failed { path: PathBuf, error: FeatureError },
}

/// Counters for one dataset: `seen == written + failed`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub dataset: String,
    pub seen: usize,
    pub written: usize,
    pub failed: usize,
    /// Files filtered out by extension, never attempted
    pub skipped: usize,
    /// Failures that could not be appended to the failure log
    pub unlogged: usize,
    pub elapsed: Duration,
}

pub struct BatchRunner {
    extractor: Arc<FeatureExtractor>,
    options: RunnerOptions,
    pool: Option<rayon::ThreadPool>,
}

impl BatchRunner {
    pub fn new(extractor: Arc<FeatureExtractor>, options: RunnerOptions) -> Result<Self> {
        let pool = if options.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.jobs)
                .thread_name(|i| format!("audiofeat-worker-{}", i))
                .build()
                .map_err(|e| PipelineError::Config(format!("failed to build worker pool: {}", e)))?;
            log::debug!("Configured worker pool with {} threads", options.jobs);
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            extractor,
            options,
            pool,
        })
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Process every file of `dataset`, pushing rows into `sink` and
    /// failures into `failures`. Only sink errors abort the batch.
    pub fn run(
        &self,
        dataset: &Dataset,
        sink: &mut dyn RowSink,
        failures: &mut FailureLog,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let walker = dataset.walker(&self.options.extension);

        let counts = walker.count()?;
        for cell in &counts.cells {
            log::debug!("{} {}: {} files", dataset.name, cell.name(), cell.matched);
        }
        log::info!(
            "{}: {} files to process ({} ignored by extension)",
            dataset.name,
            counts.total(),
            counts.skipped()
        );

        let entries = walker.entries()?;
        let progress = self.progress_bar(counts.total().max(entries.len()));

        let mut report = BatchReport {
            dataset: dataset.name.clone(),
            skipped: counts.skipped(),
            ..Default::default()
        };

        match &self.pool {
            None => {
                for entry in &entries {
                    let outcome = self.process(entry);
                    self.settle(outcome, sink, failures, &mut report, &progress)?;
                }
            }
            Some(pool) => {
                let chunk_size = self.options.jobs * FILES_PER_JOB;
                for chunk in entries.chunks(chunk_size) {
                    let outcomes: Vec<FileOutcome> =
                        pool.install(|| chunk.par_iter().map(|entry| self.process(entry)).collect());
                    for outcome in outcomes {
                        self.settle(outcome, sink, failures, &mut report, &progress)?;
                    }
                }
            }
        }

        progress.finish_with_message("done");
        if report.unlogged > 0 {
            log::error!(
                "{}: {} failure(s) could not be written to {}",
                dataset.name,
                report.unlogged,
                failures.path().display()
            );
        }
        if self.options.timeout.is_some() {
            let live = live_timeout_workers();
            if live > 0 {
                log::debug!("{} timed-out worker(s) still winding down", live);
            }
        }
        report.elapsed = start.elapsed();

        let rate = if report.elapsed.as_secs_f64() > 0.0 {
            report.seen as f64 / report.elapsed.as_secs_f64()
        } else {
            0.0
        };
        log::info!(
            "{}: {} rows, {} failed, {} skipped in {:.2}s ({:.1} files/sec)",
            dataset.name,
            report.written,
            report.failed,
            report.skipped,
            report.elapsed.as_secs_f64(),
            rate
        );

        Ok(report)
    }

    /// Load and analyze one entry, honoring the per-file timeout.
    pub fn process(&self, entry: &DatasetEntry) -> FileOutcome {
        let result = match self.options.timeout {
            Some(limit) => process_with_timeout(entry, &self.extractor, limit),
            None => catch_unwind(AssertUnwindSafe(|| process_entry(entry, &self.extractor)))
                .unwrap_or_else(|panic| Err(FeatureError::Panicked(panic_message(panic)))),
        };

        match result {
            Ok(row) => FileOutcome::Row(row),
            Err(error) => FileOutcome::Failed {
                path: entry.path.clone(),
                error,
            },
        }
    }

    fn settle(
        &self,
        outcome: FileOutcome,
        sink: &mut dyn RowSink,
        failures: &mut FailureLog,
        report: &mut BatchReport,
        progress: &ProgressBar,
    ) -> Result<()> {
        report.seen += 1;
        match outcome {
            FileOutcome::Row(row) => {
                progress.set_message(row.filename.clone());
                sink.push(row)?;
                report.written += 1;
            }
            FileOutcome::Failed { path, error } => {
                log::warn!("Skipping {}: {}", path.display(), error);
                report.failed += 1;
                if let Err(e) = failures.record(&path, &error) {
                    log::error!("{}", e);
                    report.unlogged += 1;
                }
            }
        }
        progress.inc(1);
        Ok(())
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({per_sec}, {eta} remaining) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb
    }
}

/// Load + extract for one entry, no timeout.
pub fn process_entry(
    entry: &DatasetEntry,
    extractor: &FeatureExtractor,
) -> std::result::Result<FeatureRow, FeatureError> {
    process_entry_until(entry, extractor, &AtomicBool::new(false))
}

fn process_entry_until(
    entry: &DatasetEntry,
    extractor: &FeatureExtractor,
    cancel: &AtomicBool,
) -> std::result::Result<FeatureRow, FeatureError> {
    let audio = load_audio(&entry.path)?;
    let features = extractor.extract_until(&audio, cancel)?;
    Ok(FeatureRow::new(entry, features))
}

/// Per-file timeout threads that have not exited yet.
static LIVE_TIMEOUT_WORKERS: AtomicUsize = AtomicUsize::new(0);

pub fn live_timeout_workers() -> usize {
    LIVE_TIMEOUT_WORKERS.load(Ordering::SeqCst)
}

struct LiveWorker;

impl LiveWorker {
    fn enter() -> Self {
        LIVE_TIMEOUT_WORKERS.fetch_add(1, Ordering::SeqCst);
        LiveWorker
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        LIVE_TIMEOUT_WORKERS.fetch_sub(1, Ordering::SeqCst);
    }
}

fn process_with_timeout(
    entry: &DatasetEntry,
    extractor: &Arc<FeatureExtractor>,
    limit: Duration,
) -> std::result::Result<FeatureRow, FeatureError> {
    let (tx, rx) = bounded(1);
    let cancel = Arc::new(AtomicBool::new(false));
    let job_entry = entry.clone();
    let job_extractor = Arc::clone(extractor);
    let job_cancel = Arc::clone(&cancel);

    // A timed-out worker is told to stop at its next frame; its result is dropped.
    let live = LiveWorker::enter();
    let spawned = thread::Builder::new()
        .name("audiofeat-file".to_string())
        .spawn(move || {
            let _live = live;
            let _ = tx.send(process_entry_until(&job_entry, &job_extractor, &job_cancel));
        });
    if let Err(e) = spawned {
        return Err(FeatureError::Panicked(format!("failed to spawn worker: {}", e)));
    }

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            cancel.store(true, Ordering::Relaxed);
            Err(FeatureError::Timeout(limit.as_secs_f64()))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(FeatureError::Panicked("worker exited without a result".to_string()))
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
