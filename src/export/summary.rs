//! JSON run summary, for reconciling tables against the error log

use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub version: String,
    pub generator_version: String,
    pub error_log: String,
    pub datasets: Vec<DatasetSummary>,
}

/// Per-dataset accounting: `seen == written + failed`; `skipped` files were
/// filtered out by extension before processing. `unlogged` failures are
/// counted in `failed` but missing from the failure log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetSummary {
    pub name: String,
    pub table: String,
    pub seen: usize,
    pub written: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default)]
    pub unlogged: usize,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(error_log: &Path, datasets: Vec<DatasetSummary>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
            error_log: error_log.to_string_lossy().into_owned(),
            datasets,
        }
    }
}

/// Write the summary via temp file and rename.
pub fn write_summary(summary: &RunSummary, output_path: &Path) -> Result<(), ExportError> {
    let temp_path = output_path.with_extension("json.tmp");

    let file = File::create(&temp_path).map_err(|e| ExportError::write(output_path, e))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, summary).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        ExportError::write(output_path, e.into())
    })?;

    std::fs::rename(&temp_path, output_path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        ExportError::write(output_path, e)
    })?;

    log::info!("Wrote run summary to {}", output_path.display());
    Ok(())
}

pub fn read_summary(path: &Path) -> Option<RunSummary> {
    let file = File::open(path).ok()?;
    serde_json::from_reader(BufReader::new(file)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_summary.json");
        let summary = RunSummary::new(
            Path::new("error_log.txt"),
            vec![DatasetSummary {
                name: "for-norm".into(),
                table: "for_norm_features.csv".into(),
                seen: 3,
                written: 2,
                failed: 1,
                skipped: 0,
                unlogged: 0,
                elapsed_secs: 0.5,
                error: None,
            }],
        );
        write_summary(&summary, &path).unwrap();

        let back = read_summary(&path).unwrap();
        assert_eq!(back.version, "1.0");
        assert_eq!(back.datasets, summary.datasets);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("\"error\""));
        assert!(raw.contains("\"unlogged\": 0"));
    }

    #[test]
    fn summaries_without_unlogged_still_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_summary.json");
        std::fs::write(
            &path,
            r#"{"version":"1.0","generator_version":"0.1.0","error_log":"e.txt",
               "datasets":[{"name":"x","table":"x.csv","seen":1,"written":1,
               "failed":0,"skipped":0,"elapsed_secs":0.1}]}"#,
        )
        .unwrap();
        let back = read_summary(&path).unwrap();
        assert_eq!(back.datasets[0].unlogged, 0);
    }
}
