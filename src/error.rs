//! Error types for the extraction pipeline.
//!
//! Per-file errors (`LoadError`, `ExtractionError`) are caught at the file
//! boundary, written to the failure log and never abort a batch. `ExportError`
//! is fatal to the dataset being written.

use std::path::PathBuf;
use thiserror::Error;

/// The audio file could not be turned into a sample buffer.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct LoadError {
    pub path: PathBuf,
    pub reason: String,
}

impl LoadError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Feature computation failed or produced undefined values.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("empty waveform")]
    EmptySignal,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("waveform contains non-finite sample at index {0}")]
    NonFiniteInput(usize),

    #[error("feature '{name}' is not finite ({value})")]
    NonFiniteFeature { name: &'static str, value: f64 },

    #[error("invalid analysis parameters: {0}")]
    InvalidParams(String),

    #[error("extraction cancelled")]
    Cancelled,
}

/// Everything that can go wrong for a single file.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("processing timed out after {0:.1}s")]
    Timeout(f64),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Writing a feature table failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Write {
            path: path.into(),
            source,
        }
    }
}

/// The failure log itself could not be opened or appended to.
#[derive(Debug, Error)]
#[error("failure log '{path}': {source}")]
pub struct FailureLogError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Fatal problems that stop a whole dataset.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    FailureLog(#[from] FailureLogError),

    #[error("cannot read dataset directory '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_displays_original_message() {
        let err = FeatureError::from(LoadError::new("/data/a.wav", "unexpected end of file"));
        assert_eq!(err.to_string(), "unexpected end of file");
    }

    #[test]
    fn extraction_error_names_the_feature() {
        let err = FeatureError::from(ExtractionError::NonFiniteFeature {
            name: "rms",
            value: f64::NAN,
        });
        assert_eq!(err.to_string(), "feature 'rms' is not finite (NaN)");
    }
}
