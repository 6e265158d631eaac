//! audiofeat: batch feature extraction for labeled real/fake speech corpora.
//!
//! Each audio file under a dataset root becomes one row of 26 aggregate
//! features (chroma, RMS, spectral centroid/bandwidth/rolloff, zero-crossing
//! rate and 20 MFCC means) plus its filename, optional split and label.
//! Files that cannot be decoded or analyzed are appended to a failure log
//! instead of aborting the batch.

pub mod audio;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod pipeline;

pub use audio::{extract_features, load_audio, AnalysisParams, AudioSample, FeatureVector};
pub use config::Settings;
pub use dataset::{Dataset, Label, Split};
pub use error::{PipelineError, Result};
pub use export::FeatureRow;
pub use pipeline::{run, PipelineResult};
