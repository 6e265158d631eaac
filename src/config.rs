use crate::audio::{AnalysisParams, N_MFCC};
use crate::cli::{Cli, DEFAULT_EXTENSION, DEFAULT_JOBS, DEFAULT_OUTPUT};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::pipeline::RunnerOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "audiofeat.toml";
pub const ERROR_LOG_FILE: &str = "error_log.txt";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub error_log: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,
    #[serde(default = "default_n_mfcc")]
    pub n_mfcc: usize,
    #[serde(default = "default_n_chroma")]
    pub n_chroma: usize,
    #[serde(default = "default_rolloff_percent")]
    pub rolloff_percent: f64,
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DatasetsConfig {
    #[serde(default)]
    pub for_norm: Option<PathBuf>,
    #[serde(default)]
    pub in_the_wild: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            error_log: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_fft: default_n_fft(),
            hop_length: default_hop_length(),
            n_mels: default_n_mels(),
            n_mfcc: default_n_mfcc(),
            n_chroma: default_n_chroma(),
            rolloff_percent: default_rolloff_percent(),
            extension: default_extension(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            timeout_secs: None,
        }
    }
}

impl AnalysisConfig {
    fn to_params(&self) -> Result<AnalysisParams> {
        if self.n_mfcc != N_MFCC {
            return Err(PipelineError::Config(format!(
                "n_mfcc is fixed at {} by the table layout, got {}",
                N_MFCC, self.n_mfcc
            )));
        }
        let params = AnalysisParams {
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            n_mels: self.n_mels,
            n_chroma: self.n_chroma,
            rolloff_percent: self.rolloff_percent,
        };
        params
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(params)
    }
}

fn default_output_dir() -> PathBuf { PathBuf::from(DEFAULT_OUTPUT) }
fn default_n_fft() -> usize { 2048 }
fn default_hop_length() -> usize { 512 }
fn default_n_mels() -> usize { 128 }
fn default_n_mfcc() -> usize { N_MFCC }
fn default_n_chroma() -> usize { 12 }
fn default_rolloff_percent() -> f64 { 0.85 }
fn default_extension() -> String { DEFAULT_EXTENSION.into() }
fn default_jobs() -> usize { DEFAULT_JOBS }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("{}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit path, or the first of `audiofeat.toml` in the working directory,
/// `~/.config/audiofeat/config.toml` and the platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("audiofeat").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("audiofeat").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Fully resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub error_log: PathBuf,
    pub datasets: Vec<Dataset>,
    pub analysis: AnalysisParams,
    pub extension: String,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub show_progress: bool,
    pub count_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let output_dir = PathBuf::from(DEFAULT_OUTPUT);
        Self {
            error_log: output_dir.join(ERROR_LOG_FILE),
            output_dir,
            datasets: Vec::new(),
            analysis: AnalysisParams::default(),
            extension: DEFAULT_EXTENSION.to_string(),
            jobs: DEFAULT_JOBS,
            timeout: None,
            show_progress: true,
            count_only: false,
        }
    }
}

impl Settings {
    /// Merge CLI flags over a config file. Config values apply only where the
    /// CLI is at its default.
    pub fn resolve(cli: &Cli, config: Option<Config>) -> Result<Self> {
        let cfg = config.unwrap_or_default();

        let output_dir = if cli.output == Path::new(DEFAULT_OUTPUT) {
            cfg.output.dir
        } else {
            cli.output.clone()
        };
        let error_log = cli
            .error_log
            .clone()
            .or(cfg.output.error_log)
            .unwrap_or_else(|| output_dir.join(ERROR_LOG_FILE));

        let extension = if cli.extension == DEFAULT_EXTENSION {
            cfg.analysis.extension.clone()
        } else {
            cli.extension.clone()
        };
        let extension = extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(PipelineError::Config("extension must not be empty".into()));
        }

        let jobs = if cli.jobs == DEFAULT_JOBS {
            cfg.runtime.jobs
        } else {
            cli.jobs
        };
        if jobs == 0 {
            return Err(PipelineError::Config("jobs must be at least 1".into()));
        }

        let timeout = match cli.timeout.or(cfg.runtime.timeout_secs) {
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
            Some(secs) => {
                return Err(PipelineError::Config(format!(
                    "timeout must be a positive number of seconds, got {}",
                    secs
                )))
            }
            None => None,
        };

        let mut datasets = Vec::new();
        if let Some(base) = cli.for_norm.clone().or(cfg.datasets.for_norm) {
            datasets.push(Dataset::for_norm(base));
        }
        if let Some(base) = cli.in_the_wild.clone().or(cfg.datasets.in_the_wild) {
            datasets.push(Dataset::in_the_wild(base));
        }

        Ok(Self {
            output_dir,
            error_log,
            datasets,
            analysis: cfg.analysis.to_params()?,
            extension,
            jobs,
            timeout,
            show_progress: !cli.quiet,
            count_only: cli.count_only,
        })
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            extension: self.extension.clone(),
            jobs: self.jobs,
            timeout: self.timeout,
            show_progress: self.show_progress,
        }
    }

    /// Where a dataset's feature table is written.
    pub fn table_path(&self, dataset: &Dataset) -> PathBuf {
        self.output_dir.join(&dataset.output_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("audiofeat").chain(args.iter().copied()))
    }

    #[test]
    fn cli_only() {
        let s = Settings::resolve(&cli(&["--for-norm", "a", "--in-the-wild", "b"]), None).unwrap();
        assert_eq!(s.output_dir, PathBuf::from("features"));
        assert_eq!(s.error_log, PathBuf::from("features/error_log.txt"));
        assert_eq!(s.datasets.len(), 2);
        assert_eq!(s.datasets[0].name, "for-norm");
        assert_eq!(
            s.table_path(&s.datasets[1]),
            PathBuf::from("features/release_in_wild_features.csv")
        );
        assert_eq!(s.analysis, AnalysisParams::default());
    }

    #[test]
    fn config_fills_defaults_but_not_explicit_flags() {
        let cfg: Config = toml::from_str(
            r#"
            [output]
            dir = "out"

            [runtime]
            jobs = 4
            timeout_secs = 30.0

            [datasets]
            in_the_wild = "/data/itw"

            [analysis]
            extension = ".flac"
            hop_length = 256
            "#,
        )
        .unwrap();
        let s = Settings::resolve(&cli(&["--jobs", "2"]), Some(cfg)).unwrap();
        assert_eq!(s.output_dir, PathBuf::from("out"));
        assert_eq!(s.error_log, PathBuf::from("out/error_log.txt"));
        assert_eq!(s.jobs, 2);
        assert_eq!(s.timeout, Some(Duration::from_secs(30)));
        assert_eq!(s.extension, "flac");
        assert_eq!(s.analysis.hop_length, 256);
        assert_eq!(s.datasets, vec![Dataset::in_the_wild("/data/itw")]);
    }

    #[test]
    fn rejects_other_mfcc_counts() {
        let cfg: Config = toml::from_str("[analysis]\nn_mfcc = 13\n").unwrap();
        let err = Settings::resolve(&cli(&[]), Some(cfg)).unwrap_err();
        assert!(err.to_string().contains("n_mfcc"));
    }

    #[test]
    fn rejects_bad_runtime_values() {
        assert!(Settings::resolve(&cli(&["--jobs", "0"]), None).is_err());
        assert!(Settings::resolve(&cli(&["--timeout", "0"]), None).is_err());
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audiofeat.toml");
        std::fs::write(&path, "[runtime\njobs = ").unwrap();
        assert!(load_config(&path).is_none());
        assert_eq!(find_config(Some(&path)), Some(path.clone()));
    }
}
