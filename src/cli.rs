use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_OUTPUT: &str = "features";
pub const DEFAULT_EXTENSION: &str = "wav";
pub const DEFAULT_JOBS: usize = 1;

#[derive(Parser, Debug)]
#[command(
    name = "audiofeat",
    version,
    about = "Extract spectral, temporal and cepstral features from labeled audio corpora"
)]
pub struct Cli {
    /// Root of the split corpus (<root>/<training|validation|testing>/<fake|real>/)
    #[arg(long, value_name = "DIR")]
    pub for_norm: Option<PathBuf>,

    /// Root of the flat corpus (<root>/<fake|real>/)
    #[arg(long, value_name = "DIR")]
    pub in_the_wild: Option<PathBuf>,

    /// Directory for feature tables and the run summary
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Failure log path (default: <output>/error_log.txt)
    #[arg(long)]
    pub error_log: Option<PathBuf>,

    /// Audio file extension to process
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    pub extension: String,

    /// Worker threads (1 = sequential)
    #[arg(short, long, default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Per-file processing limit in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Count files per split/label and exit without extracting
    #[arg(long)]
    pub count_only: bool,

    /// Config file (default: auto-detect audiofeat.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors; hides the progress bar
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for these flags; `RUST_LOG` still takes precedence.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
