use anyhow::Result;
use clap::Parser;

use audiofeat::cli::Cli;
use audiofeat::config::{self, Settings};
use audiofeat::pipeline;

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .format_timestamp_millis()
        .init();

    let config_path = config::find_config(cli.config.as_deref());
    let cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                Some(cfg)
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                None
            }
        },
        None => None,
    };

    let settings = Settings::resolve(&cli, cfg)?;

    if settings.datasets.is_empty() {
        anyhow::bail!("No dataset given; pass --for-norm and/or --in-the-wild");
    }
    for dataset in &settings.datasets {
        if !dataset.base.is_dir() {
            anyhow::bail!("Dataset directory not found: {}", dataset.base.display());
        }
    }

    if settings.count_only {
        for (dataset, counts) in pipeline::count(&settings)? {
            println!("{} ({})", dataset.name, dataset.base.display());
            for cell in &counts.cells {
                println!("  {:<20} {:>8}", cell.name(), cell.matched);
            }
            println!("  {:<20} {:>8}", "total", counts.total());
            if counts.skipped() > 0 {
                println!("  {:<20} {:>8}", "skipped", counts.skipped());
            }
        }
        return Ok(());
    }

    log::info!("audiofeat - audio feature extraction");
    log::info!("Output: {}", settings.output_dir.display());
    log::info!("Extension: .{}, jobs: {}", settings.extension, settings.jobs);

    let result = pipeline::run(&settings)?;

    for d in &result.datasets {
        match d.error {
            Some(ref e) => println!("{}: FAILED ({})", d.name, e),
            None => println!(
                "{}: {} files, {} written, {} failed, {} skipped -> {} ({:.1}s)",
                d.name, d.seen, d.written, d.failed, d.skipped, d.table, d.elapsed_secs
            ),
        }
    }
    if result.total_failed() > 0 {
        println!(
            "{} file(s) failed; see {}",
            result.total_failed(),
            settings.error_log.display()
        );
    }

    if result.total_unlogged() > 0 {
        println!(
            "{} failure(s) are missing from the failure log",
            result.total_unlogged()
        );
    }

    let failed = result.failed_datasets();
    if failed > 0 {
        anyhow::bail!("{} dataset table(s) could not be written", failed);
    }
    Ok(())
}
