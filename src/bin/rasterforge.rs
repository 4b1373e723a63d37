use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context as _;
use clap::Parser;

use rasterforge::{Config, RunOptions, RunTracker, run_pipeline};

#[derive(Parser, Debug)]
#[command(name = "rasterforge", version)]
struct Cli {
    /// Root directory for input textures.
    #[arg(long, default_value = ".")]
    input: PathBuf,

    /// Output directory (defaults to <input>/out).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Generation config (defaults to <input>/rasterforge.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Incremental cache file (defaults to <output>/.cache).
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Re-encode everything, ignoring the previous cache.
    #[arg(long)]
    ignore_cache: bool,

    /// Do not write a cache file (stale outputs are still removed).
    #[arg(long)]
    no_output_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let output = cli.output.unwrap_or_else(|| cli.input.join("out"));
    let config_path = cli
        .config
        .unwrap_or_else(|| cli.input.join("rasterforge.json"));
    let options = RunOptions {
        cache_path: cli.cache.unwrap_or_else(|| output.join(".cache")),
        input_dir: cli.input,
        output_dir: output,
        ignore_cache: cli.ignore_cache,
        no_output_cache: cli.no_output_cache,
    };

    let text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("open config '{}'", config_path.display()))?;
    let config = Config::from_json(&text)?;
    println!("processing {} entries", config.entries.len());

    let tracker = Arc::new(RunTracker::default());
    let start = Instant::now();
    let summary = run_pipeline(config, &options, tracker.clone()).await;

    let reports = tracker.render();
    if !reports.is_empty() {
        print!("{reports}");
    }
    println!(
        "{} entries processed ({} written, {} skipped, {} failed) in {:.2?}",
        summary.processed,
        summary.written,
        summary.skipped,
        summary.failed,
        start.elapsed()
    );
    if summary.failed > 0 || tracker.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}
