use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use blogroll::config::Config;
use blogroll::pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "blogroll",
    version,
    about = "Resolve feed URLs for a curated blog list and write OPML + JSON"
)]
struct Args {
    /// Config file (TOML); optional, defaults apply when missing
    #[arg(long, value_name = "FILE", default_value = "blogroll.toml")]
    config: PathBuf,

    /// Source document with `* <name> <url>` lines (overrides `source`)
    #[arg(long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Directory for the OPML and JSON outputs (keeps their file names)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(dir) = &args.output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        config = config.with_output_dir(dir);
    }

    let summary = pipeline::run(&config).await?;

    tracing::info!(
        resolved = summary.resolved.len(),
        unresolved = summary.unresolved.len(),
        cache_hits = summary.cache_hits,
        looked_up = summary.looked_up,
        excluded = summary.excluded,
        duplicates = summary.duplicates,
        "Run complete"
    );
    Ok(())
}
