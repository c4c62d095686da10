//! disktree — disk usage explorer.
//!
//! Thin binary entry point. Scans one directory level and prints it as CSV
//! on stdout; all logic lives in the `disktree-core` crate.

use anyhow::{bail, Context};
use disktree_core::{export, Aggregator, ScanConfig, SortMode};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on how long the headless run waits for a scan.
const SCAN_TIMEOUT: Duration = Duration::from_secs(60 * 60);

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean CSV.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let target = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let target = std::path::absolute(&target)
        .with_context(|| format!("cannot resolve {}", target.display()))?;

    let config = ScanConfig::from_env();
    tracing::info!(
        "disktree starting: {} ({} workers)",
        target.display(),
        config.workers
    );

    let mut aggregator = Aggregator::new(&config).context("failed to start scanner")?;
    aggregator.open(target.clone());
    if !aggregator.wait_until_loaded(SCAN_TIMEOUT) {
        bail!("timed out scanning {}", target.display());
    }
    tracing::info!("{}", aggregator.status());

    let stdout = std::io::stdout();
    export::write_csv(&aggregator.snapshot(), SortMode::Size, stdout.lock())
        .context("failed to write CSV")?;

    aggregator.shutdown();
    Ok(())
}
