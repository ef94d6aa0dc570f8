use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use library::{Catalog, ScanOptions};
use metadata::{ExtractorRegistry, LoftyReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let music_root = args
        .next()
        .or_else(|| env::var("MUSIC_ROOT").ok())
        .ok_or("MUSIC_ROOT not set and no path argument")?;
    let index_path = args
        .next()
        .or_else(|| env::var("INDEX_PATH").ok())
        .unwrap_or_else(|| "data/library.redb".to_string());
    let full = args.next().map(|value| value == "--full").unwrap_or(false);

    let extractors = ExtractorRegistry::with_default(Arc::new(LoftyReader));
    let catalog = Catalog::open(
        Path::new(&index_path),
        extractors,
        ScanOptions::default(),
    )?;
    let library = catalog.ensure_library(
        "Music",
        &PathBuf::from(&music_root).to_string_lossy(),
    )?;

    let summary = catalog
        .scan(&library.id, full, CancellationToken::new())
        .await?;

    println!(
        "Scanned {} folders: {} imported, {} updated, {} missing, {} reconciled, {} errors",
        summary.folders_scanned,
        summary.tracks_imported,
        summary.tracks_updated,
        summary.tracks_missing,
        summary.tracks_reconciled,
        summary.errors.len()
    );
    for error in &summary.errors {
        eprintln!("  {}: {}", error.path, error.message);
    }

    Ok(())
}
