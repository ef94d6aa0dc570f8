use common::{now_millis, Library};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::{AppState, ScanState};

/// Kicks off a background scan for one library. Fails when a scan for the
/// same library is already running; scans of different libraries proceed
/// independently.
pub fn start_scan(state: AppState, library: Library, full: bool) -> Result<(), String> {
    let cancel = CancellationToken::new();
    {
        let mut scans = state.scans.write();
        if scans.is_running(&library.id) {
            return Err(format!("scan already running for '{}'", library.name));
        }
        scans.set(
            library.id.clone(),
            ScanState::Scanning {
                started: now_millis(),
                cancel: cancel.clone(),
            },
        );
    }

    let _ = state
        .activity
        .add_event("scan", format!("Scan started for '{}'.", library.name));

    tokio::spawn(async move {
        let result = state.catalog.scan(&library.id, full, cancel).await;
        let mut scans = state.scans.write();
        match result {
            Ok(summary) => {
                let _ = state.activity.add_event(
                    "scan",
                    format!(
                        "Scan finished for '{}': {} imported, {} updated, {} missing, {} reconciled, {} errors.",
                        library.name,
                        summary.tracks_imported,
                        summary.tracks_updated,
                        summary.tracks_missing,
                        summary.tracks_reconciled,
                        summary.errors.len(),
                    ),
                );
                scans.set(library.id.clone(), ScanState::Done(summary));
            }
            Err(err) => {
                warn!("scan failed for {}: {}", library.name, err);
                let _ = state.activity.add_event(
                    "scan",
                    format!("Scan failed for '{}': {}.", library.name, err),
                );
                scans.set(library.id.clone(), ScanState::Failed(err.to_string()));
            }
        }
    });
    Ok(())
}

/// Initial scans at startup, one per configured library.
pub fn start_initial_scans(state: &AppState) {
    let libraries = match state.catalog.libraries() {
        Ok(libraries) => libraries,
        Err(err) => {
            warn!("failed to list libraries: {}", err);
            return;
        }
    };
    for library in libraries {
        if !std::path::Path::new(&library.path).is_dir() {
            warn!(
                "library '{}' root not found at {}; skipping initial scan",
                library.name, library.path
            );
            continue;
        }
        if let Err(err) = start_scan(state.clone(), library, false) {
            info!("{}", err);
        }
    }
}

pub fn cancel_running_scans(state: &AppState) {
    state.scans.read().cancel_all();
}
