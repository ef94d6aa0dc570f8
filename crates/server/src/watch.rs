use std::path::PathBuf;
use std::time::Duration;

use common::Library;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::scan::start_scan;
use crate::state::AppState;

/// Watches every configured library root and debounces change bursts into
/// incremental scans.
pub fn configure_watchers(state: &AppState) {
    let config = state.config.read().clone();
    if !config.watch_music {
        info!("watcher disabled (watch_music=false)");
        state.watchers.write().clear();
        return;
    }

    let debounce_secs = if config.watch_debounce_secs == 0 {
        2
    } else {
        config.watch_debounce_secs
    };
    let debounce = Duration::from_secs(debounce_secs);

    let libraries = match state.catalog.libraries() {
        Ok(libraries) => libraries,
        Err(err) => {
            warn!("failed to list libraries for watching: {}", err);
            return;
        }
    };

    let mut watchers = Vec::new();
    for library in libraries {
        let root = PathBuf::from(&library.path);
        if !root.is_dir() {
            continue;
        }
        match setup_watcher(state.clone(), library.clone(), root.clone(), debounce) {
            Ok(watcher) => {
                info!(
                    "watching {} for changes (debounce {}s)",
                    root.display(),
                    debounce.as_secs()
                );
                watchers.push(watcher);
            }
            Err(err) => {
                warn!("failed to start watcher for {}: {}", library.name, err);
            }
        }
    }
    *state.watchers.write() = watchers;
}

fn setup_watcher(
    state: AppState,
    library: Library,
    root: PathBuf,
    debounce: Duration,
) -> Result<RecommendedWatcher, Box<dyn std::error::Error>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    tokio::spawn(async move {
        watch_loop(state, library, rx, debounce).await;
    });

    Ok(watcher)
}

async fn watch_loop(
    state: AppState,
    library: Library,
    mut rx: UnboundedReceiver<Event>,
    debounce: Duration,
) {
    loop {
        let event = match rx.recv().await {
            Some(event) => event,
            None => break,
        };
        if !is_relevant_event(&event) {
            continue;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {
                    let _ = state
                        .activity
                        .add_event("scan", format!("Auto-scan started for '{}'.", library.name));
                    if let Err(err) = start_scan(state.clone(), library.clone(), false) {
                        info!("auto-scan skipped: {}", err);
                    }
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(event) = maybe_event {
                        if !is_relevant_event(&event) {
                            continue;
                        }
                    } else {
                        return;
                    }
                }
            }
        }
    }
}

fn is_relevant_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
