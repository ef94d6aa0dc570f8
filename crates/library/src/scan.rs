use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::{
    folder_id, join_relpath, now_millis, parent_path, path_join, relpath_from, Folder, Library,
    MediaFile,
};
use metadata::{map_media_file, TagReader};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::diff::diff_folder;
use crate::reconcile;
use crate::store::{StoreError, SyncStore};
use crate::walker::{walk_library, FolderUnit};
use crate::CatalogError;

/// Batch size for tag extraction, bounding extractor memory per folder unit.
pub const FILES_BATCH_SIZE: usize = 100;

#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Concurrent folder units.
    pub workers: usize,
    pub batch_size: usize,
    /// Deadline for one extraction batch; a stuck extractor fails its folder,
    /// not the scan.
    pub batch_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: FILES_BATCH_SIZE,
            batch_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FolderError {
    pub path: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanSummary {
    pub library_id: String,
    pub started_at: u64,
    pub full: bool,
    pub cancelled: bool,
    pub folders_scanned: usize,
    pub folders_unchanged: usize,
    pub tracks_imported: usize,
    pub tracks_updated: usize,
    pub tracks_unchanged: usize,
    pub tracks_missing: usize,
    pub tracks_reconciled: usize,
    pub errors: Vec<FolderError>,
}

pub(crate) struct Scanner {
    pub store: Arc<dyn SyncStore>,
    pub reader: Arc<dyn TagReader>,
    pub options: ScanOptions,
}

#[derive(Debug, Default)]
struct FolderOutcome {
    path: String,
    created: usize,
    updated: usize,
    unchanged: usize,
    missing: usize,
    skipped: bool,
    album_ids: Vec<String>,
    errors: Vec<FolderError>,
}

impl FolderOutcome {
    fn new(path: String) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

impl Scanner {
    /// Runs one scan of `library`. The walk fans folder units out over a
    /// bounded worker pool; the reconciliation pass runs strictly after every
    /// unit has finished.
    pub async fn scan(
        &self,
        library: &Library,
        full: bool,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, CatalogError> {
        let started_at = now_millis();
        let root = PathBuf::from(&library.path);
        if !root.is_dir() {
            return Err(CatalogError::RootMissing(library.path.clone()));
        }

        // Recorded before the walk so anything created from here on is
        // recognizable as new-since-this-scan by the reconciliation pass.
        {
            let store = Arc::clone(&self.store);
            let library_id = library.id.clone();
            run_blocking(move || store.record_scan_start(&library_id, started_at)).await?;
        }

        info!(library = %library.name, full, "library scan started");

        let walk = {
            let root = root.clone();
            tokio::task::spawn_blocking(move || walk_library(&root))
                .await
                .map_err(|err| CatalogError::Task(err.to_string()))?
        };

        let mut summary = ScanSummary {
            library_id: library.id.clone(),
            started_at,
            full,
            ..ScanSummary::default()
        };
        for (path, message) in walk.errors {
            summary.errors.push(FolderError { path, message });
        }

        let observed: HashSet<String> = walk
            .units
            .iter()
            .map(|unit| folder_id(&library.id, &unit.path))
            .collect();

        // Folders whose subtree holds at least one audio file (or a file we
        // could not stat). Everything else is musically empty and gets the
        // missing flag even though the directory still exists.
        let mut has_audio: HashSet<String> = HashSet::new();
        for unit in &walk.units {
            if unit.files.is_empty() && unit.file_errors.is_empty() {
                continue;
            }
            let mut path = unit.path.clone();
            loop {
                if !has_audio.insert(path.clone()) {
                    break;
                }
                match parent_path(&path) {
                    Some(parent) => path = parent,
                    None => break,
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut join_set = JoinSet::new();
        for unit in walk.units {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let reader = Arc::clone(&self.reader);
            let options = self.options.clone();
            let context = UnitContext {
                store,
                reader,
                options,
                library: library.clone(),
                root: root.clone(),
                full,
                has_audio: has_audio.contains(&unit.path),
            };
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let mut outcome = FolderOutcome::new(unit.path.clone());
                        outcome.skipped = true;
                        return outcome;
                    }
                };
                if cancel.is_cancelled() {
                    let mut outcome = FolderOutcome::new(unit.path.clone());
                    outcome.skipped = true;
                    return outcome;
                }
                process_unit(context, unit).await
            });
        }

        let mut touched_albums: BTreeSet<String> = BTreeSet::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    debug!(
                        folder = %outcome.path,
                        skipped = outcome.skipped,
                        imported = outcome.created,
                        "folder unit finished"
                    );
                    if outcome.skipped {
                        summary.folders_unchanged += 1;
                    } else {
                        summary.folders_scanned += 1;
                    }
                    summary.tracks_imported += outcome.created;
                    summary.tracks_updated += outcome.updated;
                    summary.tracks_unchanged += outcome.unchanged;
                    summary.tracks_missing += outcome.missing;
                    touched_albums.extend(outcome.album_ids);
                    summary.errors.extend(outcome.errors);
                }
                Err(err) => summary.errors.push(FolderError {
                    path: String::new(),
                    message: format!("folder task failed: {}", err),
                }),
            }
        }
        if cancel.is_cancelled() {
            summary.cancelled = true;
        }

        if !summary.cancelled {
            // Folders present in the DB but gone from disk, together with
            // everything inside them.
            let (gone_tracks, gone_albums) = {
                let store = Arc::clone(&self.store);
                let library_id = library.id.clone();
                run_blocking(move || {
                    let folders = store.folders_in_library(&library_id)?;
                    let gone: Vec<String> = folders
                        .into_iter()
                        .filter(|folder| !folder.missing && !observed.contains(&folder.id))
                        .map(|folder| folder.id)
                        .collect();
                    if gone.is_empty() {
                        return Ok((0, Vec::new()));
                    }
                    store.mark_folders_missing(&gone, true)?;
                    store.mark_folder_tracks_missing(&gone)
                })
                .await?
            };
            summary.tracks_missing += gone_tracks;
            touched_albums.extend(gone_albums);

            // Reconciliation barrier: needs the complete picture of missing
            // and newly created tracks.
            let (reconciled, albums) = {
                let store = Arc::clone(&self.store);
                let library_id = library.id.clone();
                run_blocking(move || {
                    reconcile::reconcile_library(store.as_ref(), &library_id, started_at)
                })
                .await?
            };
            summary.tracks_reconciled = reconciled;
            touched_albums.extend(albums);

            {
                let store = Arc::clone(&self.store);
                run_blocking(move || aggregate::rebuild(store.as_ref(), &touched_albums)).await?;
            }
        }

        info!(
            library = %library.name,
            folders = summary.folders_scanned,
            imported = summary.tracks_imported,
            updated = summary.tracks_updated,
            missing = summary.tracks_missing,
            reconciled = summary.tracks_reconciled,
            errors = summary.errors.len(),
            cancelled = summary.cancelled,
            "library scan finished"
        );
        Ok(summary)
    }
}

/// Everything a folder unit needs, owned for the unit's lifetime so sibling
/// units share nothing but the store.
struct UnitContext {
    store: Arc<dyn SyncStore>,
    reader: Arc<dyn TagReader>,
    options: ScanOptions,
    library: Library,
    root: PathBuf,
    full: bool,
    has_audio: bool,
}

/// One folder unit through its ordered stages: snapshot, diff, extract+map,
/// persist.
async fn process_unit(ctx: UnitContext, unit: FolderUnit) -> FolderOutcome {
    let UnitContext {
        store,
        reader,
        options,
        library,
        root,
        full,
        has_audio,
    } = ctx;
    let folder_id = folder_id(&library.id, &unit.path);
    let mut outcome = FolderOutcome::new(unit.path.clone());
    for (name, message) in &unit.file_errors {
        outcome.errors.push(FolderError {
            path: path_join(&unit.path, name),
            message: message.clone(),
        });
    }

    let snapshot = {
        let store = Arc::clone(&store);
        let folder_id = folder_id.clone();
        run_blocking(move || {
            Ok::<_, StoreError>((store.get_folder(&folder_id)?, store.tracks_in_folder(&folder_id)?))
        })
        .await
    };
    let (existing_folder, snapshot_tracks) = match snapshot {
        Ok(value) => value,
        Err(err) => {
            outcome.errors.push(FolderError {
                path: unit.path.clone(),
                message: err.to_string(),
            });
            return outcome;
        }
    };

    let diff = diff_folder(
        &unit.path,
        &unit.files,
        &unit.file_errors,
        &snapshot_tracks,
        full,
    );
    outcome.unchanged = diff.unchanged.len();

    // Unchanged folders cost one snapshot read and nothing else.
    let folder_row_current = existing_folder
        .as_ref()
        .map(|folder| folder.missing == !has_audio && folder.name == unit.name)
        .unwrap_or(false);
    if diff.is_empty() && folder_row_current {
        outcome.skipped = true;
        return outcome;
    }

    let mut imported: Vec<MediaFile> = Vec::new();
    for chunk in diff.to_import.chunks(options.batch_size.max(1)) {
        let paths: Vec<PathBuf> = chunk
            .iter()
            .map(|name| join_relpath(&root, &path_join(&unit.path, name)))
            .collect();
        let batch = {
            let reader = Arc::clone(&reader);
            timeout(
                options.batch_timeout,
                tokio::task::spawn_blocking(move || reader.read_batch(&paths)),
            )
            .await
        };
        let results = match batch {
            Err(_) => {
                // Folder-level extraction failure: previous rows are retained
                // untouched rather than partially overwritten.
                outcome.errors.push(FolderError {
                    path: unit.path.clone(),
                    message: format!(
                        "tag extraction timed out after {}s",
                        options.batch_timeout.as_secs()
                    ),
                });
                return outcome;
            }
            Ok(Err(err)) => {
                outcome.errors.push(FolderError {
                    path: unit.path.clone(),
                    message: format!("tag extraction failed: {}", err),
                });
                return outcome;
            }
            Ok(Ok(results)) => results,
        };
        for (path, result) in results {
            let rel = relpath_from(&root, &path).unwrap_or_default();
            match result {
                Ok(raw) => imported.push(map_media_file(&library.id, &folder_id, &rel, &raw)),
                Err(err) => {
                    warn!("tag extraction failed for {:?}: {}", rel, err);
                    outcome.errors.push(FolderError {
                        path: rel,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    let folder_row = Folder {
        id: folder_id.clone(),
        library_id: library.id.clone(),
        path: unit.path.clone(),
        name: unit.name.clone(),
        parent_id: parent_path(&unit.path).map(|parent| common::folder_id(&library.id, &parent)),
        missing: !has_audio,
        created_at: 0,
        updated_at: 0,
    };
    let missing_ids: Vec<String> = diff.missing.iter().map(|row| row.id.clone()).collect();
    let commit = {
        let store = Arc::clone(&store);
        run_blocking(move || store.commit_folder(&folder_row, &imported, &missing_ids)).await
    };
    match commit {
        Ok(commit) => {
            outcome.created = commit.tracks_created;
            outcome.updated = commit.tracks_updated;
            outcome.missing = commit.tracks_missing;
            outcome.album_ids = commit.album_ids;
        }
        Err(err) => {
            // Atomic failure: nothing of this folder was committed.
            outcome.errors.push(FolderError {
                path: unit.path.clone(),
                message: err.to_string(),
            });
        }
    }
    outcome
}

async fn run_blocking<T, F>(func: F) -> Result<T, CatalogError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(func)
        .await
        .map_err(|err| CatalogError::Task(err.to_string()))?
        .map_err(CatalogError::Store)
}
