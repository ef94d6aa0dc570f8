use common::{Album, Annotation, Artist, Folder, Library, MediaFile, Tag};
use serde::Serialize;

/// Result of one atomic per-folder commit.
#[derive(Clone, Debug, Default)]
pub struct FolderCommit {
    pub tracks_created: usize,
    pub tracks_updated: usize,
    pub tracks_missing: usize,
    /// Album grouping keys touched by the commit, for aggregate rebuild.
    pub album_ids: Vec<String>,
}

/// A missing track together with its same-identity candidates that appeared
/// after a given scan start.
#[derive(Clone, Debug)]
pub struct MissingGroup {
    pub missing: MediaFile,
    pub candidates: Vec<MediaFile>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PruneSummary {
    pub tracks_removed: usize,
    pub folders_removed: usize,
    pub album_ids: Vec<String>,
}

#[derive(Debug)]
pub enum StoreError {
    Storage(String),
    Corrupt(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Storage(message) => write!(f, "storage error: {}", message),
            StoreError::Corrupt(message) => write!(f, "corrupt record: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Storage contract the sync engine is written against. Every operation is
/// idempotent: a retried folder unit may re-invoke any of them. The engine
/// never touches the underlying database directly.
pub trait SyncStore: Send + Sync {
    // libraries
    fn upsert_library(&self, library: &Library) -> Result<(), StoreError>;
    fn get_library(&self, id: &str) -> Result<Option<Library>, StoreError>;
    fn list_libraries(&self) -> Result<Vec<Library>, StoreError>;
    fn record_scan_start(&self, library_id: &str, started_at: u64) -> Result<(), StoreError>;

    // folders
    fn get_folder(&self, id: &str) -> Result<Option<Folder>, StoreError>;
    fn folders_in_library(&self, library_id: &str) -> Result<Vec<Folder>, StoreError>;
    /// All folders whose path is `prefix` or a descendant of it.
    fn folders_under(&self, library_id: &str, prefix: &str) -> Result<Vec<Folder>, StoreError>;
    fn mark_folders_missing(&self, ids: &[String], missing: bool) -> Result<usize, StoreError>;

    // tracks
    fn get_track(&self, id: &str) -> Result<Option<MediaFile>, StoreError>;
    fn tracks_in_folder(&self, folder_id: &str) -> Result<Vec<MediaFile>, StoreError>;
    fn tracks_under(&self, library_id: &str, prefix: &str) -> Result<Vec<MediaFile>, StoreError>;
    fn tracks_in_album(&self, album_id: &str) -> Result<Vec<MediaFile>, StoreError>;
    fn mark_tracks_missing(&self, ids: &[String], missing: bool) -> Result<usize, StoreError>;
    /// Marks every non-missing track of the given folders missing; returns the
    /// number of rows touched and the album ids they belonged to.
    fn mark_folder_tracks_missing(
        &self,
        folder_ids: &[String],
    ) -> Result<(usize, Vec<String>), StoreError>;
    fn delete_track(&self, id: &str) -> Result<(), StoreError>;

    /// Atomic persistence of one folder unit: the folder row, the (re)imported
    /// tracks (upsert by library+path), their deduplicated tags and
    /// associations, and the folder-scoped missing marks. All or nothing.
    fn commit_folder(
        &self,
        folder: &Folder,
        imported: &[MediaFile],
        missing_ids: &[String],
    ) -> Result<FolderCommit, StoreError>;

    // reconciliation
    fn missing_with_candidates(
        &self,
        library_id: &str,
        since: u64,
    ) -> Result<Vec<MissingGroup>, StoreError>;
    /// Moves the annotation owned by `from` onto `to`, unless `to` already has
    /// one of its own.
    fn transfer_annotation(&self, from: &str, to: &str) -> Result<(), StoreError>;
    /// Permanently removes tracks (and empty folders) that have been missing
    /// since before `cutoff`.
    fn prune_missing(&self, library_id: &str, cutoff: u64) -> Result<PruneSummary, StoreError>;
    /// Cascade-deletes a folder subtree and everything in it.
    fn delete_folder_subtree(&self, library_id: &str, prefix: &str) -> Result<usize, StoreError>;

    // annotations
    fn get_annotation(&self, track_id: &str) -> Result<Annotation, StoreError>;
    fn put_annotation(&self, track_id: &str, annotation: &Annotation) -> Result<(), StoreError>;

    // tags
    fn get_tag(&self, id: &str) -> Result<Option<Tag>, StoreError>;
    fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;

    // derived aggregates
    fn upsert_album(&self, album: &Album) -> Result<(), StoreError>;
    fn delete_album(&self, id: &str) -> Result<(), StoreError>;
    fn get_album(&self, id: &str) -> Result<Option<Album>, StoreError>;
    fn list_albums(
        &self,
        library_id: &str,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Album>, usize), StoreError>;
    fn albums_by_artist(&self, artist_id: &str) -> Result<Vec<Album>, StoreError>;
    fn upsert_artist(&self, artist: &Artist) -> Result<(), StoreError>;
    fn delete_artist(&self, id: &str) -> Result<(), StoreError>;
    fn list_artists(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Artist>, usize), StoreError>;
}
