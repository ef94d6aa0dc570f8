mod aggregate;
mod diff;
mod redb_store;
mod reconcile;
mod scan;
mod store;
mod walker;

#[cfg(test)]
mod fake;

pub use diff::{diff_folder, FolderDiff};
pub use redb_store::RedbStore;
pub use scan::{FolderError, ScanOptions, ScanSummary, FILES_BATCH_SIZE};
pub use store::{FolderCommit, MissingGroup, PruneSummary, StoreError, SyncStore};
pub use walker::{is_audio_file, walk_library, FileEntry, FolderUnit, WalkOutcome};

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{
    library_id, now_millis, Album, Annotation, Artist, Folder, Library, MediaFile,
};
use metadata::{ExtractorRegistry, MetadataError};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum CatalogError {
    Store(StoreError),
    Metadata(MetadataError),
    LibraryNotFound(String),
    RootMissing(String),
    Task(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Store(err) => write!(f, "{}", err),
            CatalogError::Metadata(err) => write!(f, "{}", err),
            CatalogError::LibraryNotFound(id) => write!(f, "library not found: {}", id),
            CatalogError::RootMissing(path) => write!(f, "library root not found: {}", path),
            CatalogError::Task(message) => write!(f, "task failed: {}", message),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        CatalogError::Store(err)
    }
}

impl From<MetadataError> for CatalogError {
    fn from(err: MetadataError) -> Self {
        CatalogError::Metadata(err)
    }
}

/// Handle over the synchronized library state: scan entry points, browse
/// queries, and the annotation surface. Cheap to clone.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn SyncStore>,
    extractors: ExtractorRegistry,
    options: ScanOptions,
}

impl Catalog {
    pub fn open(
        index_path: &Path,
        extractors: ExtractorRegistry,
        options: ScanOptions,
    ) -> Result<Self, CatalogError> {
        let store = RedbStore::open(index_path)?;
        Ok(Self::with_store(Arc::new(store), extractors, options))
    }

    /// Construction over any [`SyncStore`]; tests inject fakes here.
    pub fn with_store(
        store: Arc<dyn SyncStore>,
        extractors: ExtractorRegistry,
        options: ScanOptions,
    ) -> Self {
        Self {
            store,
            extractors,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Registers (or re-points) a scan target. The id derives from the name,
    /// so repeated calls are idempotent.
    pub fn ensure_library(&self, name: &str, path: &str) -> Result<Library, CatalogError> {
        let id = library_id(name);
        match self.store.get_library(&id)? {
            Some(mut library) => {
                if library.path != path || library.name != name {
                    library.path = path.to_string();
                    library.name = name.to_string();
                    self.store.upsert_library(&library)?;
                }
                Ok(library)
            }
            None => {
                let library = Library {
                    id,
                    name: name.to_string(),
                    path: path.to_string(),
                    last_scan_started_at: 0,
                };
                self.store.upsert_library(&library)?;
                Ok(library)
            }
        }
    }

    pub fn libraries(&self) -> Result<Vec<Library>, CatalogError> {
        Ok(self.store.list_libraries()?)
    }

    pub fn library(&self, id: &str) -> Result<Option<Library>, CatalogError> {
        Ok(self.store.get_library(id)?)
    }

    /// Full walk + reconcile of one library. Concurrent calls for different
    /// libraries are fine; the caller serializes per-library invocations.
    pub async fn scan(
        &self,
        library_id: &str,
        full: bool,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, CatalogError> {
        let library = self
            .store
            .get_library(library_id)?
            .ok_or_else(|| CatalogError::LibraryNotFound(library_id.to_string()))?;
        let reader = self.extractors.default_reader()?;
        let scanner = scan::Scanner {
            store: Arc::clone(&self.store),
            reader,
            options: self.options.clone(),
        };
        scanner.scan(&library, full, cancel).await
    }

    /// Permanently removes entries that have been missing longer than
    /// `retention`, then refreshes the affected aggregates.
    pub async fn prune(
        &self,
        library_id: &str,
        retention: Duration,
    ) -> Result<PruneSummary, CatalogError> {
        let cutoff = now_millis().saturating_sub(retention.as_millis() as u64);
        let summary = {
            let store = Arc::clone(&self.store);
            let library_id = library_id.to_string();
            tokio::task::spawn_blocking(move || store.prune_missing(&library_id, cutoff))
                .await
                .map_err(|err| CatalogError::Task(err.to_string()))??
        };
        let albums: BTreeSet<String> = summary.album_ids.iter().cloned().collect();
        {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || aggregate::rebuild(store.as_ref(), &albums))
                .await
                .map_err(|err| CatalogError::Task(err.to_string()))??;
        }
        Ok(summary)
    }

    // browse

    pub fn folder(&self, id: &str) -> Result<Option<Folder>, CatalogError> {
        Ok(self.store.get_folder(id)?)
    }

    pub fn folder_children(
        &self,
        library_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Folder>, CatalogError> {
        let mut folders = self.store.folders_in_library(library_id)?;
        folders.retain(|folder| match parent_id {
            Some(parent) => folder.parent_id.as_deref() == Some(parent),
            None => folder.parent_id.is_none(),
        });
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(folders)
    }

    pub fn folder_tracks(&self, folder_id: &str) -> Result<Vec<MediaFile>, CatalogError> {
        let mut tracks = self.store.tracks_in_folder(folder_id)?;
        tracks.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(tracks)
    }

    pub fn track(&self, id: &str) -> Result<Option<MediaFile>, CatalogError> {
        Ok(self.store.get_track(id)?)
    }

    pub fn albums(
        &self,
        library_id: &str,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Album>, usize), CatalogError> {
        Ok(self.store.list_albums(library_id, search, limit, offset)?)
    }

    pub fn album(&self, id: &str) -> Result<Option<Album>, CatalogError> {
        Ok(self.store.get_album(id)?)
    }

    pub fn album_tracks(&self, album_id: &str) -> Result<Vec<MediaFile>, CatalogError> {
        let mut tracks = self.store.tracks_in_album(album_id)?;
        tracks.retain(|track| !track.missing);
        tracks.sort_by(|a, b| {
            let disc_a = a.disc_no.unwrap_or(u16::MAX);
            let disc_b = b.disc_no.unwrap_or(u16::MAX);
            let track_a = a.track_no.unwrap_or(u16::MAX);
            let track_b = b.track_no.unwrap_or(u16::MAX);
            disc_a
                .cmp(&disc_b)
                .then_with(|| track_a.cmp(&track_b))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(tracks)
    }

    pub fn artists(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Artist>, usize), CatalogError> {
        Ok(self.store.list_artists(search, limit, offset)?)
    }

    // annotations

    pub fn annotation(&self, track_id: &str) -> Result<Annotation, CatalogError> {
        Ok(self.store.get_annotation(track_id)?)
    }

    pub fn set_rating(&self, track_id: &str, rating: u8) -> Result<(), CatalogError> {
        let mut annotation = self.store.get_annotation(track_id)?;
        annotation.rating = rating.min(5);
        Ok(self.store.put_annotation(track_id, &annotation)?)
    }

    pub fn set_starred(&self, track_id: &str, starred: bool) -> Result<(), CatalogError> {
        let mut annotation = self.store.get_annotation(track_id)?;
        annotation.starred = starred;
        annotation.starred_at = starred.then(now_millis);
        Ok(self.store.put_annotation(track_id, &annotation)?)
    }

    pub fn record_play(&self, track_id: &str) -> Result<(), CatalogError> {
        let mut annotation = self.store.get_annotation(track_id)?;
        annotation.play_count = annotation.play_count.saturating_add(1);
        annotation.play_date = Some(now_millis());
        Ok(self.store.put_annotation(track_id, &annotation)?)
    }

    pub fn set_bookmark(
        &self,
        track_id: &str,
        position_ms: Option<u64>,
    ) -> Result<(), CatalogError> {
        let mut annotation = self.store.get_annotation(track_id)?;
        annotation.bookmark_ms = position_ms;
        Ok(self.store.put_annotation(track_id, &annotation)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{track_json, JsonReader, StalledReader};
    use common::{join_relpath, path_join};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct TestEnv {
        _dir: tempfile::TempDir,
        music: PathBuf,
        catalog: Catalog,
        library: Library,
    }

    fn setup() -> TestEnv {
        setup_with(ExtractorRegistry::with_default(Arc::new(JsonReader)), ScanOptions::default())
    }

    fn setup_with(extractors: ExtractorRegistry, options: ScanOptions) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        fs::create_dir_all(&music).unwrap();
        let catalog = Catalog::open(&dir.path().join("index.redb"), extractors, options).unwrap();
        let library = catalog
            .ensure_library("Music", music.to_str().unwrap())
            .unwrap();
        TestEnv {
            _dir: dir,
            music,
            catalog,
            library,
        }
    }

    fn write_track(env: &TestEnv, rel: &str, contents: &str) {
        let path = join_relpath(&env.music, rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    async fn scan(env: &TestEnv, full: bool) -> ScanSummary {
        env.catalog
            .scan(&env.library.id, full, CancellationToken::new())
            .await
            .unwrap()
    }

    fn all_tracks(env: &TestEnv) -> Vec<MediaFile> {
        env.catalog.store().tracks_under(&env.library.id, "").unwrap()
    }

    fn track_at(env: &TestEnv, rel: &str) -> Option<MediaFile> {
        all_tracks(env).into_iter().find(|track| track.path == rel)
    }

    fn folder_at(env: &TestEnv, rel: &str) -> Option<Folder> {
        env.catalog
            .store()
            .get_folder(&common::folder_id(&env.library.id, rel))
            .unwrap()
    }

    #[tokio::test]
    async fn first_scan_imports_tree() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));

        let summary = scan(&env, true).await;
        assert_eq!(summary.tracks_imported, 1);
        assert!(summary.errors.is_empty());

        let track = track_at(&env, "A/album1/track1.mp3").unwrap();
        assert_eq!(track.title, "X");
        assert!(!track.missing);
        assert_eq!(track.folder_id, common::folder_id(&env.library.id, "A/album1"));

        for path in ["", "A", "A/album1"] {
            let folder = folder_at(&env, path).unwrap();
            assert!(!folder.missing, "folder {:?} should not be missing", path);
        }
        let a = folder_at(&env, "A").unwrap();
        assert_eq!(a.name, "A");
        assert_eq!(a.parent_id.as_deref(), Some(common::folder_id(&env.library.id, "").as_str()));
    }

    #[tokio::test]
    async fn unchanged_rescan_writes_nothing() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));
        scan(&env, false).await;

        let before = track_at(&env, "A/album1/track1.mp3").unwrap();
        let folder_before = folder_at(&env, "A/album1").unwrap();

        let summary = scan(&env, false).await;
        assert_eq!(summary.folders_scanned, 0);
        assert_eq!(summary.tracks_imported, 0);
        assert_eq!(summary.tracks_updated, 0);
        assert_eq!(summary.tracks_missing, 0);
        assert_eq!(summary.tracks_unchanged, 1);

        let after = track_at(&env, "A/album1/track1.mp3").unwrap();
        assert_eq!(before.updated_at, after.updated_at);
        assert_eq!(
            folder_before.updated_at,
            folder_at(&env, "A/album1").unwrap().updated_at
        );
    }

    #[tokio::test]
    async fn full_rescan_reextracts_unchanged_files() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));
        scan(&env, false).await;

        let summary = scan(&env, true).await;
        assert_eq!(summary.tracks_updated, 1);
        assert_eq!(summary.tracks_imported, 0);
    }

    #[tokio::test]
    async fn modified_file_is_reextracted() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));
        scan(&env, false).await;

        // mtime has one-second resolution here; make the rewrite land after
        // the stored updated_at.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        write_track(&env, "A/album1/track1.mp3", &track_json("Y", "Ann", "One", 1));

        let summary = scan(&env, false).await;
        assert_eq!(summary.tracks_updated, 1);
        let track = track_at(&env, "A/album1/track1.mp3").unwrap();
        assert_eq!(track.title, "Y");
        assert_eq!(all_tracks(&env).len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_does_not_sink_its_folder() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("One", "Ann", "One", 1));
        write_track(&env, "A/album1/track2.mp3", "this is not json");
        write_track(&env, "A/album1/track3.mp3", &track_json("Three", "Ann", "One", 3));

        let summary = scan(&env, true).await;
        assert_eq!(summary.tracks_imported, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].path, "A/album1/track2.mp3");
        assert!(track_at(&env, "A/album1/track1.mp3").is_some());
        assert!(track_at(&env, "A/album1/track3.mp3").is_some());
        assert!(track_at(&env, "A/album1/track2.mp3").is_none());
    }

    #[tokio::test]
    async fn missing_and_restore_cycle() {
        let env = setup();
        let json = track_json("X", "Ann", "One", 1);
        write_track(&env, "A/album1/track1.mp3", &json);
        scan(&env, true).await;

        fs::remove_file(join_relpath(&env.music, "A/album1/track1.mp3")).unwrap();
        let summary = scan(&env, false).await;
        assert_eq!(summary.tracks_missing, 1);
        assert!(track_at(&env, "A/album1/track1.mp3").unwrap().missing);
        assert!(folder_at(&env, "A/album1").unwrap().missing);
        assert!(folder_at(&env, "A").unwrap().missing);

        write_track(&env, "A/album1/track1.mp3", &json);
        let summary = scan(&env, false).await;
        assert_eq!(summary.tracks_imported + summary.tracks_updated, 1);
        let tracks = all_tracks(&env);
        assert_eq!(tracks.len(), 1);
        assert!(!tracks[0].missing);
        assert!(!folder_at(&env, "A/album1").unwrap().missing);
        assert!(!folder_at(&env, "A").unwrap().missing);
    }

    #[tokio::test]
    async fn moved_track_is_reconciled_not_duplicated() {
        let env = setup();
        let json = track_json("X", "Ann", "One", 1);
        write_track(&env, "A/album1/track1.mp3", &json);
        scan(&env, true).await;

        let original = track_at(&env, "A/album1/track1.mp3").unwrap();
        env.catalog.set_rating(&original.id, 5).unwrap();
        env.catalog.record_play(&original.id).unwrap();

        let target = join_relpath(&env.music, "B/album1/track1.mp3");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::rename(join_relpath(&env.music, "A/album1/track1.mp3"), target).unwrap();

        let summary = scan(&env, false).await;
        assert_eq!(summary.tracks_reconciled, 1);

        let tracks = all_tracks(&env);
        assert_eq!(tracks.len(), 1, "moved track must not duplicate");
        let moved = &tracks[0];
        assert_eq!(moved.path, "B/album1/track1.mp3");
        assert_eq!(moved.pid, original.pid);
        assert!(!moved.missing);
        assert_ne!(moved.id, original.id);

        let annotation = env.catalog.annotation(&moved.id).unwrap();
        assert_eq!(annotation.rating, 5);
        assert_eq!(annotation.play_count, 1);
        assert!(env.catalog.track(&original.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn tags_are_deduplicated_globally() {
        let env = setup();
        write_track(
            &env,
            "A/a1/t1.mp3",
            r#"{"title": "T1", "artist": "Ann", "album": "One", "genre": "Ambient", "duration": 100}"#,
        );
        write_track(
            &env,
            "B/a2/t2.mp3",
            r#"{"title": "T2", "artist": "Ben", "album": "Two", "genre": "Ambient", "duration": 100}"#,
        );
        scan(&env, true).await;

        let tags = env.catalog.store().list_tags().unwrap();
        let ambient: Vec<_> = tags
            .iter()
            .filter(|tag| tag.name == "genre" && tag.value == "Ambient")
            .collect();
        assert_eq!(ambient.len(), 1);

        let t1 = track_at(&env, "A/a1/t1.mp3").unwrap();
        let t2 = track_at(&env, "B/a2/t2.mp3").unwrap();
        let tag_id_of = |track: &MediaFile| {
            track
                .tags
                .iter()
                .find(|tag| tag.name == "genre")
                .map(|tag| tag.id.clone())
                .unwrap()
        };
        assert_eq!(tag_id_of(&t1), tag_id_of(&t2));
    }

    #[tokio::test]
    async fn album_grouping_spans_directories() {
        let env = setup();
        write_track(&env, "X/disc1/t1.mp3", &track_json("T1", "Band", "Split", 1));
        write_track(&env, "X/disc2/t2.mp3", &track_json("T2", "Band", "Split", 2));
        scan(&env, true).await;

        let (albums, total) = env.catalog.albums(&env.library.id, None, 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(albums[0].name, "Split");
        assert_eq!(albums[0].song_count, 2);

        let (artists, _) = env.catalog.artists(None, 10, 0).unwrap();
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].name, "Band");
        assert_eq!(artists[0].album_count, 1);
        assert_eq!(artists[0].song_count, 2);
    }

    #[tokio::test]
    async fn stalled_extractor_fails_only_its_folder() {
        let mut registry = ExtractorRegistry::new();
        registry.register_default(Arc::new(StalledReader(std::time::Duration::from_millis(
            500,
        ))));
        let options = ScanOptions {
            batch_timeout: std::time::Duration::from_millis(50),
            ..ScanOptions::default()
        };
        let env = setup_with(registry, options);
        write_track(&env, "A/album1/track1.mp3", "{}");

        let summary = scan(&env, true).await;
        assert!(summary
            .errors
            .iter()
            .any(|error| error.message.contains("timed out")));
        assert!(all_tracks(&env).is_empty());
    }

    #[tokio::test]
    async fn cancelled_scan_schedules_no_units() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = env
            .catalog
            .scan(&env.library.id, true, cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.folders_scanned, 0);
        assert!(all_tracks(&env).is_empty());
    }

    #[tokio::test]
    async fn prune_removes_only_stale_missing_rows() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));
        write_track(&env, "A/album1/track2.mp3", &track_json("Y", "Ann", "One", 2));
        scan(&env, true).await;

        fs::remove_file(join_relpath(&env.music, "A/album1/track1.mp3")).unwrap();
        scan(&env, false).await;

        // Still inside the retention window.
        let kept = env
            .catalog
            .prune(&env.library.id, std::time::Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(kept.tracks_removed, 0);
        assert_eq!(all_tracks(&env).len(), 2);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let pruned = env
            .catalog
            .prune(&env.library.id, std::time::Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(pruned.tracks_removed, 1);
        let tracks = all_tracks(&env);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].path, path_join("A/album1", "track2.mp3"));
    }

    #[tokio::test]
    async fn subtree_deletion_cascades_to_folders_and_tracks() {
        let env = setup();
        write_track(&env, "A/album1/track1.mp3", &track_json("X", "Ann", "One", 1));
        write_track(&env, "A/album2/track2.mp3", &track_json("Y", "Ann", "Two", 1));
        write_track(&env, "B/album3/track3.mp3", &track_json("Z", "Ben", "Three", 1));
        scan(&env, true).await;

        let store = env.catalog.store();
        assert_eq!(store.folders_under(&env.library.id, "A").unwrap().len(), 3);
        assert_eq!(store.tracks_under(&env.library.id, "A").unwrap().len(), 2);

        let removed = store.delete_folder_subtree(&env.library.id, "A").unwrap();
        assert_eq!(removed, 2);
        assert!(store.folders_under(&env.library.id, "A").unwrap().is_empty());
        assert!(store.tracks_under(&env.library.id, "A").unwrap().is_empty());
        assert_eq!(all_tracks(&env).len(), 1);
        assert!(folder_at(&env, "B/album3").is_some());
    }

    #[tokio::test]
    async fn duplicate_identity_reconciles_to_most_recent() {
        let env = setup();
        let json = track_json("X", "Ann", "One", 1);
        write_track(&env, "A/album1/track1.mp3", &json);
        scan(&env, true).await;
        let original = track_at(&env, "A/album1/track1.mp3").unwrap();
        env.catalog.set_rating(&original.id, 4).unwrap();

        // The same content reappears twice; the missing row must fold into
        // exactly one of them and the other must survive untouched.
        fs::remove_file(join_relpath(&env.music, "A/album1/track1.mp3")).unwrap();
        write_track(&env, "B/album1/track1.mp3", &json);
        write_track(&env, "C/album1/track1.mp3", &json);
        let summary = scan(&env, false).await;
        assert_eq!(summary.tracks_reconciled, 1);

        let tracks = all_tracks(&env);
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|track| !track.missing));
        assert!(tracks.iter().all(|track| track.pid == original.pid));

        let rated: Vec<_> = tracks
            .iter()
            .filter(|track| env.catalog.annotation(&track.id).unwrap().rating == 4)
            .collect();
        assert_eq!(rated.len(), 1);
    }
}
