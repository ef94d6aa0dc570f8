use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{now_millis, Album, Annotation, Artist, Folder, Library, MediaFile, Tag};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, Table, TableDefinition,
    TableError, TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{FolderCommit, MissingGroup, PruneSummary, StoreError, SyncStore};

const INDEX_VERSION: u32 = 1;
const KEY_SEP: char = '\x1f';

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const LIBRARIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("libraries");
const FOLDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("folders");
const FOLDERS_BY_PATH_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("folders_by_path");
const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const TRACKS_BY_PATH_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks_by_path");
const TRACKS_BY_FOLDER_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("tracks_by_folder");
const TRACKS_BY_PID_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks_by_pid");
const TRACKS_BY_ALBUM_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("tracks_by_album");
const TRACKS_MISSING_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks_missing");
const TAGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");
const TRACK_TAGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("track_tags");
const ANNOTATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("annotations");
const ALBUMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("albums");
const ALBUMS_BY_ARTIST_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("albums_by_artist");
const ARTISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artists");

const META_VERSION_KEY: &str = "version";

const ALL_TABLES: [TableDefinition<&str, &[u8]>; 16] = [
    META_TABLE,
    LIBRARIES_TABLE,
    FOLDERS_TABLE,
    FOLDERS_BY_PATH_TABLE,
    TRACKS_TABLE,
    TRACKS_BY_PATH_TABLE,
    TRACKS_BY_FOLDER_TABLE,
    TRACKS_BY_PID_TABLE,
    TRACKS_BY_ALBUM_TABLE,
    TRACKS_MISSING_TABLE,
    TAGS_TABLE,
    TRACK_TAGS_TABLE,
    ANNOTATIONS_TABLE,
    ALBUMS_TABLE,
    ALBUMS_BY_ARTIST_TABLE,
    ARTISTS_TABLE,
];

/// redb-backed implementation of [`SyncStore`]. Composite keys join their
/// parts with `'\x1f'`; subtree and identity lookups are prefix range scans.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        Self::with_database(Arc::new(db))
    }

    pub fn with_database(db: Arc<Database>) -> Result<Self, StoreError> {
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            for table in ALL_TABLES {
                write_txn.open_table(table)?;
            }
            let mut meta = write_txn.open_table(META_TABLE)?;
            if meta.get(META_VERSION_KEY)?.is_none() {
                let bytes = encode_value(&INDEX_VERSION)?;
                meta.insert(META_VERSION_KEY, bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read_one<T: for<'de> Deserialize<'de>>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let value = match table.get(key)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(value)
    }

    /// Resolves every index entry under `prefix` against the target table.
    fn collect_by_index<T: for<'de> Deserialize<'de>>(
        &self,
        index: TableDefinition<&str, &[u8]>,
        target: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(index)?;
        let target = read_txn.open_table(target)?;
        let mut out = Vec::new();
        for (_, id) in collect_prefix(&index, prefix)? {
            let id = String::from_utf8_lossy(&id).to_string();
            if let Some(value) = target.get(id.as_str())? {
                out.push(decode_value(value.value())?);
            }
        }
        Ok(out)
    }
}

impl SyncStore for RedbStore {
    fn upsert_library(&self, library: &Library) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LIBRARIES_TABLE)?;
            let bytes = encode_value(library)?;
            table.insert(library.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_library(&self, id: &str) -> Result<Option<Library>, StoreError> {
        self.read_one(LIBRARIES_TABLE, id)
    }

    fn list_libraries(&self) -> Result<Vec<Library>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIBRARIES_TABLE)?;
        let mut out: Vec<Library> = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            out.push(decode_value(entry.1.value())?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn record_scan_start(&self, library_id: &str, started_at: u64) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LIBRARIES_TABLE)?;
            let mut library: Library = match table.get(library_id)? {
                Some(value) => decode_value(value.value())?,
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "library not found: {}",
                        library_id
                    )))
                }
            };
            library.last_scan_started_at = started_at;
            let bytes = encode_value(&library)?;
            table.insert(library_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_folder(&self, id: &str) -> Result<Option<Folder>, StoreError> {
        self.read_one(FOLDERS_TABLE, id)
    }

    fn folders_in_library(&self, library_id: &str) -> Result<Vec<Folder>, StoreError> {
        self.collect_by_index(
            FOLDERS_BY_PATH_TABLE,
            FOLDERS_TABLE,
            &key_prefix(library_id),
        )
    }

    fn folders_under(&self, library_id: &str, prefix: &str) -> Result<Vec<Folder>, StoreError> {
        let folders = self.folders_in_library(library_id)?;
        Ok(folders
            .into_iter()
            .filter(|folder| path_is_under(&folder.path, prefix))
            .collect())
    }

    fn mark_folders_missing(&self, ids: &[String], missing: bool) -> Result<usize, StoreError> {
        let write_txn = self.db.begin_write()?;
        let changed = {
            let mut table = write_txn.open_table(FOLDERS_TABLE)?;
            let now = now_millis();
            let mut changed = 0usize;
            for id in ids {
                let folder: Option<Folder> = match table.get(id.as_str())? {
                    Some(value) => Some(decode_value(value.value())?),
                    None => None,
                };
                let Some(mut folder) = folder else { continue };
                if folder.missing == missing {
                    continue;
                }
                folder.missing = missing;
                folder.updated_at = now;
                let bytes = encode_value(&folder)?;
                table.insert(id.as_str(), bytes.as_slice())?;
                changed += 1;
            }
            changed
        };
        write_txn.commit()?;
        Ok(changed)
    }

    fn get_track(&self, id: &str) -> Result<Option<MediaFile>, StoreError> {
        self.read_one(TRACKS_TABLE, id)
    }

    fn tracks_in_folder(&self, folder_id: &str) -> Result<Vec<MediaFile>, StoreError> {
        self.collect_by_index(TRACKS_BY_FOLDER_TABLE, TRACKS_TABLE, &key_prefix(folder_id))
    }

    fn tracks_under(&self, library_id: &str, prefix: &str) -> Result<Vec<MediaFile>, StoreError> {
        let tracks: Vec<MediaFile> = self.collect_by_index(
            TRACKS_BY_PATH_TABLE,
            TRACKS_TABLE,
            &key_prefix(library_id),
        )?;
        Ok(tracks
            .into_iter()
            .filter(|track| path_is_under(&track.path, prefix))
            .collect())
    }

    fn tracks_in_album(&self, album_id: &str) -> Result<Vec<MediaFile>, StoreError> {
        self.collect_by_index(TRACKS_BY_ALBUM_TABLE, TRACKS_TABLE, &key_prefix(album_id))
    }

    fn mark_tracks_missing(&self, ids: &[String], missing: bool) -> Result<usize, StoreError> {
        let write_txn = self.db.begin_write()?;
        let changed = {
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let mut missing_index = write_txn.open_table(TRACKS_MISSING_TABLE)?;
            let now = now_millis();
            let mut changed = 0usize;
            for id in ids {
                if set_track_missing(&mut tracks, &mut missing_index, id, missing, now)? {
                    changed += 1;
                }
            }
            changed
        };
        write_txn.commit()?;
        Ok(changed)
    }

    fn mark_folder_tracks_missing(
        &self,
        folder_ids: &[String],
    ) -> Result<(usize, Vec<String>), StoreError> {
        let mut track_ids = Vec::new();
        let mut album_ids = BTreeSet::new();
        for folder_id in folder_ids {
            for track in self.tracks_in_folder(folder_id)? {
                if !track.missing {
                    album_ids.insert(track.album_id.clone());
                    track_ids.push(track.id);
                }
            }
        }
        let changed = self.mark_tracks_missing(&track_ids, true)?;
        Ok((changed, album_ids.into_iter().collect()))
    }

    fn delete_track(&self, id: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        let track: Option<MediaFile> = {
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let removed = match tracks.remove(id)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            removed
        };
        if let Some(track) = &track {
            drop_track_indexes(&write_txn, track)?;
            let mut annotations = write_txn.open_table(ANNOTATIONS_TABLE)?;
            annotations.remove(id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn commit_folder(
        &self,
        folder: &Folder,
        imported: &[MediaFile],
        missing_ids: &[String],
    ) -> Result<FolderCommit, StoreError> {
        let write_txn = self.db.begin_write()?;
        let commit = {
            let now = now_millis();
            let mut result = FolderCommit::default();
            let mut album_ids = BTreeSet::new();

            {
                let mut folders = write_txn.open_table(FOLDERS_TABLE)?;
                let mut folders_by_path = write_txn.open_table(FOLDERS_BY_PATH_TABLE)?;
                let mut row = folder.clone();
                row.updated_at = now;
                let existing_created: Option<u64> = match folders.get(folder.id.as_str())? {
                    Some(value) => {
                        let existing: Folder = decode_value(value.value())?;
                        Some(existing.created_at)
                    }
                    None => None,
                };
                row.created_at = existing_created.unwrap_or(now);
                let bytes = encode_value(&row)?;
                folders.insert(row.id.as_str(), bytes.as_slice())?;
                let path_key = key2(&row.library_id, &row.path);
                folders_by_path.insert(path_key.as_str(), row.id.as_bytes())?;
            }

            {
                let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
                let mut by_path = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
                let mut by_folder = write_txn.open_table(TRACKS_BY_FOLDER_TABLE)?;
                let mut by_pid = write_txn.open_table(TRACKS_BY_PID_TABLE)?;
                let mut by_album = write_txn.open_table(TRACKS_BY_ALBUM_TABLE)?;
                let mut missing_index = write_txn.open_table(TRACKS_MISSING_TABLE)?;
                let mut tags = write_txn.open_table(TAGS_TABLE)?;
                let mut track_tags = write_txn.open_table(TRACK_TAGS_TABLE)?;

                for file in imported {
                    let mut row = file.clone();
                    let path_key = key2(&row.library_id, &row.path);
                    let existing_id: Option<String> = match by_path.get(path_key.as_str())? {
                        Some(value) => Some(String::from_utf8_lossy(value.value()).to_string()),
                        None => None,
                    };
                    let existing: Option<MediaFile> = match existing_id {
                        Some(id) => match tracks.get(id.as_str())? {
                            Some(value) => Some(decode_value(value.value())?),
                            None => None,
                        },
                        None => None,
                    };

                    if let Some(existing) = existing {
                        row.id = existing.id.clone();
                        row.created_at = existing.created_at;
                        if row.birth_time == 0 {
                            row.birth_time = existing.birth_time;
                        }
                        if existing.pid != row.pid {
                            by_pid.remove(
                                key3(&existing.library_id, &existing.pid, &existing.id).as_str(),
                            )?;
                        }
                        if existing.album_id != row.album_id {
                            by_album.remove(key2(&existing.album_id, &existing.id).as_str())?;
                            album_ids.insert(existing.album_id.clone());
                        }
                        if existing.missing {
                            missing_index
                                .remove(key2(&existing.library_id, &existing.id).as_str())?;
                        }
                        for tag in &existing.tags {
                            track_tags.remove(key2(&existing.id, &tag.id).as_str())?;
                        }
                        result.tracks_updated += 1;
                    } else {
                        row.created_at = now;
                        result.tracks_created += 1;
                    }
                    row.updated_at = now;
                    row.missing = false;

                    let bytes = encode_value(&row)?;
                    tracks.insert(row.id.as_str(), bytes.as_slice())?;
                    by_path.insert(path_key.as_str(), row.id.as_bytes())?;
                    by_folder.insert(key2(&row.folder_id, &row.id).as_str(), row.id.as_bytes())?;
                    by_pid.insert(
                        key3(&row.library_id, &row.pid, &row.id).as_str(),
                        row.id.as_bytes(),
                    )?;
                    by_album.insert(key2(&row.album_id, &row.id).as_str(), row.id.as_bytes())?;
                    for tag in &row.tags {
                        let tag_bytes = encode_value(tag)?;
                        tags.insert(tag.id.as_str(), tag_bytes.as_slice())?;
                        track_tags.insert(key2(&row.id, &tag.id).as_str(), tag.id.as_bytes())?;
                    }
                    album_ids.insert(row.album_id.clone());
                }

                for id in missing_ids {
                    let album: Option<String> = match tracks.get(id.as_str())? {
                        Some(value) => {
                            let track: MediaFile = decode_value(value.value())?;
                            Some(track.album_id)
                        }
                        None => None,
                    };
                    if set_track_missing(&mut tracks, &mut missing_index, id, true, now)? {
                        result.tracks_missing += 1;
                        if let Some(album) = album {
                            album_ids.insert(album);
                        }
                    }
                }
            }

            result.album_ids = album_ids.into_iter().collect();
            result
        };
        write_txn.commit()?;
        Ok(commit)
    }

    fn missing_with_candidates(
        &self,
        library_id: &str,
        since: u64,
    ) -> Result<Vec<MissingGroup>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let missing_index = read_txn.open_table(TRACKS_MISSING_TABLE)?;
        let by_pid = read_txn.open_table(TRACKS_BY_PID_TABLE)?;

        let mut groups = Vec::new();
        for (_, id) in collect_prefix(&missing_index, &key_prefix(library_id))? {
            let id = String::from_utf8_lossy(&id).to_string();
            let missing: MediaFile = match tracks.get(id.as_str())? {
                Some(value) => decode_value(value.value())?,
                None => continue,
            };

            let mut candidates: Vec<MediaFile> = Vec::new();
            let pid_prefix = key_prefix(&key2(library_id, &missing.pid));
            for (_, candidate_id) in collect_prefix(&by_pid, &pid_prefix)? {
                let candidate_id = String::from_utf8_lossy(&candidate_id).to_string();
                if candidate_id == missing.id {
                    continue;
                }
                let track: MediaFile = match tracks.get(candidate_id.as_str())? {
                    Some(value) => decode_value(value.value())?,
                    None => continue,
                };
                if track.missing {
                    continue;
                }
                if track.created_at > since || track.updated_at > since {
                    candidates.push(track);
                }
            }
            if !candidates.is_empty() {
                groups.push(MissingGroup { missing, candidates });
            }
        }
        Ok(groups)
    }

    fn transfer_annotation(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ANNOTATIONS_TABLE)?;
            let source: Option<Annotation> = match table.remove(from)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            if let Some(source) = source {
                let keep_existing = match table.get(to)? {
                    Some(value) => {
                        let existing: Annotation = decode_value(value.value())?;
                        !existing.is_empty()
                    }
                    None => false,
                };
                if !keep_existing {
                    let bytes = encode_value(&source)?;
                    table.insert(to, bytes.as_slice())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn prune_missing(&self, library_id: &str, cutoff: u64) -> Result<PruneSummary, StoreError> {
        let mut summary = PruneSummary::default();
        let mut album_ids = BTreeSet::new();

        let missing_tracks: Vec<MediaFile> = {
            let read_txn = self.db.begin_read()?;
            let tracks = read_txn.open_table(TRACKS_TABLE)?;
            let missing_index = read_txn.open_table(TRACKS_MISSING_TABLE)?;
            let mut out = Vec::new();
            for (_, id) in collect_prefix(&missing_index, &key_prefix(library_id))? {
                let id = String::from_utf8_lossy(&id).to_string();
                if let Some(value) = tracks.get(id.as_str())? {
                    out.push(decode_value(value.value())?);
                }
            }
            out
        };

        for track in missing_tracks {
            if track.updated_at >= cutoff {
                continue;
            }
            album_ids.insert(track.album_id.clone());
            self.delete_track(&track.id)?;
            summary.tracks_removed += 1;
        }

        let stale_folders: Vec<Folder> = self
            .folders_in_library(library_id)?
            .into_iter()
            .filter(|folder| folder.missing && folder.updated_at < cutoff)
            .collect();
        let write_txn = self.db.begin_write()?;
        {
            let mut folders = write_txn.open_table(FOLDERS_TABLE)?;
            let mut folders_by_path = write_txn.open_table(FOLDERS_BY_PATH_TABLE)?;
            let by_folder = write_txn.open_table(TRACKS_BY_FOLDER_TABLE)?;
            for folder in &stale_folders {
                if !collect_prefix(&by_folder, &key_prefix(&folder.id))?.is_empty() {
                    continue;
                }
                folders.remove(folder.id.as_str())?;
                folders_by_path.remove(key2(&folder.library_id, &folder.path).as_str())?;
                summary.folders_removed += 1;
            }
        }
        write_txn.commit()?;

        summary.album_ids = album_ids.into_iter().collect();
        debug!(
            tracks = summary.tracks_removed,
            folders = summary.folders_removed,
            "pruned missing entries"
        );
        Ok(summary)
    }

    fn delete_folder_subtree(&self, library_id: &str, prefix: &str) -> Result<usize, StoreError> {
        let tracks = self.tracks_under(library_id, prefix)?;
        let mut removed = 0usize;
        for track in tracks {
            self.delete_track(&track.id)?;
            removed += 1;
        }
        let folders = self.folders_under(library_id, prefix)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FOLDERS_TABLE)?;
            let mut by_path = write_txn.open_table(FOLDERS_BY_PATH_TABLE)?;
            for folder in folders {
                table.remove(folder.id.as_str())?;
                by_path.remove(key2(&folder.library_id, &folder.path).as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }

    fn get_annotation(&self, track_id: &str) -> Result<Annotation, StoreError> {
        Ok(self
            .read_one(ANNOTATIONS_TABLE, track_id)?
            .unwrap_or_default())
    }

    fn put_annotation(&self, track_id: &str, annotation: &Annotation) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ANNOTATIONS_TABLE)?;
            let bytes = encode_value(annotation)?;
            table.insert(track_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_tag(&self, id: &str) -> Result<Option<Tag>, StoreError> {
        self.read_one(TAGS_TABLE, id)
    }

    fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TAGS_TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            out.push(decode_value(entry.1.value())?);
        }
        Ok(out)
    }

    fn upsert_album(&self, album: &Album) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut albums = write_txn.open_table(ALBUMS_TABLE)?;
            let mut by_artist = write_txn.open_table(ALBUMS_BY_ARTIST_TABLE)?;
            let stale_artist: Option<String> = match albums.get(album.id.as_str())? {
                Some(value) => {
                    let existing: Album = decode_value(value.value())?;
                    (existing.artist_id != album.artist_id).then_some(existing.artist_id)
                }
                None => None,
            };
            if let Some(artist_id) = stale_artist {
                by_artist.remove(key2(&artist_id, &album.id).as_str())?;
            }
            let bytes = encode_value(album)?;
            albums.insert(album.id.as_str(), bytes.as_slice())?;
            by_artist.insert(
                key2(&album.artist_id, &album.id).as_str(),
                album.id.as_bytes(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_album(&self, id: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut albums = write_txn.open_table(ALBUMS_TABLE)?;
            let album: Option<Album> = match albums.remove(id)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            if let Some(album) = album {
                let mut by_artist = write_txn.open_table(ALBUMS_BY_ARTIST_TABLE)?;
                by_artist.remove(key2(&album.artist_id, &album.id).as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_album(&self, id: &str) -> Result<Option<Album>, StoreError> {
        self.read_one(ALBUMS_TABLE, id)
    }

    fn list_albums(
        &self,
        library_id: &str,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Album>, usize), StoreError> {
        let search = normalize_search(search);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALBUMS_TABLE)?;
        let mut all: Vec<Album> = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let album: Album = decode_value(entry.1.value())?;
            if album.library_id != library_id {
                continue;
            }
            if let Some(search) = &search {
                if !album.name.to_lowercase().contains(search)
                    && !album.album_artist.to_lowercase().contains(search)
                {
                    continue;
                }
            }
            all.push(album);
        }
        all.sort_by(|a, b| {
            a.sort_name
                .cmp(&b.sort_name)
                .then_with(|| a.year.cmp(&b.year))
        });
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Ok((items, total))
    }

    fn albums_by_artist(&self, artist_id: &str) -> Result<Vec<Album>, StoreError> {
        self.collect_by_index(ALBUMS_BY_ARTIST_TABLE, ALBUMS_TABLE, &key_prefix(artist_id))
    }

    fn upsert_artist(&self, artist: &Artist) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ARTISTS_TABLE)?;
            let bytes = encode_value(artist)?;
            table.insert(artist.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_artist(&self, id: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ARTISTS_TABLE)?;
            table.remove(id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_artists(
        &self,
        search: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Artist>, usize), StoreError> {
        let search = normalize_search(search);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTISTS_TABLE)?;
        let mut all: Vec<Artist> = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let artist: Artist = decode_value(entry.1.value())?;
            if let Some(search) = &search {
                if !artist.name.to_lowercase().contains(search) {
                    continue;
                }
            }
            all.push(artist);
        }
        all.sort_by(|a, b| a.sort_name.cmp(&b.sort_name));
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Ok((items, total))
    }
}

fn set_track_missing(
    tracks: &mut Table<&str, &[u8]>,
    missing_index: &mut Table<&str, &[u8]>,
    id: &str,
    missing: bool,
    now: u64,
) -> Result<bool, StoreError> {
    let track: Option<MediaFile> = match tracks.get(id)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    let Some(mut track) = track else {
        return Ok(false);
    };
    if track.missing == missing {
        return Ok(false);
    }
    track.missing = missing;
    track.updated_at = now;
    let bytes = encode_value(&track)?;
    tracks.insert(id, bytes.as_slice())?;
    let index_key = key2(&track.library_id, id);
    if missing {
        missing_index.insert(index_key.as_str(), id.as_bytes())?;
    } else {
        missing_index.remove(index_key.as_str())?;
    }
    Ok(true)
}

fn drop_track_indexes(write_txn: &WriteTransaction, track: &MediaFile) -> Result<(), StoreError> {
    let mut by_path = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
    let mut by_folder = write_txn.open_table(TRACKS_BY_FOLDER_TABLE)?;
    let mut by_pid = write_txn.open_table(TRACKS_BY_PID_TABLE)?;
    let mut by_album = write_txn.open_table(TRACKS_BY_ALBUM_TABLE)?;
    let mut missing_index = write_txn.open_table(TRACKS_MISSING_TABLE)?;
    let mut track_tags = write_txn.open_table(TRACK_TAGS_TABLE)?;

    by_path.remove(key2(&track.library_id, &track.path).as_str())?;
    by_folder.remove(key2(&track.folder_id, &track.id).as_str())?;
    by_pid.remove(key3(&track.library_id, &track.pid, &track.id).as_str())?;
    by_album.remove(key2(&track.album_id, &track.id).as_str())?;
    missing_index.remove(key2(&track.library_id, &track.id).as_str())?;
    for tag in &track.tags {
        track_tags.remove(key2(&track.id, &tag.id).as_str())?;
    }
    Ok(())
}

fn key2(a: &str, b: &str) -> String {
    format!("{}{}{}", a, KEY_SEP, b)
}

fn key3(a: &str, b: &str, c: &str) -> String {
    format!("{}{sep}{}{sep}{}", a, b, c, sep = KEY_SEP)
}

fn key_prefix(part: &str) -> String {
    format!("{}{}", part, KEY_SEP)
}

fn collect_prefix(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    prefix: &str,
) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
    let mut end = prefix.to_string();
    end.push('\u{10ffff}');
    let mut out = Vec::new();
    for entry in table.range(prefix..end.as_str())? {
        let entry = entry?;
        out.push((entry.0.value().to_string(), entry.1.value().to_vec()));
    }
    Ok(out)
}

fn path_is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path == prefix || path.starts_with(&format!("{}/", prefix))
}

fn normalize_search(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn io_err(err: std::io::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<CommitError> for StoreError {
    fn from(err: CommitError) -> Self {
        StoreError::Storage(err.to_string())
    }
}
