use std::collections::{BTreeMap, HashMap};

use common::{path_join, MediaFile};

use crate::walker::FileEntry;

/// Classification of one folder's live listing against its DB snapshot.
#[derive(Debug, Default)]
pub struct FolderDiff {
    /// File names that need (re)extraction.
    pub to_import: Vec<String>,
    /// File names present and up to date.
    pub unchanged: Vec<String>,
    /// Snapshot rows with no corresponding file on disk.
    pub missing: Vec<MediaFile>,
}

impl FolderDiff {
    pub fn is_empty(&self) -> bool {
        self.to_import.is_empty() && self.missing.is_empty()
    }
}

/// Pure per-folder comparison. A file is (re)imported when it is new, when
/// its stored row is flagged missing (restore), when its mtime is strictly
/// newer than the stored `updated_at`, or unconditionally on a full rescan.
/// Rows whose file names are in `skip` (listing failures) are left alone
/// entirely so a transient read error never soft-deletes a track.
pub fn diff_folder(
    folder_path: &str,
    files: &BTreeMap<String, FileEntry>,
    skip: &[(String, String)],
    snapshot: &[MediaFile],
    full_rescan: bool,
) -> FolderDiff {
    let mut db_rows: HashMap<&str, &MediaFile> = snapshot
        .iter()
        .map(|row| (row.path.as_str(), row))
        .collect();

    let mut diff = FolderDiff::default();
    for (name, entry) in files {
        let full_path = path_join(folder_path, name);
        match db_rows.remove(full_path.as_str()) {
            None => diff.to_import.push(name.clone()),
            Some(row) => {
                if full_rescan || row.missing || entry.modified > row.updated_at {
                    diff.to_import.push(name.clone());
                } else {
                    diff.unchanged.push(name.clone());
                }
            }
        }
    }

    for (name, _) in skip {
        db_rows.remove(path_join(folder_path, name).as_str());
    }

    diff.missing = db_rows
        .into_values()
        .filter(|row| !row.missing)
        .cloned()
        .collect();
    diff.missing.sort_by(|a, b| a.path.cmp(&b.path));
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{track_id, Participations};

    fn entry(name: &str, modified: u64) -> (String, FileEntry) {
        (
            name.to_string(),
            FileEntry {
                name: name.to_string(),
                modified,
                size: 1,
            },
        )
    }

    fn row(folder: &str, name: &str, updated_at: u64, missing: bool) -> MediaFile {
        let path = path_join(folder, name);
        MediaFile {
            id: track_id("lib", &path),
            pid: track_id("lib", &path),
            library_id: "lib".to_string(),
            folder_id: "folder".to_string(),
            path,
            title: name.to_string(),
            sort_title: name.to_lowercase(),
            album: String::new(),
            album_id: String::new(),
            artist: String::new(),
            album_artist: String::new(),
            sort_artist: String::new(),
            sort_album_artist: String::new(),
            sort_album: String::new(),
            track_no: None,
            disc_no: None,
            year: None,
            duration_ms: 0,
            bit_rate: None,
            sample_rate: None,
            channels: None,
            bit_depth: None,
            size: 1,
            suffix: "mp3".to_string(),
            tags: Vec::new(),
            participations: Participations::new(),
            missing,
            created_at: 100,
            updated_at,
            birth_time: 100,
        }
    }

    #[test]
    fn new_files_are_imported() {
        let files = BTreeMap::from([entry("a.mp3", 10)]);
        let diff = diff_folder("A", &files, &[], &[], false);
        assert_eq!(diff.to_import, ["a.mp3"]);
        assert!(diff.unchanged.is_empty());
        assert!(diff.missing.is_empty());
    }

    #[test]
    fn unchanged_files_are_left_alone() {
        let files = BTreeMap::from([entry("a.mp3", 10)]);
        let snapshot = [row("A", "a.mp3", 10, false)];
        let diff = diff_folder("A", &files, &[], &snapshot, false);
        assert!(diff.to_import.is_empty());
        assert_eq!(diff.unchanged, ["a.mp3"]);
        assert!(diff.is_empty());
    }

    #[test]
    fn newer_mtime_triggers_reimport() {
        let files = BTreeMap::from([entry("a.mp3", 11)]);
        let snapshot = [row("A", "a.mp3", 10, false)];
        let diff = diff_folder("A", &files, &[], &snapshot, false);
        assert_eq!(diff.to_import, ["a.mp3"]);
    }

    #[test]
    fn equal_mtime_does_not_reimport() {
        let files = BTreeMap::from([entry("a.mp3", 10)]);
        let snapshot = [row("A", "a.mp3", 10, false)];
        let diff = diff_folder("A", &files, &[], &snapshot, false);
        assert!(diff.to_import.is_empty());
    }

    #[test]
    fn full_rescan_overrides_mtime() {
        let files = BTreeMap::from([entry("a.mp3", 5)]);
        let snapshot = [row("A", "a.mp3", 10, false)];
        let diff = diff_folder("A", &files, &[], &snapshot, true);
        assert_eq!(diff.to_import, ["a.mp3"]);
    }

    #[test]
    fn missing_row_with_present_file_is_restored() {
        let files = BTreeMap::from([entry("a.mp3", 5)]);
        let snapshot = [row("A", "a.mp3", 10, true)];
        let diff = diff_folder("A", &files, &[], &snapshot, false);
        assert_eq!(diff.to_import, ["a.mp3"]);
    }

    #[test]
    fn rows_without_files_become_missing_candidates() {
        let files = BTreeMap::from([entry("a.mp3", 10)]);
        let snapshot = [row("A", "a.mp3", 10, false), row("A", "b.mp3", 10, false)];
        let diff = diff_folder("A", &files, &[], &snapshot, false);
        assert_eq!(diff.missing.len(), 1);
        assert_eq!(diff.missing[0].path, "A/b.mp3");
    }

    #[test]
    fn already_missing_rows_are_not_remarked() {
        let files = BTreeMap::new();
        let snapshot = [row("A", "b.mp3", 10, true)];
        let diff = diff_folder("A", &files, &[], &snapshot, false);
        assert!(diff.missing.is_empty());
        assert!(diff.is_empty());
    }

    #[test]
    fn stat_failures_shield_their_rows() {
        let files = BTreeMap::new();
        let skip = [("b.mp3".to_string(), "permission denied".to_string())];
        let snapshot = [row("A", "b.mp3", 10, false)];
        let diff = diff_folder("A", &files, &skip, &snapshot, false);
        assert!(diff.missing.is_empty());
        assert!(diff.to_import.is_empty());
    }
}
