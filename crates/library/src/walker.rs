use std::collections::BTreeMap;
use std::path::Path;

use common::{relpath_from, system_time_millis};
use tracing::warn;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "m4b", "aac", "ogg", "opus", "wav", "wma", "aiff", "alac", "ape",
];

#[derive(Clone, Debug)]
pub struct FileEntry {
    pub name: String,
    pub modified: u64,
    pub size: u64,
}

/// One unit of scan work: a directory, its audio files, and whatever went
/// wrong while listing them.
#[derive(Clone, Debug)]
pub struct FolderUnit {
    /// Library-relative path; "" is the root itself.
    pub path: String,
    pub name: String,
    pub files: BTreeMap<String, FileEntry>,
    pub file_errors: Vec<(String, String)>,
}

impl FolderUnit {
    fn new(path: String, name: String) -> Self {
        Self {
            path,
            name,
            files: BTreeMap::new(),
            file_errors: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub units: Vec<FolderUnit>,
    /// Directories that could not be listed: (path, message).
    pub errors: Vec<(String, String)>,
}

pub fn is_audio_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_lowercase();
            AUDIO_EXTENSIONS.iter().any(|known| *known == ext)
        }
        _ => false,
    }
}

/// Enumerates every directory under `root` into folder units. File stat
/// failures land on their unit; unreadable directories land in `errors` and
/// do not abort the walk.
pub fn walk_library(root: &Path) -> WalkOutcome {
    let mut units: BTreeMap<String, FolderUnit> = BTreeMap::new();
    let mut errors = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .and_then(|p| relpath_from(root, p))
                    .unwrap_or_default();
                warn!("walk error under {:?}: {}", path, err);
                errors.push((path, err.to_string()));
                continue;
            }
        };

        let Some(rel) = relpath_from(root, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            let name = if rel.is_empty() {
                ".".to_string()
            } else {
                entry.file_name().to_string_lossy().to_string()
            };
            units
                .entry(rel.clone())
                .or_insert_with(|| FolderUnit::new(rel, name));
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !is_audio_file(&file_name) {
            continue;
        }

        let parent = common::parent_path(&rel).unwrap_or_default();
        let unit = units.entry(parent.clone()).or_insert_with(|| {
            let name = if parent.is_empty() {
                ".".to_string()
            } else {
                parent.rsplit('/').next().unwrap_or(&parent).to_string()
            };
            FolderUnit::new(parent.clone(), name)
        });

        match entry.metadata() {
            Ok(meta) => {
                let modified = meta.modified().map(system_time_millis).unwrap_or(0);
                unit.files.insert(
                    file_name.clone(),
                    FileEntry {
                        name: file_name,
                        modified,
                        size: meta.len(),
                    },
                );
            }
            Err(err) => {
                warn!("stat failed for {:?}: {}", rel, err);
                unit.file_errors.push((file_name, err.to_string()));
            }
        }
    }

    WalkOutcome {
        units: units.into_values().collect(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn audio_extension_filter() {
        assert!(is_audio_file("track.mp3"));
        assert!(is_audio_file("track.FLAC"));
        assert!(!is_audio_file("cover.jpg"));
        assert!(!is_audio_file(".mp3"));
        assert!(!is_audio_file("notes"));
    }

    #[test]
    fn walk_collects_units_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("A/album1")).unwrap();
        fs::create_dir_all(root.join("A/empty")).unwrap();
        fs::write(root.join("A/album1/track1.mp3"), b"x").unwrap();
        fs::write(root.join("A/album1/cover.jpg"), b"x").unwrap();

        let outcome = walk_library(root);
        assert!(outcome.errors.is_empty());
        let paths: Vec<&str> = outcome.units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, ["", "A", "A/album1", "A/empty"]);

        let album = outcome
            .units
            .iter()
            .find(|unit| unit.path == "A/album1")
            .unwrap();
        assert_eq!(album.files.len(), 1);
        assert!(album.files.contains_key("track1.mp3"));
        assert_eq!(album.name, "album1");

        let root_unit = outcome.units.iter().find(|unit| unit.path.is_empty()).unwrap();
        assert_eq!(root_unit.name, ".");
    }
}
