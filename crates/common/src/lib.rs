mod participations;

pub use participations::{ArtistRef, Participations, Role, RoleParseError};

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
    pub path: String,
    pub last_scan_started_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub library_id: String,
    /// Path relative to the library root; the root folder itself is "".
    pub path: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub missing: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: String,
    /// Persistent identity: content-derived, stable across moves and renames.
    /// Defaults to `id` until extraction succeeds.
    pub pid: String,
    pub library_id: String,
    pub folder_id: String,
    pub path: String,
    pub title: String,
    pub sort_title: String,
    pub album: String,
    pub album_id: String,
    pub artist: String,
    pub album_artist: String,
    pub sort_artist: String,
    pub sort_album_artist: String,
    pub sort_album: String,
    pub track_no: Option<u16>,
    pub disc_no: Option<u16>,
    pub year: Option<i32>,
    pub duration_ms: u32,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bit_depth: Option<u8>,
    pub size: u64,
    pub suffix: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub participations: Participations,
    pub missing: bool,
    pub created_at: u64,
    pub updated_at: u64,
    pub birth_time: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            id: tag_id(name, value),
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Annotation {
    pub play_count: u32,
    pub play_date: Option<u64>,
    pub rating: u8,
    pub starred: bool,
    pub starred_at: Option<u64>,
    pub bookmark_ms: Option<u64>,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.play_count == 0 && self.rating == 0 && !self.starred && self.bookmark_ms.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub library_id: String,
    pub name: String,
    pub sort_name: String,
    pub artist_id: String,
    pub album_artist: String,
    pub year: Option<i32>,
    pub song_count: usize,
    pub duration_ms: u64,
    pub size: u64,
    #[serde(default)]
    pub participations: Participations,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub sort_name: String,
    pub album_count: usize,
    pub song_count: usize,
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

const ID_SEP: char = '\x1f';

pub fn library_id(name: &str) -> String {
    stable_id(&format!("library{}{}", ID_SEP, name))
}

pub fn folder_id(library_id: &str, path: &str) -> String {
    stable_id(&format!("folder{sep}{library_id}{sep}{path}", sep = ID_SEP))
}

pub fn track_id(library_id: &str, path: &str) -> String {
    stable_id(&format!("track{sep}{library_id}{sep}{path}", sep = ID_SEP))
}

pub fn tag_id(name: &str, value: &str) -> String {
    stable_id(&format!(
        "tag{sep}{}{sep}{}",
        name.trim().to_lowercase(),
        value.trim(),
        sep = ID_SEP
    ))
}

pub fn artist_id(name: &str) -> String {
    stable_id(&format!("artist{}{}", ID_SEP, name.trim().to_lowercase()))
}

pub fn album_id(library_id: &str, name: &str, album_artist: &str, year: Option<i32>) -> String {
    stable_id(&format!(
        "album{sep}{library_id}{sep}{}{sep}{}{sep}{}",
        name.trim().to_lowercase(),
        sort_name(album_artist),
        year.unwrap_or(0),
        sep = ID_SEP
    ))
}

/// Sort key: lowercased, leading English article removed.
pub fn sort_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    for article in ["the ", "a ", "an "] {
        if let Some(rest) = lower.strip_prefix(article) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    lower
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

/// Parent of a relative path; the root ("") has none.
pub fn parent_path(relpath: &str) -> Option<String> {
    if relpath.is_empty() {
        return None;
    }
    match relpath.rsplit_once('/') {
        Some((parent, _)) => Some(parent.to_string()),
        None => Some(String::new()),
    }
}

pub fn path_join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Timestamps are unix milliseconds throughout; second resolution is too
/// coarse to order a scan's own writes against its start time.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

pub fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic() {
        let first = stable_id("Artist/Album/Track.mp3");
        let second = stable_id("Artist/Album/Track.mp3");
        assert_eq!(first, second);
        assert_ne!(first, stable_id("Artist/Album/Track2.mp3"));
    }

    #[test]
    fn track_and_folder_ids_do_not_collide() {
        assert_ne!(track_id("lib", "A/b"), folder_id("lib", "A/b"));
    }

    #[test]
    fn parent_path_walks_up_to_root() {
        assert_eq!(parent_path("A/album1/x"), Some("A/album1".to_string()));
        assert_eq!(parent_path("A"), Some(String::new()));
        assert_eq!(parent_path(""), None);
    }

    #[test]
    fn sort_name_strips_leading_article() {
        assert_eq!(sort_name("The Beatles"), "beatles");
        assert_eq!(sort_name("A Perfect Circle"), "perfect circle");
        assert_eq!(sort_name("Them"), "them");
        assert_eq!(sort_name("The "), "the");
    }

    #[test]
    fn album_id_ignores_directory_layout() {
        let a = album_id("lib", "Revolver", "The Beatles", Some(1966));
        let b = album_id("lib", "revolver", "the beatles", Some(1966));
        assert_eq!(a, b);
        assert_ne!(a, album_id("lib", "Revolver", "The Beatles", Some(2009)));
    }
}
