mod mapper;

pub use mapper::{map_media_file, pid_from_tags};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::system_time_millis;
use lofty::error::LoftyError;
use lofty::prelude::{Accessor, AudioFile, ItemKey, TaggedFileExt};

/// Raw per-file extraction result: a tag multimap plus audio properties and
/// file timestamps. Tag names are lowercased, well-known names listed in
/// [`tag_names`].
#[derive(Debug, Default, Clone)]
pub struct RawTags {
    pub tags: BTreeMap<String, Vec<String>>,
    pub props: AudioProps,
    pub size: u64,
    pub modified: u64,
    /// Creation ("birth") time where the platform exposes one; falls back to
    /// the modification time.
    pub birth: u64,
}

#[derive(Debug, Default, Clone)]
pub struct AudioProps {
    pub duration_ms: u32,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bit_depth: Option<u8>,
}

impl RawTags {
    pub fn first(&self, name: &str) -> Option<&str> {
        self.tags
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, name: &str) -> &[String] {
        self.tags.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.tags.entry(name.to_string()).or_default().push(value);
    }
}

/// Well-known tag names in [`RawTags::tags`].
pub mod tag_names {
    pub const TITLE: &str = "title";
    pub const SORT_TITLE: &str = "sort_title";
    pub const ALBUM: &str = "album";
    pub const SORT_ALBUM: &str = "sort_album";
    pub const ARTIST: &str = "artist";
    pub const SORT_ARTIST: &str = "sort_artist";
    pub const ALBUM_ARTIST: &str = "album_artist";
    pub const SORT_ALBUM_ARTIST: &str = "sort_album_artist";
    pub const COMPOSER: &str = "composer";
    pub const CONDUCTOR: &str = "conductor";
    pub const LYRICIST: &str = "lyricist";
    pub const ARRANGER: &str = "arranger";
    pub const PRODUCER: &str = "producer";
    pub const DIRECTOR: &str = "director";
    pub const ENGINEER: &str = "engineer";
    pub const MIXER: &str = "mixer";
    pub const REMIXER: &str = "remixer";
    pub const DJ_MIXER: &str = "dj_mixer";
    pub const PERFORMER: &str = "performer";
    pub const TRACK: &str = "track";
    pub const DISC: &str = "disc";
    pub const YEAR: &str = "year";
    pub const DATE: &str = "date";
    pub const GENRE: &str = "genre";
    pub const COMMENT: &str = "comment";
    pub const MUSICBRAINZ_TRACK_ID: &str = "musicbrainz_trackid";
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
    UnknownExtractor(String),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
            MetadataError::UnknownExtractor(name) => write!(f, "unknown extractor: {}", name),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Batch tag extraction boundary. One result per requested path; a failing
/// path never fails its batch.
pub trait TagReader: Send + Sync {
    fn name(&self) -> &'static str;

    fn read_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<RawTags, MetadataError>)>;
}

/// Name-keyed extractor registry, passed explicitly to the scanner at
/// construction so tests can inject fakes.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    readers: HashMap<&'static str, Arc<dyn TagReader>>,
    default: Option<&'static str>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(reader: Arc<dyn TagReader>) -> Self {
        let mut registry = Self::new();
        registry.register_default(reader);
        registry
    }

    pub fn register(&mut self, reader: Arc<dyn TagReader>) {
        self.readers.insert(reader.name(), reader);
    }

    pub fn register_default(&mut self, reader: Arc<dyn TagReader>) {
        self.default = Some(reader.name());
        self.register(reader);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn TagReader>, MetadataError> {
        self.readers
            .get(name)
            .cloned()
            .ok_or_else(|| MetadataError::UnknownExtractor(name.to_string()))
    }

    /// Points the default at an already-registered reader.
    pub fn set_default(&mut self, name: &str) -> Result<(), MetadataError> {
        let reader = self.get(name)?;
        self.default = Some(reader.name());
        Ok(())
    }

    pub fn default_reader(&self) -> Result<Arc<dyn TagReader>, MetadataError> {
        let name = self
            .default
            .ok_or_else(|| MetadataError::UnknownExtractor("<default>".to_string()))?;
        self.get(name)
    }
}

/// lofty-backed reader used for real audio files.
pub struct LoftyReader;

impl TagReader for LoftyReader {
    fn name(&self) -> &'static str {
        "lofty"
    }

    fn read_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<RawTags, MetadataError>)> {
        paths
            .iter()
            .map(|path| (path.clone(), read_file(path)))
            .collect()
    }
}

fn read_file(path: &Path) -> Result<RawTags, MetadataError> {
    let meta = fs::metadata(path)?;
    let mut raw = RawTags {
        size: meta.len(),
        ..RawTags::default()
    };
    raw.modified = meta.modified().map(system_time_millis).unwrap_or(0);
    raw.birth = meta.created().map(system_time_millis).unwrap_or(raw.modified);

    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();
    let duration_ms = properties.duration().as_millis();
    if duration_ms > 0 {
        raw.props.duration_ms = duration_ms.min(u128::from(u32::MAX)) as u32;
    }
    raw.props.sample_rate = properties.sample_rate();
    raw.props.channels = properties.channels();
    raw.props.bit_depth = properties.bit_depth();
    raw.props.bit_rate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        use tag_names as t;
        let single = [
            (t::TITLE, ItemKey::TrackTitle),
            (t::SORT_TITLE, ItemKey::TrackTitleSortOrder),
            (t::ALBUM, ItemKey::AlbumTitle),
            (t::SORT_ALBUM, ItemKey::AlbumTitleSortOrder),
            (t::SORT_ARTIST, ItemKey::TrackArtistSortOrder),
            (t::SORT_ALBUM_ARTIST, ItemKey::AlbumArtistSortOrder),
            (t::TRACK, ItemKey::TrackNumber),
            (t::DISC, ItemKey::DiscNumber),
            (t::YEAR, ItemKey::Year),
            (t::DATE, ItemKey::RecordingDate),
            (t::COMMENT, ItemKey::Comment),
            (t::MUSICBRAINZ_TRACK_ID, ItemKey::MusicBrainzRecordingId),
        ];
        for (name, key) in single {
            if let Some(value) = tag.get_string(&key) {
                raw.push(name, value);
            }
        }

        let multi = [
            (t::ARTIST, ItemKey::TrackArtist),
            (t::ALBUM_ARTIST, ItemKey::AlbumArtist),
            (t::COMPOSER, ItemKey::Composer),
            (t::CONDUCTOR, ItemKey::Conductor),
            (t::LYRICIST, ItemKey::Lyricist),
            (t::ARRANGER, ItemKey::Arranger),
            (t::PRODUCER, ItemKey::Producer),
            (t::DIRECTOR, ItemKey::Director),
            (t::ENGINEER, ItemKey::Engineer),
            (t::MIXER, ItemKey::MixEngineer),
            (t::REMIXER, ItemKey::Remixer),
            (t::DJ_MIXER, ItemKey::MixDj),
            (t::PERFORMER, ItemKey::Performer),
        ];
        for (name, key) in multi {
            for value in tag.get_strings(&key) {
                raw.push(name, value);
            }
        }

        if let Some(value) = tag.genre() {
            for genre in split_multi(&value) {
                raw.push(t::GENRE, genre);
            }
        }
    }

    Ok(raw)
}

pub fn parse_u16(text: &str) -> Option<u16> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

pub fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

pub fn split_multi(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', ',', '/', '|', '\0'][..]) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(trimmed.to_string());
    }
    if out.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u16_handles_slash_totals() {
        assert_eq!(parse_u16("3/12"), Some(3));
        assert_eq!(parse_u16(" 7 "), Some(7));
        assert_eq!(parse_u16("x"), None);
    }

    #[test]
    fn parse_year_extracts_first_four_digits() {
        assert_eq!(parse_year("1966"), Some(1966));
        assert_eq!(parse_year("1966-08-05"), Some(1966));
        assert_eq!(parse_year("released 1999"), Some(1999));
        assert_eq!(parse_year("n/a"), None);
    }

    #[test]
    fn split_multi_splits_on_common_separators() {
        assert_eq!(split_multi("Rock; Pop"), vec!["Rock", "Pop"]);
        assert_eq!(split_multi("Jazz"), vec!["Jazz"]);
        assert!(split_multi("  ").is_empty());
    }

    #[test]
    fn registry_resolves_by_name_and_fails_loudly() {
        let registry = ExtractorRegistry::with_default(Arc::new(LoftyReader));
        assert!(registry.get("lofty").is_ok());
        assert!(registry.default_reader().is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(MetadataError::UnknownExtractor(_))
        ));
    }
}
