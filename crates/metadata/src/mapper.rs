use common::{
    album_id, artist_id, sort_name, stable_id, track_id, ArtistRef, MediaFile, Participations,
    Role, Tag, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
};

use crate::tag_names as t;
use crate::{parse_u16, parse_year, RawTags};

/// Tag fields feeding each secondary role. Artist and album-artist roles are
/// handled separately because of their fallback rules.
const ROLE_FIELDS: [(Role, &str, Option<&str>); 11] = [
    (Role::Composer, t::COMPOSER, None),
    (Role::Conductor, t::CONDUCTOR, None),
    (Role::Lyricist, t::LYRICIST, None),
    (Role::Arranger, t::ARRANGER, None),
    (Role::Producer, t::PRODUCER, None),
    (Role::Director, t::DIRECTOR, None),
    (Role::Engineer, t::ENGINEER, None),
    (Role::Mixer, t::MIXER, None),
    (Role::Remixer, t::REMIXER, None),
    (Role::DjMixer, t::DJ_MIXER, None),
    (Role::Performer, t::PERFORMER, None),
];

/// Maps one extracted file into a domain entity. Pure: the same raw input
/// always yields the same entity, which is what makes skipping unchanged
/// files safe.
pub fn map_media_file(library_id: &str, folder_id: &str, path: &str, raw: &RawTags) -> MediaFile {
    let title = raw
        .first(t::TITLE)
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(path));
    let sort_title = raw
        .first(t::SORT_TITLE)
        .map(|value| value.to_lowercase())
        .unwrap_or_else(|| sort_name(&title));

    let artists = parse_artists(raw, t::ARTIST, t::SORT_ARTIST);
    let artists = if artists.is_empty() {
        vec![unknown_artist()]
    } else {
        artists
    };
    let album_artists = parse_artists(raw, t::ALBUM_ARTIST, t::SORT_ALBUM_ARTIST);
    let album_artists = if album_artists.is_empty() {
        artists.clone()
    } else {
        album_artists
    };

    let mut participations = Participations::new();
    participations.add(Role::Artist, artists.iter().cloned());
    participations.add(Role::AlbumArtist, album_artists.iter().cloned());
    for (role, field, sort_field) in ROLE_FIELDS {
        let refs = parse_artists(raw, field, sort_field.unwrap_or(field));
        participations.add(role, refs);
    }

    let album = raw
        .first(t::ALBUM)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
    let sort_album = raw
        .first(t::SORT_ALBUM)
        .map(|value| value.to_lowercase())
        .unwrap_or_else(|| sort_name(&album));

    let year = raw
        .first(t::YEAR)
        .and_then(parse_year)
        .or_else(|| raw.first(t::DATE).and_then(parse_year));
    let track_no = raw.first(t::TRACK).and_then(parse_u16);
    let disc_no = raw.first(t::DISC).and_then(parse_u16);

    let artist_display = artists[0].name.clone();
    let album_artist_display = album_artists[0].name.clone();

    let mut tags = Vec::new();
    for (name, values) in &raw.tags {
        for value in values {
            let tag = Tag::new(name, value);
            if !tags.iter().any(|existing: &Tag| existing.id == tag.id) {
                tags.push(tag);
            }
        }
    }

    let id = track_id(library_id, path);
    let pid = pid_from_tags(raw, &artists[0].sort_name, &album, &title, disc_no, track_no);

    MediaFile {
        id,
        pid,
        library_id: library_id.to_string(),
        folder_id: folder_id.to_string(),
        path: path.to_string(),
        sort_title,
        album_id: album_id(library_id, &album, &album_artist_display, year),
        artist: artist_display,
        album_artist: album_artist_display,
        sort_artist: artists[0].sort_name.clone(),
        sort_album_artist: album_artists[0].sort_name.clone(),
        sort_album,
        title,
        album,
        track_no,
        disc_no,
        year,
        duration_ms: raw.props.duration_ms,
        bit_rate: raw.props.bit_rate,
        sample_rate: raw.props.sample_rate,
        channels: raw.props.channels,
        bit_depth: raw.props.bit_depth,
        size: raw.size,
        suffix: file_suffix(path),
        tags,
        participations,
        missing: false,
        created_at: 0,
        updated_at: 0,
        birth_time: raw.birth,
    }
}

/// Content-derived persistent identity: independent of the file path, so a
/// moved or renamed file keeps its identity. A MusicBrainz recording id wins
/// outright when tagged.
pub fn pid_from_tags(
    raw: &RawTags,
    sort_artist: &str,
    album: &str,
    title: &str,
    disc_no: Option<u16>,
    track_no: Option<u16>,
) -> String {
    if let Some(mbid) = raw.first(t::MUSICBRAINZ_TRACK_ID) {
        let mbid = mbid.trim();
        if !mbid.is_empty() {
            return stable_id(&format!("pid\x1fmbz\x1f{}", mbid.to_lowercase()));
        }
    }
    stable_id(&format!(
        "pid\x1f{}\x1f{}\x1f{}\x1f{}\x1f{}\x1f{}",
        sort_artist,
        album.trim().to_lowercase(),
        title.trim().to_lowercase(),
        disc_no.unwrap_or(0),
        track_no.unwrap_or(0),
        raw.props.duration_ms / 1000,
    ))
}

fn parse_artists(raw: &RawTags, name_field: &str, sort_field: &str) -> Vec<ArtistRef> {
    let names = raw.all(name_field);
    let sorts = raw.all(sort_field);
    let mut refs = Vec::new();
    for (index, name) in names.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let sort = sorts
            .get(index)
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| sort_name(name));
        let artist = ArtistRef {
            id: artist_id(name),
            name: name.to_string(),
            sort_name: sort,
        };
        if !refs.iter().any(|existing: &ArtistRef| existing.id == artist.id) {
            refs.push(artist);
        }
    }
    refs
}

fn unknown_artist() -> ArtistRef {
    ArtistRef {
        id: artist_id(UNKNOWN_ARTIST),
        name: UNKNOWN_ARTIST.to_string(),
        sort_name: sort_name(UNKNOWN_ARTIST),
    }
}

fn file_stem(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

fn file_suffix(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, suffix)) if !stem.is_empty() => suffix.to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_names as t;

    fn raw_with(pairs: &[(&str, &str)]) -> RawTags {
        let mut raw = RawTags::default();
        for (name, value) in pairs {
            raw.push(name, *value);
        }
        raw.props.duration_ms = 200_000;
        raw.size = 4096;
        raw.modified = 1_700_000_000;
        raw.birth = 1_600_000_000;
        raw
    }

    #[test]
    fn mapping_is_deterministic() {
        let raw = raw_with(&[
            (t::TITLE, "Taxman"),
            (t::ALBUM, "Revolver"),
            (t::ARTIST, "The Beatles"),
            (t::TRACK, "1"),
            (t::YEAR, "1966"),
        ]);
        let a = map_media_file("lib", "folder", "The Beatles/Revolver/01.mp3", &raw);
        let b = map_media_file("lib", "folder", "The Beatles/Revolver/01.mp3", &raw);
        assert_eq!(a.pid, b.pid);
        assert_eq!(a.album_id, b.album_id);
        assert_eq!(a.tags, b.tags);
        assert_eq!(a.participations, b.participations);
    }

    #[test]
    fn missing_artist_uses_sentinel() {
        let raw = raw_with(&[(t::TITLE, "Orphan")]);
        let file = map_media_file("lib", "folder", "x/Orphan.mp3", &raw);
        assert_eq!(file.artist, UNKNOWN_ARTIST);
        assert_eq!(file.album_artist, UNKNOWN_ARTIST);
        assert_eq!(file.album, UNKNOWN_ALBUM);
    }

    #[test]
    fn album_artist_falls_back_to_track_artists() {
        let raw = raw_with(&[(t::TITLE, "Song"), (t::ARTIST, "Solo Act")]);
        let file = map_media_file("lib", "folder", "x/Song.mp3", &raw);
        assert_eq!(file.album_artist, "Solo Act");
        let album_artists = file.participations.get(Role::AlbumArtist);
        assert_eq!(album_artists.len(), 1);
        assert_eq!(album_artists[0].name, "Solo Act");
    }

    #[test]
    fn pid_is_path_independent_but_tag_sensitive() {
        let raw = raw_with(&[
            (t::TITLE, "Taxman"),
            (t::ALBUM, "Revolver"),
            (t::ARTIST, "The Beatles"),
            (t::TRACK, "1"),
        ]);
        let at_a = map_media_file("lib", "fa", "A/album1/track1.mp3", &raw);
        let at_b = map_media_file("lib", "fb", "B/album1/track1.mp3", &raw);
        assert_ne!(at_a.id, at_b.id);
        assert_eq!(at_a.pid, at_b.pid);

        let mut retitled = raw.clone();
        retitled.tags.insert(t::TITLE.to_string(), vec!["Taxman 2".into()]);
        let other = map_media_file("lib", "fa", "A/album1/track1.mp3", &retitled);
        assert_ne!(at_a.pid, other.pid);
    }

    #[test]
    fn musicbrainz_id_dominates_pid() {
        let tagged = raw_with(&[
            (t::TITLE, "One"),
            (t::MUSICBRAINZ_TRACK_ID, "ABC-123"),
        ]);
        let retagged = raw_with(&[
            (t::TITLE, "Completely Different"),
            (t::MUSICBRAINZ_TRACK_ID, "abc-123"),
        ]);
        let a = map_media_file("lib", "f", "x/one.mp3", &tagged);
        let b = map_media_file("lib", "f", "y/two.mp3", &retagged);
        assert_eq!(a.pid, b.pid);
    }

    #[test]
    fn secondary_roles_come_from_their_tag_fields() {
        let raw = raw_with(&[
            (t::TITLE, "Song"),
            (t::ARTIST, "Band"),
            (t::COMPOSER, "Carla Composer"),
            (t::PRODUCER, "Pat Producer"),
            (t::DJ_MIXER, "DJ Dee"),
        ]);
        let file = map_media_file("lib", "f", "x/song.mp3", &raw);
        assert_eq!(file.participations.get(Role::Composer)[0].name, "Carla Composer");
        assert_eq!(file.participations.get(Role::Producer)[0].name, "Pat Producer");
        assert_eq!(file.participations.get(Role::DjMixer)[0].name, "DJ Dee");
        assert!(file.participations.get(Role::Conductor).is_empty());
    }

    #[test]
    fn every_role_has_a_tag_field() {
        for role in Role::ALL {
            let covered = matches!(role, Role::Artist | Role::AlbumArtist)
                || ROLE_FIELDS.iter().any(|(entry, _, _)| *entry == role);
            assert!(covered, "role {} has no tag field mapping", role);
        }
    }

    #[test]
    fn tags_deduplicate_by_name_and_value() {
        let mut raw = raw_with(&[(t::TITLE, "Song")]);
        raw.push(t::GENRE, "Rock");
        raw.push(t::GENRE, "Rock");
        raw.push(t::GENRE, "Pop");
        let file = map_media_file("lib", "f", "x/song.mp3", &raw);
        let genre_tags: Vec<_> = file
            .tags
            .iter()
            .filter(|tag| tag.name == t::GENRE)
            .collect();
        assert_eq!(genre_tags.len(), 2);
    }
}
