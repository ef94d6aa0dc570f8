use std::collections::BTreeSet;

use common::{artist_id, now_millis, sort_name, Album, Artist, Participations};
use tracing::debug;

use crate::store::{StoreError, SyncStore};

/// Rebuilds the album rows for the given grouping keys from their current
/// non-missing tracks, then refreshes the artists those albums point at.
/// Tracks in two different directories with the same grouping key fold into
/// one album. Album-level fields that differ across tracks resolve
/// first-seen-wins, in track path order.
pub(crate) fn rebuild(
    store: &dyn SyncStore,
    album_ids: &BTreeSet<String>,
) -> Result<(), StoreError> {
    let mut touched_artists: BTreeSet<String> = BTreeSet::new();

    for id in album_ids {
        if let Some(existing) = store.get_album(id)? {
            touched_artists.insert(existing.artist_id);
        }

        let mut tracks = store.tracks_in_album(id)?;
        tracks.retain(|track| !track.missing);
        if tracks.is_empty() {
            store.delete_album(id)?;
            debug!(album = %id, "dropped empty album");
            continue;
        }
        tracks.sort_by(|a, b| a.path.cmp(&b.path));

        let first = &tracks[0];
        let artist = artist_id(&first.album_artist);
        let mut participations = Participations::new();
        let mut duration_ms = 0u64;
        let mut size = 0u64;
        let mut year = None;
        for track in &tracks {
            participations.merge(&track.participations);
            duration_ms += u64::from(track.duration_ms);
            size += track.size;
            if year.is_none() {
                year = track.year;
            }
        }

        let now = now_millis();
        let created_at = store
            .get_album(id)?
            .map(|album| album.created_at)
            .unwrap_or(now);
        store.upsert_album(&Album {
            id: id.clone(),
            library_id: first.library_id.clone(),
            name: first.album.clone(),
            sort_name: sort_name(&first.album),
            artist_id: artist.clone(),
            album_artist: first.album_artist.clone(),
            year,
            song_count: tracks.len(),
            duration_ms,
            size,
            participations,
            created_at,
            updated_at: now,
        })?;
        touched_artists.insert(artist);
    }

    for artist in touched_artists {
        let albums = store.albums_by_artist(&artist)?;
        if albums.is_empty() {
            store.delete_artist(&artist)?;
            continue;
        }
        let name = albums
            .iter()
            .map(|album| album.album_artist.clone())
            .next()
            .unwrap_or_default();
        store.upsert_artist(&Artist {
            id: artist.clone(),
            sort_name: sort_name(&name),
            name,
            album_count: albums.len(),
            song_count: albums.iter().map(|album| album.song_count).sum(),
        })?;
    }

    Ok(())
}
