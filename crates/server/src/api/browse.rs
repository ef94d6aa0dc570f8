use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use common::{Album, Artist, Folder, MediaFile};

use crate::state::{AppState, BrowseQuery, FolderQuery, JsonResult, ListResponse};
use crate::utils::json_error;

use super::resolve_library;

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 500;

pub async fn list_folders(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> JsonResult<Vec<Folder>> {
    let library = resolve_library(&state, query.library_id.as_deref())?;
    let folders = state
        .catalog
        .folder_children(&library.id, query.parent.as_deref())
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("catalog error: {}", err),
            )
        })?;
    Ok(Json(folders))
}

pub async fn list_folder_tracks(
    State(state): State<AppState>,
    AxumPath(folder_id): AxumPath<String>,
) -> JsonResult<Vec<MediaFile>> {
    let tracks = state.catalog.folder_tracks(&folder_id).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", err),
        )
    })?;
    Ok(Json(tracks))
}

pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> JsonResult<ListResponse<Album>> {
    let library = resolve_library(&state, query.library_id.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = query.offset.unwrap_or(0);
    let (items, total) = state
        .catalog
        .albums(&library.id, query.search.as_deref(), limit, offset)
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("catalog error: {}", err),
            )
        })?;
    Ok(Json(ListResponse { items, total }))
}

pub async fn list_album_tracks(
    State(state): State<AppState>,
    AxumPath(album_id): AxumPath<String>,
) -> JsonResult<Vec<MediaFile>> {
    let tracks = state.catalog.album_tracks(&album_id).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", err),
        )
    })?;
    Ok(Json(tracks))
}

pub async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> JsonResult<ListResponse<Artist>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = query.offset.unwrap_or(0);
    let (items, total) = state
        .catalog
        .artists(query.search.as_deref(), limit, offset)
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("catalog error: {}", err),
            )
        })?;
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_track(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> JsonResult<MediaFile> {
    let track = state
        .catalog
        .track(&track_id)
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("catalog error: {}", err),
            )
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "track not found"))?;
    Ok(Json(track))
}
