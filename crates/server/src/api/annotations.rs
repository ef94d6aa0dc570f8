use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use library::CatalogError;

use crate::state::{AppState, BookmarkRequest, RatingRequest};
use crate::utils::{json_error_response, json_ok_response};

fn ensure_track(state: &AppState, track_id: &str) -> Result<(), Response> {
    match state.catalog.track(track_id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(json_error_response(StatusCode::NOT_FOUND, "track not found")),
        Err(err) => Err(catalog_error(err)),
    }
}

fn catalog_error(err: CatalogError) -> Response {
    json_error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("catalog error: {}", err),
    )
}

pub async fn set_rating(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
    Json(request): Json<RatingRequest>,
) -> Response {
    if request.rating > 5 {
        return json_error_response(StatusCode::BAD_REQUEST, "rating must be 0-5");
    }
    if let Err(response) = ensure_track(&state, &track_id) {
        return response;
    }
    match state.catalog.set_rating(&track_id, request.rating) {
        Ok(()) => json_ok_response(),
        Err(err) => catalog_error(err),
    }
}

pub async fn add_star(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> Response {
    if let Err(response) = ensure_track(&state, &track_id) {
        return response;
    }
    match state.catalog.set_starred(&track_id, true) {
        Ok(()) => json_ok_response(),
        Err(err) => catalog_error(err),
    }
}

pub async fn remove_star(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> Response {
    if let Err(response) = ensure_track(&state, &track_id) {
        return response;
    }
    match state.catalog.set_starred(&track_id, false) {
        Ok(()) => json_ok_response(),
        Err(err) => catalog_error(err),
    }
}

pub async fn record_play(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
) -> Response {
    if let Err(response) = ensure_track(&state, &track_id) {
        return response;
    }
    match state.catalog.record_play(&track_id) {
        Ok(()) => json_ok_response(),
        Err(err) => catalog_error(err),
    }
}

pub async fn set_bookmark(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
    Json(request): Json<BookmarkRequest>,
) -> Response {
    if let Err(response) = ensure_track(&state, &track_id) {
        return response;
    }
    match state.catalog.set_bookmark(&track_id, request.position_ms) {
        Ok(()) => json_ok_response(),
        Err(err) => catalog_error(err),
    }
}
