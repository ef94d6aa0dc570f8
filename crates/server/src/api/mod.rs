pub mod annotations;
pub mod browse;
pub mod scan;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Library;

use crate::state::{AppState, ErrorResponse, HealthResponse};
use crate::utils::json_error;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/library/status", get(scan::library_status))
        .route("/library/scan", post(scan::trigger_scan))
        .route("/library/prune", post(scan::trigger_prune))
        .route("/activity", get(scan::list_activity))
        .route("/browse/folders", get(browse::list_folders))
        .route("/browse/folders/:folder_id/tracks", get(browse::list_folder_tracks))
        .route("/browse/albums", get(browse::list_albums))
        .route("/browse/albums/:album_id/tracks", get(browse::list_album_tracks))
        .route("/browse/artists", get(browse::list_artists))
        .route("/browse/tracks/:track_id", get(browse::get_track))
        .route("/tracks/:track_id/rating", post(annotations::set_rating))
        .route(
            "/tracks/:track_id/star",
            post(annotations::add_star).delete(annotations::remove_star),
        )
        .route("/tracks/:track_id/played", post(annotations::record_play))
        .route("/tracks/:track_id/bookmark", post(annotations::set_bookmark))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Resolves the target library for requests that may omit `library_id` when
/// only one library is configured.
pub(crate) fn resolve_library(
    state: &AppState,
    library_id: Option<&str>,
) -> Result<Library, (StatusCode, Json<ErrorResponse>)> {
    match library_id {
        Some(id) => match state.catalog.library(id) {
            Ok(Some(library)) => Ok(library),
            Ok(None) => Err(json_error(StatusCode::NOT_FOUND, "library not found")),
            Err(err) => Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("catalog error: {}", err),
            )),
        },
        None => {
            let libraries = state.catalog.libraries().map_err(|err| {
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("catalog error: {}", err),
                )
            })?;
            let mut libraries = libraries;
            match libraries.len() {
                0 => Err(json_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "no libraries configured",
                )),
                1 => Ok(libraries.remove(0)),
                _ => Err(json_error(
                    StatusCode::BAD_REQUEST,
                    "library_id is required when several libraries are configured",
                )),
            }
        }
    }
}
