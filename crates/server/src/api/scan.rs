use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use library::PruneSummary;

use crate::activity_store::ActivityEntry;
use crate::scan::start_scan;
use crate::state::{
    ActivityQuery, AppState, JsonResult, LibraryStatusResponse, ListResponse, PruneRequest,
    ScanRequest, ScanState,
};
use crate::utils::json_error;

use super::resolve_library;

pub async fn library_status(
    State(state): State<AppState>,
) -> JsonResult<Vec<LibraryStatusResponse>> {
    let libraries = state.catalog.libraries().map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", err),
        )
    })?;

    let scans = state.scans.read();
    let items = libraries
        .into_iter()
        .map(|library| {
            let (scan_state, started_at, summary, error) = match scans.get(&library.id) {
                Some(ScanState::Scanning { started, .. }) => {
                    ("scanning".to_string(), Some(*started), None, None)
                }
                Some(ScanState::Done(summary)) => {
                    ("idle".to_string(), None, Some(summary.clone()), None)
                }
                Some(ScanState::Failed(message)) => {
                    ("error".to_string(), None, None, Some(message.clone()))
                }
                None => ("idle".to_string(), None, None, None),
            };
            LibraryStatusResponse {
                library_id: library.id,
                name: library.name,
                path: library.path,
                state: scan_state,
                started_at,
                summary,
                error,
            }
        })
        .collect();
    Ok(Json(items))
}

pub async fn trigger_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> JsonResult<LibraryStatusResponse> {
    let library = resolve_library(&state, request.library_id.as_deref())?;
    if !std::path::Path::new(&library.path).is_dir() {
        return Err(json_error(
            StatusCode::CONFLICT,
            format!("library root not found: {}", library.path),
        ));
    }

    start_scan(state.clone(), library.clone(), request.full)
        .map_err(|message| json_error(StatusCode::CONFLICT, message))?;

    let scans = state.scans.read();
    let started_at = match scans.get(&library.id) {
        Some(ScanState::Scanning { started, .. }) => Some(*started),
        _ => None,
    };
    Ok(Json(LibraryStatusResponse {
        library_id: library.id,
        name: library.name,
        path: library.path,
        state: "scanning".to_string(),
        started_at,
        summary: None,
        error: None,
    }))
}

pub async fn trigger_prune(
    State(state): State<AppState>,
    Json(request): Json<PruneRequest>,
) -> JsonResult<PruneSummary> {
    let library = resolve_library(&state, request.library_id.as_deref())?;
    if state.scans.read().is_running(&library.id) {
        return Err(json_error(
            StatusCode::CONFLICT,
            format!("scan running for '{}'; retry after it finishes", library.name),
        ));
    }

    let retention_days = state.config.read().missing_retention_days;
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let summary = state
        .catalog
        .prune(&library.id, retention)
        .await
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("prune failed: {}", err),
            )
        })?;
    let _ = state.activity.add_event(
        "prune",
        format!(
            "Prune finished for '{}': removed {} tracks, {} folders.",
            library.name, summary.tracks_removed, summary.folders_removed
        ),
    );
    Ok(Json(summary))
}

pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> JsonResult<ListResponse<ActivityEntry>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0);
    let (items, total) = state
        .activity
        .list_events(limit, offset)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err))?;
    Ok(Json(ListResponse { items, total }))
}
