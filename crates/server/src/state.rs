use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use library::{Catalog, ScanSummary};
use notify::RecommendedWatcher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::activity_store::ActivityStore;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub activity: ActivityStore,
    pub watchers: Arc<RwLock<Vec<RecommendedWatcher>>>,
    pub scans: Arc<RwLock<ScanRegistry>>,
}

/// Per-library scan bookkeeping. A library never has two scans in flight;
/// different libraries may.
#[derive(Default)]
pub struct ScanRegistry {
    states: HashMap<String, ScanState>,
}

#[derive(Clone)]
pub enum ScanState {
    Scanning {
        started: u64,
        cancel: CancellationToken,
    },
    Done(ScanSummary),
    Failed(String),
}

impl ScanRegistry {
    pub fn is_running(&self, library_id: &str) -> bool {
        matches!(self.states.get(library_id), Some(ScanState::Scanning { .. }))
    }

    pub fn get(&self, library_id: &str) -> Option<&ScanState> {
        self.states.get(library_id)
    }

    pub fn set(&mut self, library_id: String, state: ScanState) {
        self.states.insert(library_id, state);
    }

    pub fn cancel_all(&self) {
        for state in self.states.values() {
            if let ScanState::Scanning { cancel, .. } = state {
                cancel.cancel();
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct LibraryStatusResponse {
    pub library_id: String,
    pub name: String,
    pub path: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub library_id: Option<String>,
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Deserialize)]
pub struct PruneRequest {
    pub library_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub library_id: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    pub library_id: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
}

#[derive(Debug, Deserialize)]
pub struct BookmarkRequest {
    pub position_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
