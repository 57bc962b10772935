//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{QueryResponse, ScanCache, ScanQuery};
use crate::progress::ScanProgressStream;
use crate::types::{Region, ScanProgressBatch};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub cache: ScanCache,
    pub progress: ScanProgressStream,
}

impl ApiState {
    pub fn new(cache: ScanCache, progress: ScanProgressStream) -> Self {
        Self { cache, progress }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStatus {
    pub region: Region,
    pub scanned_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    /// Within the cache's max age, so included in `/api/scan`.
    pub fresh: bool,
    pub opportunities: usize,
    pub sports_scanned: u64,
    pub sports_total: u64,
    pub remaining_credits: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressParams {
    pub after: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub scan_id: Uuid,
    pub batches: Vec<ScanProgressBatch>,
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Store(anyhow::Error),
    NotFound(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Store(err) => {
                tracing::error!(error = %err, "Store error while serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/scan
pub async fn get_scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> Result<Json<QueryResponse>, ApiError> {
    let merged = state.cache.get_merged_scan(state.cache.max_age_secs()).await?;
    Ok(Json(query.apply(merged, Utc::now())))
}

/// GET /api/regions
pub async fn get_regions(State(state): State<AppState>) -> Result<Json<Vec<RegionStatus>>, ApiError> {
    let now = Utc::now();
    let max_age = state.cache.max_age_secs();
    let scans = state.cache.store().region_scans().await?;

    let statuses = Region::ALL
        .iter()
        .map(|&region| match scans.iter().find(|(r, _)| *r == region) {
            Some((_, data)) => {
                let age = data.age_secs(now);
                RegionStatus {
                    region,
                    scanned_at: Some(data.scanned_at),
                    age_secs: Some(age),
                    fresh: data.is_fresh(now, max_age),
                    opportunities: data.results.len(),
                    sports_scanned: data.stats.sports_scanned,
                    sports_total: data.stats.sports_total,
                    remaining_credits: data.remaining_credits,
                }
            }
            None => RegionStatus {
                region,
                scanned_at: None,
                age_secs: None,
                fresh: false,
                opportunities: 0,
                sports_scanned: 0,
                sports_total: 0,
                remaining_credits: None,
            },
        })
        .collect();

    Ok(Json(statuses))
}

/// GET /api/progress/:scan_id?after=N
pub async fn get_progress(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
    Query(params): Query<ProgressParams>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let batches = state.progress.since(scan_id, params.after).await?;

    // With no cursor an empty result means the scan is unknown or expired.
    if batches.is_empty() && params.after.is_none() {
        return Err(ApiError::NotFound(format!("No progress for scan {scan_id}")));
    }

    let complete = batches.last().map_or(false, |b| b.is_last_batch);
    Ok(Json(ProgressResponse {
        scan_id,
        batches,
        complete,
    }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
