//! HTTP API: Axum server over the merged scan and progress stream.
//!
//! CORS enabled for browser consumers.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{ApiState, AppState};

/// Bind `port` and serve the API in a background task.
pub async fn spawn_api(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server stopped");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/scan", get(routes::get_scan))
        .route("/api/regions", get(routes::get_regions))
        .route("/api/progress/:scan_id", get(routes::get_progress))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::merge::tests::{arb, data};
    use crate::cache::ScanCache;
    use crate::config::CacheConfig;
    use crate::progress::ScanProgressStream;
    use crate::storage::{MemoryScanStore, ScanStore};
    use crate::types::{LineStats, Region, ScanPhase, ScanResults, ScanStats};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store: Arc<dyn ScanStore> = Arc::new(MemoryScanStore::new());
        let cache = ScanCache::new(store.clone(), &CacheConfig::default());
        Arc::new(ApiState::new(cache, ScanProgressStream::new(store)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, _) = get_json(build_router(test_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_scan_endpoint_merges_and_filters() {
        let state = test_state();
        let now = Utc::now();
        state
            .cache
            .update_region_scan(Region::Au, &data(now, vec![arb("e1", "a", "b", 1.5)], 400))
            .await
            .unwrap();
        state
            .cache
            .update_region_scan(Region::Uk, &data(now, vec![arb("e2", "c", "d", 4.0)], 380))
            .await
            .unwrap();

        let (status, json) = get_json(build_router(state.clone()), "/api/scan").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["opportunities"].as_array().unwrap().len(), 2);
        assert!(json["regionAges"]["au"].is_i64());
        assert!(json["regionAges"]["us"].is_null());

        let (_, json) = get_json(build_router(state.clone()), "/api/scan?minProfit=2.0").await;
        let opps = json["opportunities"].as_array().unwrap();
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0]["event"]["id"], "e2");

        let (_, json) = get_json(build_router(state), "/api/scan?arbs=false").await;
        assert!(json["opportunities"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regions_endpoint() {
        let state = test_state();
        let stale = Utc::now() - Duration::seconds(3600);
        state
            .cache
            .update_region_scan(Region::Us, &data(stale, vec![], 0))
            .await
            .unwrap();

        let (status, json) = get_json(build_router(state), "/api/regions").await;
        assert_eq!(status, StatusCode::OK);
        let regions = json.as_array().unwrap();
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[0]["region"], "au");
        assert_eq!(regions[0]["fresh"], false);
        assert!(regions[0]["ageSecs"].is_null());
        assert_eq!(regions[2]["region"], "us");
        assert_eq!(regions[2]["fresh"], false);
        assert!(regions[2]["ageSecs"].as_i64().unwrap() >= 3600);
    }

    #[tokio::test]
    async fn test_progress_endpoint() {
        let state = test_state();
        let mut rec = state.progress.begin(Region::Au, 2).await;
        let stats = ScanStats {
            sports_scanned: 1,
            ..Default::default()
        };
        rec.record(
            ScanPhase::H2h,
            vec!["soccer_epl".into()],
            ScanResults::default(),
            &stats,
            &LineStats::default(),
        )
        .await
        .unwrap();
        rec.finish().await.unwrap();
        let scan_id = rec.scan_id();

        let uri = format!("/api/progress/{scan_id}");
        let (status, json) = get_json(build_router(state.clone()), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["batches"].as_array().unwrap().len(), 2);
        assert_eq!(json["complete"], true);

        let (_, json) = get_json(build_router(state.clone()), &format!("{uri}?after=0")).await;
        assert_eq!(json["batches"].as_array().unwrap().len(), 1);
        assert_eq!(json["batches"][0]["phase"], "complete");

        let (_, json) = get_json(build_router(state.clone()), &format!("{uri}?after=1")).await;
        assert!(json["batches"].as_array().unwrap().is_empty());
        assert_eq!(json["complete"], false);

        let unknown = format!("/api/progress/{}", uuid::Uuid::new_v4());
        let (status, json) = get_json(build_router(state), &unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("No progress"));
    }
}
