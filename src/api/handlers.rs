use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use flume::Sender;
use tracing::{debug, info, warn};

use crate::core::config::CaptureConfig;
use crate::core::error::{Result, TrackerError};
use crate::core::model::{Match, TrackedSeries, TrackedSite};
use crate::engine::poller::{PollerMsg, request_refresh};
use crate::matching::run_matches;
use crate::network::cookies::{self, CaptureRequest, CookieSource, ManualCookies, ReauthOutcome};
use crate::store::{NewSeries, NewSite, SeriesUpdate, SiteUpdate, Store};

use super::types::{ErrorResponse, HealthResponse, ReauthRequest};

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    /// 轮询器收件箱，用于发起不等待结果的刷新
    pub refresh: Sender<PollerMsg>,
    pub capture: Arc<CaptureConfig>,
    /// 实时捕获来源
    pub live_capture: Arc<dyn CookieSource>,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::not_found("Not found")))
}

// =============================================================================
// Sites
// =============================================================================

pub async fn list_sites(State(state): State<AppState>) -> Json<Vec<TrackedSite>> {
    Json(state.store.sites())
}

pub async fn create_site(
    State(state): State<AppState>,
    Json(input): Json<NewSite>,
) -> Result<(StatusCode, Json<TrackedSite>)> {
    let site = state.store.add_site(input).await?;
    request_refresh(&state.refresh, Some(vec![site.id.clone()]));
    Ok((StatusCode::CREATED, Json(site)))
}

pub async fn update_site(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(update): Json<SiteUpdate>,
) -> Result<Json<TrackedSite>> {
    let site = state.store.update_site(&site_id, update).await?;
    request_refresh(&state.refresh, Some(vec![site.id.clone()]));
    Ok(Json(site))
}

pub async fn delete_site(State(state): State<AppState>, Path(site_id): Path<String>) -> Result<StatusCode> {
    state.store.remove_site(&site_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 手动 Cookie 优先；否则走浏览器实时捕获
pub async fn reauth_site(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    body: Option<Json<ReauthRequest>>,
) -> Result<Json<ReauthOutcome>> {
    let Json(body) = body.unwrap_or_default();
    let request = CaptureRequest {
        wait: state.capture.wait_budget(body.wait_seconds),
        cookie_names: body.cookie_names.unwrap_or_default(),
    };

    let result = match body.cookies.filter(|c| !c.is_empty()) {
        Some(values) => {
            let manual = ManualCookies::new(values);
            cookies::reauthenticate(&state.store, &site_id, &manual, &request).await
        }
        None => cookies::reauthenticate(&state.store, &site_id, state.live_capture.as_ref(), &request).await,
    };
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(TrackerError::Capture(e)) => {
            if e.is_retryable() {
                info!("站点 {} 验证尚未完成，可稍后重试", site_id);
            } else {
                warn!("站点 {} 无法实时捕获 Cookie，请手动提供: {}", site_id, e);
            }
            return Err(e.into());
        }
        Err(e) => return Err(e),
    };

    request_refresh(&state.refresh, Some(vec![site_id]));
    Ok(Json(outcome))
}

// =============================================================================
// Series
// =============================================================================

pub async fn list_series(State(state): State<AppState>) -> Json<Vec<TrackedSeries>> {
    Json(state.store.series())
}

pub async fn create_series(
    State(state): State<AppState>,
    Json(input): Json<NewSeries>,
) -> Result<(StatusCode, Json<TrackedSeries>)> {
    let record = state.store.add_series(input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_series(
    State(state): State<AppState>,
    Path(series_id): Path<String>,
    Json(update): Json<SeriesUpdate>,
) -> Result<Json<TrackedSeries>> {
    Ok(Json(state.store.update_series(&series_id, update).await?))
}

pub async fn delete_series(State(state): State<AppState>, Path(series_id): Path<String>) -> Result<StatusCode> {
    state.store.remove_series(&series_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Matches
// =============================================================================

/// 基于快照缓存计算匹配；缺失快照的站点会触发后台刷新，不阻塞响应
pub async fn list_matches(State(state): State<AppState>) -> Result<Json<Vec<Match>>> {
    let sites = state.store.sites();
    let series = state.store.series();
    if sites.is_empty() || series.is_empty() {
        return Ok(Json(Vec::new()));
    }

    // HTML 解析为 CPU 密集操作，移出异步执行器
    let cache = state.store.snapshots();
    let report = tokio::task::spawn_blocking(move || run_matches(&sites, &series, &cache))
        .await
        .map_err(|e| TrackerError::Io(std::io::Error::other(e)))?;

    if !report.missing_cache.is_empty() {
        info!("{} 个站点缺少快照，已触发后台刷新", report.missing_cache.len());
        request_refresh(&state.refresh, Some(report.missing_cache));
    }
    if report.from_fallback {
        debug!("返回静态目录匹配结果");
    }
    Ok(Json(report.matches))
}
