//! 接口请求/响应类型 (Request/Response Types)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::error::{CaptureError, TrackerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// 重新认证请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReauthRequest {
    /// 实时捕获的等待秒数，会被钳制到允许范围
    #[serde(default)]
    pub wait_seconds: Option<u64>,
    /// Cookie 名称白名单
    #[serde(default)]
    pub cookie_names: Option<Vec<String>>,
    /// 手动提供的 name→value；非空时跳过浏览器捕获
    #[serde(default)]
    pub cookies: Option<IndexMap<String, String>>,
}

/// 错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("not_found", detail)
    }
}

pub fn status_for(err: &TrackerError) -> StatusCode {
    match err {
        TrackerError::Conflict(_) => StatusCode::CONFLICT,
        TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TrackerError::Capture(CaptureError::Timeout { .. }) => StatusCode::REQUEST_TIMEOUT,
        TrackerError::Capture(CaptureError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("请求处理失败: {}", self);
        }
        (status, Json(ErrorResponse::new(self.kind(), self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(status_for(&TrackerError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&TrackerError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&TrackerError::Invalid("x".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&CaptureError::Timeout { waited: Duration::from_secs(5) }.into()),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            status_for(&CaptureError::Unavailable("no bus".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&TrackerError::Browser("crash".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn reauth_request_fields_are_optional() {
        let req: ReauthRequest = serde_json::from_str("{}").unwrap();
        assert!(req.wait_seconds.is_none() && req.cookies.is_none() && req.cookie_names.is_none());
    }
}
