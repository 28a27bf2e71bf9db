//! 错误定义 (Error Definitions)

use std::time::Duration;

use thiserror::Error;

/// Cookie 捕获失败原因
///
/// 调用方据此决定稍后重试还是改为手动提供 Cookie。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// 当前环境无法运行捕获后端 (缺少浏览器或会话总线)
    #[error("cookie capture unavailable: {0}")]
    Unavailable(String),

    /// 后端已运行，但等待期内未出现目标 Cookie
    #[error("no matching cookies captured within {}s; complete the challenge in the browser and retry", waited.as_secs())]
    Timeout { waited: Duration },
}

impl CaptureError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Timeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// 站点主机重复或作品名称冲突
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

impl TrackerError {
    /// 接口错误响应中的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::Network(_) | TrackerError::Middleware(_) => "network",
            TrackerError::Browser(_) => "browser",
            TrackerError::Serialization(_) => "serialization",
            TrackerError::Io(_) => "io",
            TrackerError::Config(_) => "config",
            TrackerError::Conflict(_) => "conflict",
            TrackerError::NotFound(_) => "not_found",
            TrackerError::Invalid(_) => "invalid",
            TrackerError::Capture(CaptureError::Unavailable(_)) => "capture_unavailable",
            TrackerError::Capture(CaptureError::Timeout { .. }) => "capture_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_timeout_is_retryable_but_unavailable_is_not() {
        let timeout = CaptureError::Timeout {
            waited: Duration::from_secs(30),
        };
        assert!(timeout.is_retryable());
        assert!(!CaptureError::Unavailable("no browser".into()).is_retryable());
    }

    #[test]
    fn capture_errors_keep_distinct_kinds() {
        let unavailable: TrackerError = CaptureError::Unavailable("no bus".into()).into();
        let timeout: TrackerError = CaptureError::Timeout {
            waited: Duration::from_secs(5),
        }
        .into();
        assert_eq!(unavailable.kind(), "capture_unavailable");
        assert_eq!(timeout.kind(), "capture_timeout");
        assert!(timeout.to_string().contains("5s"));
    }
}
