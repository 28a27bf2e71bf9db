//! 配置管理 (Configuration Management)
//!
//! 读取可选的 `config.toml`，再叠加 `MANGA_TRACKER__*` 环境变量；所有字段均有默认值。

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::core::error::{Result, TrackerError};

/// Cookie 捕获等待时长的上下限 (秒)
pub const CAPTURE_WAIT_BOUNDS: (u64, u64) = (5, 180);

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// `sites.json` 与 `series.json` 所在目录
    #[serde(default = "default_data_dir")]
    #[builder(default = default_data_dir())]
    pub data_dir: String,

    #[serde(default)]
    #[builder(default)]
    pub server: ServerConfig,

    #[serde(default)]
    #[builder(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    #[builder(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    #[builder(default)]
    pub capture: CaptureConfig,
}

/// HTTP 接口配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    #[builder(default = default_listen_addr())]
    pub listen_addr: String,
    /// 前端构建产物目录；未设置时不托管静态文件
    pub frontend_dir: Option<String>,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub cors: bool,
}

/// 后台轮询配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval")]
    #[builder(default = default_poll_interval())]
    pub interval_secs: u64,
    /// 停止时等待轮询循环退出的最长时间
    #[serde(default = "default_shutdown_grace")]
    #[builder(default = default_shutdown_grace())]
    pub shutdown_grace_secs: u64,
}

/// 页面抓取配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    #[builder(default = default_timeout())]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    #[builder(default = default_connect_timeout())]
    pub connect_timeout_secs: u64,
    /// 超出该大小的响应正文会被截断
    #[serde(default = "default_max_response_bytes")]
    #[builder(default = default_max_response_bytes())]
    pub max_response_bytes: usize,
    #[serde(default = "default_user_agent")]
    #[builder(default = default_user_agent())]
    pub user_agent: String,
}

/// 浏览器 Cookie 捕获配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct CaptureConfig {
    /// 通常需要可见窗口，以便人工完成验证
    #[serde(default)]
    #[builder(default)]
    pub headless: bool,
    pub chrome_path: Option<String>,
    /// 复用本地浏览器配置目录，读取其中已有的 Cookie
    pub user_data_dir: Option<String>,
    #[serde(default = "default_capture_poll")]
    #[builder(default = default_capture_poll())]
    pub poll_interval_ms: u64,
    #[serde(default = "default_capture_wait")]
    #[builder(default = default_capture_wait())]
    pub default_wait_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            frontend_dir: None,
            cors: true,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            user_data_dir: None,
            poll_interval_ms: default_capture_poll(),
            default_wait_secs: default_capture_wait(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            poller: PollerConfig::default(),
            fetch: FetchConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "manga-tracker")
        .map(|dirs| dirs.data_dir().display().to_string())
        .unwrap_or_else(|| "data".to_string())
}
fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    60
}
fn default_shutdown_grace() -> u64 {
    5
}
fn default_timeout() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_max_response_bytes() -> usize {
    1_000_000
}
fn default_user_agent() -> String {
    "MangaTrackerBot/0.1".to_string()
}
fn default_capture_poll() -> u64 {
    1000
}
fn default_capture_wait() -> u64 {
    60
}

impl AppConfig {
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            builder
        };

        let settings = builder
            .add_source(Environment::with_prefix("MANGA_TRACKER").separator("__"))
            .build()
            .map_err(TrackerError::Config)?;
        settings.try_deserialize().map_err(TrackerError::Config)
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    /// 将调用方给出的等待时长钳制到允许范围
    pub fn wait_budget(&self, requested: Option<u64>) -> Duration {
        let (min, max) = CAPTURE_WAIT_BOUNDS;
        let secs = requested.unwrap_or(self.default_wait_secs).clamp(min, max);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.poller.interval_secs, 60);
        assert_eq!(cfg.fetch.timeout_secs, 10);
        assert_eq!(cfg.fetch.connect_timeout_secs, 5);
        assert_eq!(cfg.fetch.max_response_bytes, 1_000_000);
        assert!(cfg.server.cors);
    }

    #[test]
    fn file_overrides_individual_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "data_dir = \"/tmp/tracker\"\n[poller]\ninterval_secs = 15").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.data_dir, "/tmp/tracker");
        assert_eq!(cfg.poller.interval_secs, 15);
        assert_eq!(cfg.poller.shutdown_grace_secs, 5);
    }

    #[test]
    fn wait_budget_is_clamped() {
        let capture = CaptureConfig::default();
        assert_eq!(capture.wait_budget(Some(1)), Duration::from_secs(5));
        assert_eq!(capture.wait_budget(Some(900)), Duration::from_secs(180));
        assert_eq!(capture.wait_budget(None), Duration::from_secs(60));
    }
}
