//! 浏览器服务
//!
//! 封装浏览器相关操作：启动会话、打开站点并轮询 Cookie 存储，直到目标 Cookie 出现。

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::Cookie;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info};

use crate::core::config::CaptureConfig;
use crate::core::error::{CaptureError, Result, TrackerError};
use crate::core::model::{StoredCookie, TrackedSite};
use crate::network::bus::ensure_session_bus;
use crate::network::cookies::{CaptureRequest, CookieSource, filter_for_host};

/// 浏览器会话
/// 采用显式的所有权管理，确保关闭逻辑的确定性
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl BrowserSession {
    /// 启动浏览器会话，`envs` 会注入浏览器进程
    pub async fn launch(config: &CaptureConfig, envs: &[(String, String)]) -> Result<Self> {
        let browser_config = build_browser_config(config, envs)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| TrackerError::Browser(e.to_string()))?;

        // 启动事件循环
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
        })
    }

    /// 创建新页面
    pub async fn new_page(&self, url: &str) -> Result<Page> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| TrackerError::Browser("Browser already closed".into()))?;
        browser
            .new_page(url)
            .await
            .map_err(|e| TrackerError::Browser(e.to_string()))
    }

    /// 优雅关闭浏览器，并等待事件循环结束
    pub async fn close(&mut self) -> Result<()> {
        let browser = self.browser.take();
        let handler = self.handler.take();

        if let Some(mut b) = browser {
            let _ = b.close().await;
            if let Some(h) = handler {
                let _ = h.await;
            }
        }
        Ok(())
    }
}

/// 构建浏览器配置
fn build_browser_config(config: &CaptureConfig, envs: &[(String, String)]) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-sandbox")
        .arg("--window-size=1280,900");

    if config.headless {
        builder = builder.arg("--headless=new");
    } else {
        builder = builder.with_head();
    }

    // 复用本地用户目录，使已有的 Cookie 存储可见
    if let Some(dir) = &config.user_data_dir {
        builder = builder.user_data_dir(dir);
    }

    let chrome_path = config.chrome_path.clone().or_else(|| {
        [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
    });
    if let Some(path) = chrome_path {
        builder = builder.chrome_executable(path);
    }

    for (key, value) in envs {
        builder = builder.env(key.clone(), value.clone());
    }

    builder.build().map_err(TrackerError::Browser)
}

// 在 Drop 时尝试最后一次保护
impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            // 在后台清理
            tokio::spawn(async move {
                let _ = browser.close().await;
                if let Some(h) = handler {
                    let _ = h.await;
                }
            });
        }
    }
}

fn to_stored(cookie: Cookie) -> StoredCookie {
    let expires = (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires);
    StoredCookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        secure: cookie.secure,
        http_only: cookie.http_only,
        expires,
    }
}

// =============================================================================
// BrowserCapture
// =============================================================================

/// 浏览器实时捕获 (Live Capture)
///
/// 打开站点后由用户在窗口内完成验证，期间按间隔轮询 Cookie 存储。
pub struct BrowserCapture {
    config: CaptureConfig,
}

impl BrowserCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    async fn wait_for_cookies(
        &self,
        session: &BrowserSession,
        site: &TrackedSite,
        request: &CaptureRequest,
    ) -> Result<Vec<StoredCookie>> {
        let page = session.new_page(&site.url).await?;
        let host = site.host();

        let polled = timeout(request.wait, async {
            let mut ticker = interval(self.config.poll_interval());
            loop {
                ticker.tick().await;

                // 页面尚未就绪或崩溃时视为空并继续等待
                let cookies = page.get_cookies().await.unwrap_or_default();
                let found = filter_for_host(
                    cookies.into_iter().map(to_stored).collect(),
                    &host,
                    &request.cookie_names,
                );
                if !found.is_empty() {
                    return found;
                }
                debug!("尚未获取到目标 Cookie，继续等待 ({})...", host);
            }
        })
        .await;

        polled.map_err(|_| {
            TrackerError::Capture(CaptureError::Timeout {
                waited: request.wait,
            })
        })
    }
}

#[async_trait]
impl CookieSource for BrowserCapture {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn capture(&self, site: &TrackedSite, request: &CaptureRequest) -> Result<Vec<StoredCookie>> {
        let envs = ensure_session_bus().await?;

        let mut session = BrowserSession::launch(&self.config, &envs)
            .await
            .map_err(|e| CaptureError::Unavailable(format!("browser could not be started: {}", e)))?;
        info!("浏览器已启动，请在窗口中完成验证 (最长等待 {}s)", request.wait.as_secs());

        // 使用局部结果确保即使等待出错也能走到 session.close()
        let result = self.wait_for_cookies(&session, site, request).await;

        if let Err(e) = session.close().await {
            debug!("关闭浏览器时发生非致命错误: {}", e);
        }
        result
    }
}
