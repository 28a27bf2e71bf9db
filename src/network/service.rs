use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::core::config::FetchConfig;
use crate::core::error::{Result, TrackerError};
use crate::network::cookies::CookieJar;
use crate::network::middleware::CookieMiddleware;

/// 页面抓取客户端
#[derive(Clone)]
pub struct HttpService {
    client: ClientWithMiddleware,
    max_response_bytes: usize,
}

impl HttpService {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: Self::try_build_internal_client(config)?,
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// 构建底层的 HTTP 客户端
    fn try_build_internal_client(config: &FetchConfig) -> Result<ClientWithMiddleware> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        if let Ok(ua) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, ua);
        }

        // 整体超时与连接超时均视为单页失败，由调用方跳过
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(TrackerError::Network)?;

        Ok(ClientBuilder::new(client).with(CookieMiddleware).build())
    }

    /// 获取单个页面，非 2xx 视为错误，超出上限的正文会被截断
    pub async fn fetch_page(&self, url: &str, jar: &CookieJar) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .with_extension(jar.clone())
            .send()
            .await
            .map_err(TrackerError::Middleware)?
            .error_for_status()
            .map_err(TrackerError::Network)?;

        let text = resp.text().await.map_err(TrackerError::Network)?;
        Ok(truncate_body(text, self.max_response_bytes))
    }
}

/// 按字节上限截断，切点回退到最近的字符边界
pub fn truncate_body(mut body: String, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body;
    }
    let mut end = max_bytes;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body
}
