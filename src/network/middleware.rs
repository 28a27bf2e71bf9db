use reqwest::header::{COOKIE, HeaderValue};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use tracing::{debug, warn};

use crate::network::cookies::CookieJar;

/// Cookie 注入中间件
/// 负责在每次请求前，将请求扩展中的站点 Cookie 渲染为 `Cookie` Header
pub struct CookieMiddleware;

#[async_trait::async_trait]
impl Middleware for CookieMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(header) = extensions.get::<CookieJar>().and_then(CookieJar::header_value) {
            match HeaderValue::from_str(&header) {
                Ok(val) => {
                    req.headers_mut().insert(COOKIE, val);
                }
                Err(e) => warn!("Cookie 含非法字符，已忽略: {}", e),
            }
        }

        let url = req.url().clone();
        let resp = next.run(req, extensions).await?;
        debug!("{} -> {}", url, resp.status());
        Ok(resp)
    }
}
