//! Cookie 提供者 (Cookie Provider)
//!
//! 抓取时解析站点已保存的 Cookie；重新认证时从两类来源之一获取新 Cookie：
//! 调用方手动提供，或浏览器实时捕获。来源在调用处显式选择，不做静默替换。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::core::error::Result;
use crate::core::model::{StoredCookie, TrackedSite};
use crate::store::Store;

/// 单次请求携带的 Cookie 集合，经由请求扩展传递给中间件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    /// 站点已保存且未过期的 Cookie
    pub fn for_site(site: &TrackedSite, now: DateTime<Utc>) -> Self {
        Self {
            cookies: site
                .cookies
                .iter()
                .filter(|c| !c.name.is_empty() && !c.is_expired(now))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// 渲染为 `Cookie` 请求头 (`a=1; b=2`)
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// 解析站点本次抓取应携带的 Cookie
pub fn resolve(site: &TrackedSite) -> CookieJar {
    CookieJar::for_site(site, Utc::now())
}

/// 一次捕获请求的参数
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// 已钳制到允许范围内的等待时长
    pub wait: Duration,
    /// 仅保留这些名称的 Cookie；为空则不过滤
    pub cookie_names: Vec<String>,
}

/// Cookie 来源 (Cookie Source)
#[async_trait]
pub trait CookieSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn capture(&self, site: &TrackedSite, request: &CaptureRequest) -> Result<Vec<StoredCookie>>;
}

/// 手动提供的 name→value 映射
#[derive(Debug, Clone, Default)]
pub struct ManualCookies {
    values: IndexMap<String, String>,
}

impl ManualCookies {
    pub fn new(values: IndexMap<String, String>) -> Self {
        Self { values }
    }

    /// 包装为作用于站点主机 (前导点域名、secure) 的 Cookie 记录
    pub fn to_records(&self, host: &str) -> Vec<StoredCookie> {
        self.values
            .iter()
            .map(|(name, value)| (name.trim(), value))
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| StoredCookie {
                name: name.to_string(),
                value: value.clone(),
                domain: format!(".{}", host),
                path: "/".to_string(),
                secure: true,
                http_only: false,
                expires: None,
            })
            .collect()
    }
}

#[async_trait]
impl CookieSource for ManualCookies {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn capture(&self, site: &TrackedSite, request: &CaptureRequest) -> Result<Vec<StoredCookie>> {
        let records = self.to_records(&site.host());
        Ok(filter_by_name(records, &request.cookie_names))
    }
}

/// Cookie 域与目标主机是否相关：相同、子域或父域
pub fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim().trim_start_matches('.').to_lowercase();
    let host = host.trim().trim_start_matches('.').to_lowercase();
    if domain.is_empty() || host.is_empty() {
        return false;
    }
    domain == host || host.ends_with(&format!(".{}", domain)) || domain.ends_with(&format!(".{}", host))
}

pub fn filter_by_name(cookies: Vec<StoredCookie>, allow: &[String]) -> Vec<StoredCookie> {
    if allow.is_empty() {
        return cookies;
    }
    let allow: HashSet<&str> = allow.iter().map(String::as_str).collect();
    cookies.into_iter().filter(|c| allow.contains(c.name.as_str())).collect()
}

/// 按目标主机与名称白名单过滤
pub fn filter_for_host(cookies: Vec<StoredCookie>, host: &str, allow: &[String]) -> Vec<StoredCookie> {
    let relevant = cookies
        .into_iter()
        .filter(|c| domain_matches(&c.domain, host))
        .collect();
    filter_by_name(relevant, allow)
}

/// 重新认证结果
#[derive(Debug, Clone, Serialize)]
pub struct ReauthOutcome {
    pub site_id: String,
    pub cookie_count: usize,
    pub reauthenticated_at: DateTime<Utc>,
}

/// 通过指定来源获取 Cookie 并写回站点记录
pub async fn reauthenticate(
    store: &Store,
    site_id: &str,
    source: &dyn CookieSource,
    request: &CaptureRequest,
) -> Result<ReauthOutcome> {
    let site = store.site(site_id)?;
    info!("正在为 {} 重新获取 Cookie (来源: {})", site.source_label(), source.name());

    let cookies = source.capture(&site, request).await?;
    let cookie_count = cookies.len();
    let at = Utc::now();
    store.record_cookies(site_id, cookies, at).await?;

    info!("已保存 {} 个 Cookie: {}", cookie_count, site.source_label());
    Ok(ReauthOutcome {
        site_id: site_id.to_string(),
        cookie_count,
        reauthenticated_at: at,
    })
}
