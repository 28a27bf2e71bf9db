//! 抓取管线 (Fetch Pipeline)
//!
//! 站点之间并发抓取，站点内各页按顺序抓取；单页失败只跳过该页。
//! 完成后为每个目标站点写入快照，内容为空的站点会清除旧快照。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::core::model::TrackedSite;
use crate::network::cookies;
use crate::network::service::HttpService;
use crate::store::snapshot::{RecordOutcome, SnapshotCache};

use super::pages::build_page_urls;

/// 多页内容之间的分隔标记
pub const PAGE_SEPARATOR: &str = "\n<!--page-break-->\n";

/// 一次刷新的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub cached: usize,
    pub purged: usize,
    /// 抓取期间被修改或删除的站点
    pub stale: usize,
}

/// 抓取管线
pub struct FetchPipeline {
    http: HttpService,
    cache: Arc<SnapshotCache>,
}

impl FetchPipeline {
    pub fn new(http: HttpService, cache: Arc<SnapshotCache>) -> Self {
        Self { http, cache }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// 抓取并缓存给定站点
    pub async fn refresh(&self, sites: &[TrackedSite]) -> RefreshSummary {
        if sites.is_empty() {
            return RefreshSummary::default();
        }

        let started = Instant::now();
        // 先记下各站点的失效代数，抓取期间被修改的站点不会被旧内容覆盖
        let generations: Vec<u64> = sites.iter().map(|site| self.cache.generation(&site.id)).collect();
        let bodies = join_all(sites.iter().map(|site| self.fetch_site(site))).await;

        // 同一轮写入的快照共享同一时间戳
        let captured_at = Utc::now();
        let mut summary = RefreshSummary::default();
        for ((site, body), generation) in sites.iter().zip(bodies).zip(generations) {
            let size = body.len();
            match self.cache.record_at_generation(&site.id, body, captured_at, generation) {
                RecordOutcome::Cached => {
                    info!("已缓存快照: {} ({} bytes)", site.url, size);
                    summary.cached += 1;
                }
                RecordOutcome::Purged => {
                    info!("未获取到内容，已清除快照: {}", site.url);
                    summary.purged += 1;
                }
                RecordOutcome::Stale => {
                    debug!("站点在抓取期间已变更，丢弃结果: {}", site.url);
                    summary.stale += 1;
                }
            }
        }

        debug!(
            "刷新完成: {} 个站点缓存, {} 个清除, 耗时 {:?}",
            summary.cached,
            summary.purged,
            started.elapsed()
        );
        summary
    }

    /// 顺序抓取站点的所有分页，全部失败时返回空字符串
    pub async fn fetch_site(&self, site: &TrackedSite) -> String {
        let jar = cookies::resolve(site);
        if !jar.is_empty() {
            debug!("携带 {} 个 Cookie: {}", jar.len(), site.url);
        }
        let urls = build_page_urls(site);
        if site.pagination.is_paginated() {
            debug!("分页抓取 {} 页: {}", urls.len(), site.url);
        }

        let mut pages = Vec::new();
        for url in urls {
            match self.http.fetch_page(&url, &jar).await {
                Ok(body) if body.trim().is_empty() => {
                    debug!("页面内容为空: {}", url);
                }
                Ok(body) => {
                    debug!("页面抓取成功: {} ({} bytes)", url, body.len());
                    pages.push(body);
                }
                Err(e) => {
                    warn!("页面抓取失败 {}: {}", url, e);
                    continue;
                }
            }
        }

        pages.join(PAGE_SEPARATOR)
    }
}
