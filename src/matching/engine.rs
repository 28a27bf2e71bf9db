//! 匹配引擎 (Match Engine)
//!
//! 查询时遍历快照缓存：每个站点只解析一次，所有追踪作品共用同一组候选。

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::core::model::{Match, SourceHit, TrackedSeries, TrackedSite};
use crate::matching::aggregate::ChapterAggregator;
use crate::matching::catalog::fallback_matches;
use crate::matching::extractor::extract_candidates;
use crate::matching::matcher::SearchTerm;
use crate::store::snapshot::SnapshotCache;
use crate::text::canonical_token;

/// 一次匹配的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    pub matches: Vec<Match>,
    /// 没有快照可用的站点
    pub missing_cache: Vec<String>,
    /// `matches` 是否来自静态目录
    pub from_fallback: bool,
}

/// 作品在某站点上的去重检索词，顺序为标题、别名、站点专用名
pub fn search_terms(series: &TrackedSeries, site_id: &str) -> Vec<SearchTerm> {
    let mut seen = HashSet::new();
    series
        .names_for_site(site_id)
        .filter(|name| seen.insert(canonical_token(name)))
        .filter_map(SearchTerm::new)
        .collect()
}

pub fn run_matches(sites: &[TrackedSite], series: &[TrackedSeries], cache: &SnapshotCache) -> MatchReport {
    if sites.is_empty() || series.is_empty() {
        return MatchReport::default();
    }

    let started = Instant::now();
    let mut per_series: Vec<Vec<SourceHit>> = vec![Vec::new(); series.len()];
    let mut missing_cache = Vec::new();

    for site in sites {
        let Some(snapshot) = cache.get(&site.id) else {
            missing_cache.push(site.id.clone());
            continue;
        };

        let candidates = extract_candidates(&snapshot.body, &site.url);
        debug!("已提取 {} 个候选: {}", candidates.len(), site.url);
        if candidates.is_empty() {
            continue;
        }

        for (index, record) in series.iter().enumerate() {
            let mut aggregator = ChapterAggregator::new(snapshot.captured_at);
            for term in search_terms(record, &site.id) {
                aggregator.scan(&term, &candidates);
            }

            let (Some(best), chapters) = aggregator.into_parts() else {
                continue;
            };
            let (latest_chapter, latest_chapter_number) = match best.chapter {
                Some(mention) => (Some(mention.label), mention.number),
                None => (None, None),
            };
            per_series[index].push(SourceHit {
                site: site.source_label(),
                site_id: site.id.clone(),
                link: Some(best.link.unwrap_or_else(|| site.url.clone())),
                latest_chapter,
                latest_chapter_number,
                chapters,
                series_url_template: site.series_url_template.clone(),
                chapter_url_template: site.chapter_url_template.clone(),
            });
        }
    }

    let matches: Vec<Match> = series
        .iter()
        .zip(per_series)
        .filter(|(_, sources)| !sources.is_empty())
        .map(|(record, mut sources)| {
            sort_sources(&mut sources);
            Match {
                series_id: record.id.clone(),
                title: record.title.clone(),
                sources,
            }
        })
        .collect();

    info!(
        "匹配完成: {} 部作品, {} 个站点, 耗时 {:?} ({} 个站点无快照)",
        matches.len(),
        sites.len(),
        started.elapsed(),
        missing_cache.len()
    );

    if matches.is_empty() {
        let fallback = fallback_matches(sites, series);
        if !fallback.is_empty() {
            debug!("无实时匹配，返回 {} 条静态目录结果", fallback.len());
            return MatchReport {
                matches: fallback,
                missing_cache,
                from_fallback: true,
            };
        }
    }

    MatchReport {
        matches,
        missing_cache,
        from_fallback: false,
    }
}

/// 章节号降序，无章节号的排最后，其次按站点名
pub fn sort_sources(sources: &mut [SourceHit]) {
    sources.sort_by(|a, b| {
        let key = |hit: &SourceHit| -(hit.latest_chapter_number.unwrap_or(-1.0));
        key(a)
            .total_cmp(&key(b))
            .then_with(|| a.site.to_lowercase().cmp(&b.site.to_lowercase()))
    });
}
