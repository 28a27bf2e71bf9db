//! 静态兜底目录 (Fallback Catalog)
//!
//! 少数已知站点的固定作品列表，仅在尚无真实抓取结果时避免匹配列表为空。

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::core::model::{Match, SourceHit, TrackedSeries, TrackedSite};
use crate::text::canonical_token;

const CATALOGS: &[(&str, &[&str])] = &[
    (
        "mangadex.org",
        &[
            "Frieren: Beyond Journey's End",
            "Blue Period",
            "Mission: Yozakura Family",
            "Delicious in Dungeon",
        ],
    ),
    (
        "manganato.com",
        &["One Piece", "Blue Lock", "Frieren: Beyond Journey's End", "Skip and Loafer"],
    ),
    ("tcbscans.com", &["One Piece", "Chainsaw Man", "My Hero Academia"]),
    (
        "comikey.com",
        &["My Wife Has No Emotion", "Kowloon Generic Romance", "The Summer You Were There"],
    ),
];

pub fn catalog_for(host: &str) -> Option<&'static [&'static str]> {
    CATALOGS
        .iter()
        .find(|(known, _)| *known == host)
        .map(|(_, titles)| *titles)
}

/// 将各站点目录与追踪作品交叉匹配；命中以站点 URL 作为链接，不含章节信息
pub fn fallback_matches(sites: &[TrackedSite], series: &[TrackedSeries]) -> Vec<Match> {
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for (index, record) in series.iter().enumerate() {
        for name in record.all_names() {
            let key = canonical_token(name);
            if !key.is_empty() {
                lookup.entry(key).or_insert(index);
            }
        }
    }

    let mut index: IndexMap<usize, Vec<SourceHit>> = IndexMap::new();
    for site in sites {
        let Some(titles) = catalog_for(&site.host()) else {
            continue;
        };
        for title in titles {
            let Some(&series_index) = lookup.get(&canonical_token(title)) else {
                continue;
            };
            let hits = index.entry(series_index).or_default();
            if hits.iter().any(|hit| hit.site_id == site.id) {
                continue;
            }
            hits.push(SourceHit {
                site: site.source_label(),
                site_id: site.id.clone(),
                link: Some(site.url.clone()),
                latest_chapter: None,
                latest_chapter_number: None,
                chapters: Vec::new(),
                series_url_template: site.series_url_template.clone(),
                chapter_url_template: site.chapter_url_template.clone(),
            });
        }
    }

    index.sort_keys();
    index
        .into_iter()
        .map(|(series_index, mut sources)| {
            sources.sort_by_key(|hit| hit.site.to_lowercase());
            let record = &series[series_index];
            Match {
                series_id: record.id.clone(),
                title: record.title.clone(),
                sources,
            }
        })
        .collect()
}
