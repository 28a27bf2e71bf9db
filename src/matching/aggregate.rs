//! 章节聚合 (Chapter Aggregation)
//!
//! 针对单个站点与单部作品扫描候选：保留得分最高的命中，同时收集所有结构匹配中出现的章节。

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::core::model::ChapterListing;
use crate::matching::chapter::{ChapterMention, detect_in_candidate};
use crate::matching::extractor::Candidate;
use crate::matching::matcher::SearchTerm;

/// 每个 (站点, 作品) 保留的章节条数
pub const MAX_LISTINGS: usize = 5;

/// 去重键：能解析为数字时用数值，否则用小写标签
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Signature {
    Numeric(u64),
    Label(String),
}

impl Signature {
    fn of(label: &str, number: Option<f64>) -> Self {
        match number {
            // -0.0 与 0.0 视为同一章
            Some(n) => Signature::Numeric((n + 0.0).to_bits()),
            None => Signature::Label(label.trim().to_lowercase()),
        }
    }
}

/// 目前相似度最高的命中
#[derive(Debug, Clone, PartialEq)]
pub struct BestHit {
    pub ratio: f64,
    pub link: Option<String>,
    pub chapter: Option<ChapterMention>,
}

#[derive(Debug)]
pub struct ChapterAggregator {
    detected_at: DateTime<Utc>,
    seen: HashSet<Signature>,
    listings: Vec<ChapterListing>,
    best: Option<BestHit>,
}

impl ChapterAggregator {
    pub fn new(detected_at: DateTime<Utc>) -> Self {
        Self {
            detected_at,
            seen: HashSet::new(),
            listings: Vec::new(),
            best: None,
        }
    }

    pub fn scan(&mut self, term: &SearchTerm, candidates: &[Candidate]) {
        for candidate in candidates {
            let Some(ratio) = term.score(candidate) else {
                continue;
            };
            let chapter = detect_in_candidate(&candidate.text, candidate.context.as_deref());
            self.observe(ratio, candidate.link.clone(), chapter);
        }
    }

    /// 记录一次结构匹配；相似度持平时保留先出现的命中
    pub fn observe(&mut self, ratio: f64, link: Option<String>, chapter: Option<ChapterMention>) {
        if let Some(mention) = &chapter {
            self.record(mention, link.clone());
        }
        if self.best.as_ref().is_none_or(|best| ratio > best.ratio) {
            self.best = Some(BestHit { ratio, link, chapter });
        }
    }

    fn record(&mut self, mention: &ChapterMention, link: Option<String>) {
        if mention.label.is_empty() {
            return;
        }
        if self.seen.insert(Signature::of(&mention.label, mention.number)) {
            self.listings.push(ChapterListing {
                label: mention.label.clone(),
                number: mention.number,
                link,
                detected_at: self.detected_at,
            });
        }
    }

    pub fn best(&self) -> Option<&BestHit> {
        self.best.as_ref()
    }

    /// 排序并截断到 [`MAX_LISTINGS`] 条
    ///
    /// 数字章节按数值降序在前，纯标签按字母序在后。最佳命中的章节总会保留：
    /// 数字章节被截掉时移到首位，纯标签章节占用最后一个位置，仍排在数字章节之后。
    pub fn into_parts(self) -> (Option<BestHit>, Vec<ChapterListing>) {
        let mut listings = self.listings;
        listings.sort_by(compare_listings);

        if let Some(mention) = self.best.as_ref().and_then(|b| b.chapter.as_ref()) {
            let wanted = Signature::of(&mention.label, mention.number);
            let position = listings
                .iter()
                .position(|l| Signature::of(&l.label, l.number) == wanted);
            if let Some(index) = position.filter(|i| *i >= MAX_LISTINGS) {
                let listing = listings.remove(index);
                if listing.number.is_some() {
                    listings.insert(0, listing);
                } else {
                    listings.insert(MAX_LISTINGS - 1, listing);
                }
            }
        }

        listings.truncate(MAX_LISTINGS);
        (self.best, listings)
    }
}

fn compare_listings(a: &ChapterListing, b: &ChapterListing) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.number, b.number) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.label.to_lowercase().cmp(&b.label.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::extractor::extract_candidates;

    fn mention(label: &str) -> Option<ChapterMention> {
        Some(ChapterMention {
            label: label.to_string(),
            number: label.parse().ok(),
        })
    }

    #[test]
    fn scans_page_for_best_hit_and_listings() {
        let html = r#"
            <div class="row"><a href="/op/1098">One Piece Ch. 1098</a></div>
            <div class="row"><a href="/op/1099">One Piece Chapter 1099</a></div>
            <div class="row"><a href="/op">One Piece</a></div>
            <div class="row"><a href="/opf">One Piece Film Red</a></div>"#;
        let candidates = extract_candidates(html, "https://reader.example/");
        let mut agg = ChapterAggregator::new(Utc::now());
        agg.scan(&SearchTerm::new("One Piece").unwrap(), &candidates);

        let (best, listings) = agg.into_parts();
        let best = best.unwrap();
        assert_eq!(best.link.as_deref(), Some("https://reader.example/op"));
        assert_eq!(best.chapter, None);
        assert_eq!(
            listings.iter().map(|l| l.label.as_str()).collect::<Vec<_>>(),
            vec!["1099", "1098"]
        );
        assert_eq!(listings[0].link.as_deref(), Some("https://reader.example/op/1099"));
        assert_eq!(listings[1].link.as_deref(), Some("https://reader.example/op/1098"));
    }

    #[test]
    fn equal_ratio_keeps_first_hit() {
        let mut agg = ChapterAggregator::new(Utc::now());
        agg.observe(0.8, Some("first".into()), None);
        agg.observe(0.8, Some("second".into()), None);
        agg.observe(0.7, Some("third".into()), None);
        assert_eq!(agg.best().unwrap().link.as_deref(), Some("first"));
    }

    #[test]
    fn duplicates_collapse_by_number_or_folded_label() {
        let mut agg = ChapterAggregator::new(Utc::now());
        agg.observe(0.5, Some("a".into()), mention("12"));
        agg.observe(0.5, Some("b".into()), mention("12.0"));
        agg.observe(0.5, None, mention("Extra"));
        agg.observe(0.5, None, mention(" extra "));
        let (_, listings) = agg.into_parts();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].link.as_deref(), Some("a"));
        assert_eq!(listings[1].label, "Extra");
    }

    #[test]
    fn capped_and_numeric_first() {
        let mut agg = ChapterAggregator::new(Utc::now());
        for label in ["3", "oneshot", "10", "afterword", "7", "1", "5", "2.5"] {
            agg.observe(0.5, None, mention(label));
        }
        let (_, listings) = agg.into_parts();
        assert_eq!(listings.len(), MAX_LISTINGS);
        let labels: Vec<_> = listings.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["10", "7", "5", "3", "2.5"]);
    }

    #[test]
    fn label_only_sorted_alphabetically_after_numbers() {
        let mut agg = ChapterAggregator::new(Utc::now());
        for label in ["Side Story", "4", "Afterword"] {
            agg.observe(0.5, None, mention(label));
        }
        let (_, listings) = agg.into_parts();
        let labels: Vec<_> = listings.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["4", "Afterword", "Side Story"]);
    }

    #[test]
    fn best_chapter_survives_truncation() {
        let mut agg = ChapterAggregator::new(Utc::now());
        for label in ["10", "9", "8", "7", "6"] {
            agg.observe(0.5, None, mention(label));
        }
        agg.observe(0.95, Some("best".into()), mention("2"));
        let (best, listings) = agg.into_parts();
        assert_eq!(best.unwrap().chapter.unwrap().label, "2");
        let labels: Vec<_> = listings.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["2", "10", "9", "8", "7"]);
    }

    #[test]
    fn label_only_best_keeps_numeric_listings_ahead() {
        let mut agg = ChapterAggregator::new(Utc::now());
        for label in ["10", "9", "8", "7", "6"] {
            agg.observe(0.5, None, mention(label));
        }
        agg.observe(0.95, None, mention("Special"));
        let (_, listings) = agg.into_parts();
        let labels: Vec<_> = listings.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["10", "9", "8", "7", "Special"]);
    }
}
