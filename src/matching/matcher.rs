//! 结构匹配 (Structural Matching)
//!
//! 判断候选是否指向某部作品，规则按顺序尝试，第一条成立即命中：
//!
//! 1. 文本几乎相同 (相似度 >= 0.90)
//! 2. 多词标题的全部词元出现在候选中，且相似度 >= 0.75
//! 3. 多词标题是候选前缀，其后带进度标记
//! 4. 单词标题：完全相同，或为首个词元且其后带进度标记

use std::collections::HashSet;

use crate::matching::extractor::Candidate;
use crate::text::{contains_progress_marker, normalize_text, similarity_ratio, tokens};

pub const NEAR_IDENTICAL_RATIO: f64 = 0.90;
pub const CONTAINED_RATIO: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    NearIdentical,
    Contained,
    PrefixWithProgress,
    SingleToken,
}

/// 规范化后的作品名
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTerm {
    pub norm: String,
    pub tokens: Vec<String>,
}

impl SearchTerm {
    pub fn new(name: &str) -> Option<Self> {
        let norm = normalize_text(name);
        if norm.is_empty() {
            return None;
        }
        Some(Self {
            tokens: tokens(&norm),
            norm,
        })
    }

    /// 命中时返回相似度，否则为 `None`
    pub fn score(&self, candidate: &Candidate) -> Option<f64> {
        let ratio = similarity_ratio(&self.norm, &candidate.norm);
        evaluate(&self.tokens, &candidate.tokens, ratio).map(|_| ratio)
    }
}

pub fn evaluate<S: AsRef<str>>(title: &[S], candidate: &[S], ratio: f64) -> Option<MatchRule> {
    if ratio >= NEAR_IDENTICAL_RATIO {
        return Some(MatchRule::NearIdentical);
    }

    if title.len() >= 2 {
        let available: HashSet<&str> = candidate.iter().map(AsRef::as_ref).collect();
        if ratio >= CONTAINED_RATIO && title.iter().all(|t| available.contains(t.as_ref())) {
            return Some(MatchRule::Contained);
        }

        if candidate.len() > title.len() && has_prefix(candidate, title) {
            if contains_progress_marker(&candidate[title.len()..]) {
                return Some(MatchRule::PrefixWithProgress);
            }
        }
        return None;
    }

    let (Some(only), Some(first)) = (title.first(), candidate.first()) else {
        return None;
    };
    if only.as_ref() != first.as_ref() {
        return None;
    }
    if candidate.len() == 1 || contains_progress_marker(&candidate[1..]) {
        return Some(MatchRule::SingleToken);
    }
    None
}

fn has_prefix<S: AsRef<str>>(candidate: &[S], title: &[S]) -> bool {
    candidate
        .iter()
        .zip(title)
        .all(|(c, t)| c.as_ref() == t.as_ref())
}

/// 原始字符串版本，两侧先规范化
pub fn is_match(title: &str, candidate: &str) -> bool {
    let title = normalize_text(title);
    let candidate = normalize_text(candidate);
    if title.is_empty() || candidate.is_empty() {
        return false;
    }
    let ratio = similarity_ratio(&title, &candidate);
    evaluate(&tokens(&title), &tokens(&candidate), ratio).is_some()
}
