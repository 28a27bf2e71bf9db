//! 候选提取 (Candidate Extraction)
//!
//! 从常承载标题与章节链接的标签中，把页面展平为 (文本, 链接, 上下文) 候选。

use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::text::{normalize_text, tokens};
use crate::utils::to_absolute_url;

/// 单页候选上限
pub const MAX_CANDIDATES: usize = 1500;

const CANDIDATE_TAGS: &str = "a, h1, h2, h3, h4, h5, h6, strong, em, p, li";

static CANDIDATE_SELECTOR: OnceLock<Selector> = OnceLock::new();

fn candidate_selector() -> &'static Selector {
    CANDIDATE_SELECTOR.get_or_init(|| Selector::parse(CANDIDATE_TAGS).expect("static selector"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub norm: String,
    pub tokens: Vec<String>,
    pub link: Option<String>,
    /// 父元素的可见文本，与 `text` 相同时为空
    pub context: Option<String>,
}

/// 解析 HTML 并提取候选，链接相对 `base_url` 解析
pub fn extract_candidates(html: &str, base_url: &str) -> Vec<Candidate> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let doc = Html::parse_document(html);
    if !doc.errors.is_empty() {
        debug!("容忍 {} 个 HTML 解析错误: {}", doc.errors.len(), base_url);
    }
    let base = Url::parse(base_url).ok();
    extract_from_document(&doc, base.as_ref(), MAX_CANDIDATES)
}

pub fn extract_from_document(doc: &Html, base: Option<&Url>, limit: usize) -> Vec<Candidate> {
    let mut entries = Vec::new();

    for element in doc.select(candidate_selector()) {
        if entries.len() >= limit {
            break;
        }

        let text = visible_text(&element);
        let norm = normalize_text(&text);
        if norm.is_empty() {
            continue;
        }

        let link = element
            .value()
            .attr("href")
            .and_then(|href| match base {
                Some(base) => to_absolute_url(base, href),
                None => Some(href.trim().to_string()).filter(|h| !h.is_empty()),
            });

        let context = element
            .parent()
            .and_then(ElementRef::wrap)
            .map(|parent| visible_text(&parent))
            .filter(|parent_text| !parent_text.is_empty() && *parent_text != text);

        entries.push(Candidate {
            tokens: tokens(&norm),
            text,
            norm,
            link,
            context,
        });
    }

    entries
}

/// 各文本节点去除首尾空白后以单个空格连接
fn visible_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
