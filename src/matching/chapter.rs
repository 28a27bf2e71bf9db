//! 章节识别 (Chapter Detection)
//!
//! 逐层回退：显式 `chapter N` 形式，其次是有关键词约束的裸数字。

use std::sync::OnceLock;

use regex::Regex;

use crate::text::{contains_progress_marker, normalize_text, tokens};

/// 页面上的章节标签及其数值 (可解析时)
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterMention {
    pub label: String,
    pub number: Option<f64>,
}

impl ChapterMention {
    fn from_label(label: &str) -> Self {
        let label = label.trim().to_string();
        let number = parse_chapter_number(&label);
        Self { label, number }
    }
}

struct Patterns {
    explicit: Regex,
    bare_number: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        explicit: Regex::new(r"(?i)(?:chapter|ch\.?|c)\s*(\d+(?:\.\d+)?)").expect("static regex"),
        bare_number: Regex::new(r"\d+(?:\.\d+)?").expect("static regex"),
    })
}

pub fn detect_chapter(snippet: &str) -> Option<ChapterMention> {
    detect_explicit(snippet).or_else(|| detect_keyword_number(snippet))
}

/// `chapter 12`、`ch.12`、`ch 12`、`c12`；取第一个匹配
pub fn detect_explicit(snippet: &str) -> Option<ChapterMention> {
    patterns()
        .explicit
        .captures(snippet)
        .and_then(|caps| caps.get(1))
        .map(|m| ChapterMention::from_label(m.as_str()))
}

/// 第一个裸数字，仅当片段含进度关键词或纯数字词元时生效
pub fn detect_keyword_number(snippet: &str) -> Option<ChapterMention> {
    let toks = tokens(&normalize_text(snippet));
    if !contains_progress_marker(&toks) {
        return None;
    }
    patterns()
        .bare_number
        .find(snippet)
        .map(|m| ChapterMention::from_label(m.as_str()))
}

/// 先看候选自身文本，再看上下文
pub fn detect_in_candidate(text: &str, context: Option<&str>) -> Option<ChapterMention> {
    std::iter::once(Some(text))
        .chain(std::iter::once(context))
        .flatten()
        .filter(|s| !s.is_empty())
        .find_map(detect_chapter)
}

pub fn parse_chapter_number(label: &str) -> Option<f64> {
    label.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_chapter_with_decimal() {
        let found = detect_chapter("Chapter 142.5 - Title").unwrap();
        assert_eq!(found.label, "142.5");
        assert_eq!(found.number, Some(142.5));
    }

    #[test]
    fn abbreviated_forms() {
        let found = detect_chapter("Ch.12").unwrap();
        assert_eq!(found.label, "12");
        assert_eq!(found.number, Some(12.0));

        assert_eq!(detect_chapter("ch 7").unwrap().label, "7");
        assert_eq!(detect_chapter("C88 raw").unwrap().label, "88");
    }

    #[test]
    fn no_chapter_in_plain_text() {
        assert_eq!(detect_chapter("Random text"), None);
        assert_eq!(detect_chapter(""), None);
    }

    #[test]
    fn keyword_gated_bare_number() {
        let found = detect_chapter("Vol. 3 extras").unwrap();
        assert_eq!(found.label, "3");
        let found = detect_chapter("Episode #45").unwrap();
        assert_eq!(found.label, "45");
        let found = detect_chapter("One Piece 1099").unwrap();
        assert_eq!(found.label, "1099");
    }

    #[test]
    fn number_glued_to_word_needs_a_keyword() {
        // "top10" 是单个字母数字词元，既无关键词也无裸数字
        assert_eq!(detect_keyword_number("top10 list"), None);
    }

    #[test]
    fn context_is_consulted_after_text() {
        let found = detect_in_candidate("Blue Lock", Some("Blue Lock Chapter 250")).unwrap();
        assert_eq!(found.label, "250");
        assert_eq!(detect_in_candidate("Blue Lock", None), None);
    }

    #[test]
    fn unparseable_labels_keep_label_without_number() {
        assert_eq!(parse_chapter_number("12a"), None);
        assert_eq!(parse_chapter_number("١٢"), None);
        assert_eq!(parse_chapter_number(" 7 "), Some(7.0));
    }
}
