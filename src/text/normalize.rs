//! 文本规范化 (Text Normalization)
//!
//! 大小写折叠、去除变音符号与标点、合并空白，使不同站点的标题可以直接比较。

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// 进度关键词：附近通常跟着章节或卷号
pub const PROGRESS_KEYWORDS: &[&str] = &["chapter", "ch", "vol", "volume", "episode", "ep", "season"];

pub fn normalize_text(value: &str) -> String {
    let folded: String = value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 去除空白的规范键，用于冲突检测与查表 ("One Piece" 与 "onepiece" 相同)
pub fn canonical_token(value: &str) -> String {
    normalize_text(value).split_whitespace().collect()
}

pub fn tokens(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

pub fn is_numeric_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_numeric)
}

/// 是否包含进度关键词或纯数字词元
pub fn contains_progress_marker<S: AsRef<str>>(tokens: &[S]) -> bool {
    tokens.iter().any(|t| {
        let t = t.as_ref();
        PROGRESS_KEYWORDS.contains(&t) || is_numeric_token(t)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_case() {
        assert_eq!(normalize_text("Frieren: Beyond Journey's End"), "frieren beyond journey s end");
        assert_eq!(normalize_text("  ONE   piece!! "), "one piece");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(normalize_text("Pokémon Adventures"), "pokemon adventures");
        assert_eq!(normalize_text("Ｄｒ．ＳＴＯＮＥ"), "dr stone");
    }

    #[test]
    fn empty_and_symbol_only_input_is_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("--- !!! ---"), "");
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        for sample in ["Chainsaw Man — Chapter 150", "Sousou no Frieren", "Ch.12", "ÀÉÎÕÜ ß"] {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn canonical_tokens_collide_across_spacing() {
        assert_eq!(canonical_token("One Piece"), canonical_token("onepiece"));
        assert_eq!(canonical_token("Blue-Lock"), "bluelock");
    }

    #[test]
    fn progress_markers() {
        assert!(contains_progress_marker(&["chapter"]));
        assert!(contains_progress_marker(&["1099"]));
        assert!(!contains_progress_marker(&["colored", "edition"]));
        assert!(!contains_progress_marker::<&str>(&[]));
    }
}
