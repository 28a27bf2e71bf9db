//! 字符级相似度 (Similarity Ratio)
//!
//! Ratcliff/Obershelp 算法：反复取最长公共子串并在两侧递归，得分为 `2 * 匹配字符数 / 总长度`。

use std::collections::HashMap;

/// 第二个字符串达到该长度时，高频字符不参与匹配块的初始查找
const AUTOJUNK_MIN_LEN: usize = 200;

/// 返回 `[0, 1]` 区间的相似度；两个空串视为相同
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let index = index_positions(b);
    let mut queue = vec![(0, a.len(), 0, b.len())];
    let mut matched = 0;

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, b, &index, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// `b` 中各字符的位置索引，长输入会剔除高频字符
fn index_positions(b: &[char]) -> HashMap<char, Vec<usize>> {
    let mut index: HashMap<char, Vec<usize>> = HashMap::new();
    for (pos, c) in b.iter().enumerate() {
        index.entry(*c).or_default().push(pos);
    }
    if b.len() >= AUTOJUNK_MIN_LEN {
        let threshold = b.len() / 100 + 1;
        index.retain(|_, positions| positions.len() <= threshold);
    }
    index
}

/// 窗口内最长的公共块；长度相同时取在 `a`、再在 `b` 中最靠前者
fn longest_match(
    a: &[char],
    b: &[char],
    index: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let mut run_at: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_run = HashMap::new();
        if let Some(positions) = index.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = run_at.get(&(j.wrapping_sub(1))).copied().unwrap_or(0) + 1;
                next_run.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        run_at = next_run;
    }

    // 高频字符未进入索引，在此向两侧扩展
    while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
        best_i -= 1;
        best_j -= 1;
        best_size += 1;
    }
    while best_i + best_size < ahi && best_j + best_size < bhi && a[best_i + best_size] == b[best_j + best_size] {
        best_size += 1;
    }

    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_and_disjoint() {
        assert!(close(similarity_ratio("one piece", "one piece"), 1.0));
        assert!(close(similarity_ratio("abc", "xyz"), 0.0));
        assert!(close(similarity_ratio("", ""), 1.0));
        assert!(close(similarity_ratio("abc", ""), 0.0));
    }

    #[test]
    fn known_gestalt_scores() {
        // "abcd" vs "bcde": block "bcd" -> 2*3/8
        assert!(close(similarity_ratio("abcd", "bcde"), 0.75));
        // "one" inside "lonely": 2*3/9
        assert!(close(similarity_ratio("one", "lonely"), 6.0 / 9.0));
        // "blue lock" vs "blue": 2*4/13
        assert!(close(similarity_ratio("blue lock", "blue"), 8.0 / 13.0));
    }

    #[test]
    fn ratio_is_bounded_for_long_inputs() {
        let long = "e".repeat(150) + &"one piece ".repeat(20);
        let r = similarity_ratio("one piece", &long);
        assert!((0.0..=1.0).contains(&r));
    }
}
