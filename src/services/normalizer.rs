//! 文本规范化
//!
//! 所有比较（去重、引用核对、必引片段匹配）都先经过这里。

use std::collections::BTreeSet;

/// 统一引号并压缩空白
///
/// 弯引号、书名号式引号（“ ” „ ‟ « » ″）统一为 `"`，连续空白压缩为一个空格，首尾去空白。
/// 幂等：`normalize(normalize(x)) == normalize(x)`。
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(unify_quotes)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 用于匹配的规范化：在 `normalize` 基础上转小写
pub fn normalize_for_match(text: &str) -> String {
    normalize(text).to_lowercase()
}

/// 分词：小写的字母数字词集合
pub fn tokenize(text: &str) -> BTreeSet<String> {
    normalize_for_match(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn unify_quotes(word: &str) -> String {
    word.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}' | '\u{2033}' => '"',
            other => other,
        })
        .collect()
}
