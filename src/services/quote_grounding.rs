//! 引用核对服务 - 业务能力层
//!
//! 职责：
//! - 从解析中提取双引号内的引用片段
//! - 核对引用片段是否逐字出现在依据材料中（规范化后比较）
//! - 从依据材料中挑选必引片段，写进提示词
//! - 解析未引用必引片段时，在开头补一行引用（记为警告）

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::models::{CandidateItem, IssueCode, ValidationIssue};
use crate::services::citation_validator::contains_article_reference;
use crate::services::normalizer::{normalize, normalize_for_match};

static QUOTED_SPAN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).ok());

fn is_edge_noise(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '…')
}

/// 提取引号中的片段
///
/// 先规范化（弯引号统一为 `"`），再按出现顺序两两配对。片段去掉首尾空白和标点后，
/// 长度在 `[min_chars, max_chars]` 之间才算有效引用。
pub fn extract_quotes(text: &str, min_chars: usize, max_chars: usize) -> Vec<String> {
    let Some(re) = QUOTED_SPAN_RE.as_ref() else {
        return Vec::new();
    };
    let normalized = normalize(text);

    re.captures_iter(&normalized)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches(is_edge_noise).to_string())
        .filter(|span| {
            let len = span.chars().count();
            len >= min_chars && len <= max_chars
        })
        .collect()
}

/// 按行和句末标点切分
fn split_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();

    for line in text.lines() {
        let mut start = 0;
        let mut chars = line.char_indices().peekable();
        while let Some((pos, c)) = chars.next() {
            if !matches!(c, '.' | ';' | '!' | '?') {
                continue;
            }
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                fragments.push(line[start..pos].to_string());
                start = pos + c.len_utf8();
            }
        }
        if start < line.len() {
            fragments.push(line[start..].to_string());
        }
    }

    fragments
}

/// 从依据材料中挑选必引片段
///
/// 候选片段需满足长度和字母数要求且不含双引号；提到条款的片段优先，
/// 按规范化文本去重后取前 `count` 个。没有合格片段时，退回到材料开头的一段
/// （在第一个双引号前截断，并截到词边界）。
pub fn select_mandatory_quotes(source: &str, count: usize, config: &ValidationConfig) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }

    let candidates: Vec<String> = split_fragments(source)
        .iter()
        .map(|fragment| normalize(fragment).trim_matches(is_edge_noise).to_string())
        .filter(|fragment| {
            let len = fragment.chars().count();
            let letters = fragment.chars().filter(|c| c.is_alphabetic()).count();
            len >= config.fragment_min_chars
                && len <= config.fragment_max_chars
                && letters >= config.fragment_min_letters
                && !fragment.contains('"')
        })
        .collect();

    let (mut selected, others): (Vec<String>, Vec<String>) = candidates
        .into_iter()
        .partition(|fragment| contains_article_reference(fragment));
    selected.extend(others);

    let mut seen = HashSet::new();
    let quotes: Vec<String> = selected
        .into_iter()
        .filter(|fragment| seen.insert(normalize_for_match(fragment)))
        .take(count)
        .collect();

    if !quotes.is_empty() {
        return quotes;
    }

    fallback_quote(source, config).into_iter().collect()
}

fn fallback_quote(source: &str, config: &ValidationConfig) -> Option<String> {
    let normalized = normalize(source);
    let before_quote = normalized.split('"').next().unwrap_or_default().trim_end();

    let chars: Vec<char> = before_quote.chars().collect();
    let candidate: String = if chars.len() <= config.fallback_max_chars {
        chars.iter().collect()
    } else {
        let window = &chars[..config.fallback_max_chars];
        // 截到最后一个空格，空格太靠前时直接按上限截断
        let cut = window
            .iter()
            .rposition(|c| *c == ' ')
            .filter(|pos| *pos >= config.fallback_min_chars)
            .unwrap_or(config.fallback_max_chars);
        chars[..cut].iter().collect()
    };

    let candidate = candidate.trim_end().to_string();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}

/// 单题引用核对结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingCheck {
    /// 解析中的全部有效引用
    pub quotes: Vec<String>,
    /// 能在依据材料中找到的引用
    pub grounded: Vec<String>,
    /// 是否逐字使用了某个必引片段
    pub uses_mandatory: bool,
    pub requires_mandatory: bool,
}

impl GroundingCheck {
    pub fn is_grounded(&self) -> bool {
        !self.grounded.is_empty() && (!self.requires_mandatory || self.uses_mandatory)
    }

    /// 不合格时对应的问题
    pub fn issue(&self, index: usize) -> Option<ValidationIssue> {
        if self.quotes.is_empty() {
            return Some(ValidationIssue::item(
                index,
                IssueCode::QuoteMissing,
                "explanation must quote the source verbatim between double quotes",
            ));
        }
        if self.grounded.is_empty() {
            return Some(ValidationIssue::item(
                index,
                IssueCode::QuoteUngrounded,
                format!(
                    "quoted text does not appear in the source: \"{}\"",
                    self.quotes[0]
                ),
            ));
        }
        if self.requires_mandatory && !self.uses_mandatory {
            return Some(ValidationIssue::item(
                index,
                IssueCode::MandatoryQuoteMissing,
                "explanation must quote one of the mandatory source fragments word for word",
            ));
        }
        None
    }
}

/// 引用核对服务，针对一份依据材料
pub struct QuoteGrounding {
    source_key: String,
    mandatory: Vec<String>,
    mandatory_keys: Vec<String>,
    require_mandatory: bool,
    quote_min_chars: usize,
    quote_max_chars: usize,
}

impl QuoteGrounding {
    pub fn new(source: &str, mandatory: Vec<String>, config: &ValidationConfig) -> Self {
        let mandatory_keys = mandatory.iter().map(|q| normalize_for_match(q)).collect();
        Self {
            source_key: normalize_for_match(source),
            mandatory,
            mandatory_keys,
            require_mandatory: config.require_mandatory_quote,
            quote_min_chars: config.quote_min_chars,
            quote_max_chars: config.quote_max_chars,
        }
    }

    pub fn mandatory_quotes(&self) -> &[String] {
        &self.mandatory
    }

    pub fn check(&self, explanation: &str) -> GroundingCheck {
        let quotes = extract_quotes(explanation, self.quote_min_chars, self.quote_max_chars);
        let keys: Vec<String> = quotes.iter().map(|q| normalize_for_match(q)).collect();

        let grounded = quotes
            .iter()
            .zip(keys.iter())
            .filter(|(_, key)| self.source_key.contains(key.as_str()))
            .map(|(quote, _)| quote.clone())
            .collect();
        let uses_mandatory = keys.iter().any(|key| self.mandatory_keys.contains(key));

        GroundingCheck {
            quotes,
            grounded,
            uses_mandatory,
            requires_mandatory: self.require_mandatory && !self.mandatory.is_empty(),
        }
    }

    /// 在解析开头补一行必引片段，按题目序号轮流选用
    pub fn repair(&self, index: usize, item: &mut CandidateItem) -> bool {
        if self.mandatory.is_empty() {
            return false;
        }
        let quote = &self.mandatory[index % self.mandatory.len()];
        item.explanation = format!("Quoted source: \"{}\"\n{}", quote, item.explanation);
        true
    }

    /// 核对并在必要时修复
    pub fn validate(
        &self,
        index: usize,
        item: &mut CandidateItem,
    ) -> (Vec<ValidationIssue>, Vec<ValidationIssue>) {
        let check = self.check(&item.explanation);
        let Some(issue) = check.issue(index) else {
            return (Vec::new(), Vec::new());
        };

        if !self.repair(index, item) {
            return (vec![issue], Vec::new());
        }

        debug!("题目 {} 引用不合格 ({}), 已补充必引片段", index + 1, issue.code);
        match self.check(&item.explanation).issue(index) {
            None => (
                Vec::new(),
                vec![ValidationIssue::item(
                    index,
                    IssueCode::QuoteRepaired,
                    format!("mandatory quote inserted automatically, original problem: {}", issue.message),
                )],
            ),
            Some(remaining) => (vec![remaining], Vec::new()),
        }
    }
}
