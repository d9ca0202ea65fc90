use serde::{Deserialize, Serialize};
use std::fmt;

/// 问题类别
///
/// 每个类别对应固定扣分，见 `penalty()`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// 结构不合法（选项数量、空字段、重复选项等）
    MalformedStructure,
    /// 与题库或同批次题目重复
    Duplicate,
    /// 解析中没有引用原文
    QuoteMissing,
    /// 引用的内容在依据材料中找不到
    QuoteUngrounded,
    /// 没有使用指定的必引片段
    MandatoryQuoteMissing,
    /// 缺少条款引用
    MissingArticle,
    /// 缺少法规名称及编号
    MissingInstrument,
    /// 没有说明错误选项为何错误
    IncorrectOptionsUnjustified,
    /// 引用已自动修复
    QuoteRepaired,
    /// 引用依据为自动生成，需要人工复核
    CitationSynthesized,
    /// 生成器输出无法解析
    MalformedOutput,
    /// 批次数量不足
    BatchIncomplete,
    /// 多余题目已丢弃
    ExtraItemsDiscarded,
    /// 生成器不可用（瞬时错误重试耗尽）
    GeneratorUnavailable,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::MalformedStructure => "malformed_structure",
            IssueCode::Duplicate => "duplicate",
            IssueCode::QuoteMissing => "quote_missing",
            IssueCode::QuoteUngrounded => "quote_ungrounded",
            IssueCode::MandatoryQuoteMissing => "mandatory_quote_missing",
            IssueCode::MissingArticle => "missing_article",
            IssueCode::MissingInstrument => "missing_instrument",
            IssueCode::IncorrectOptionsUnjustified => "incorrect_options_unjustified",
            IssueCode::QuoteRepaired => "quote_repaired",
            IssueCode::CitationSynthesized => "citation_synthesized",
            IssueCode::MalformedOutput => "malformed_output",
            IssueCode::BatchIncomplete => "batch_incomplete",
            IssueCode::ExtraItemsDiscarded => "extra_items_discarded",
            IssueCode::GeneratorUnavailable => "generator_unavailable",
        }
    }

    /// 评分扣分
    pub fn penalty(self) -> u32 {
        match self {
            IssueCode::MalformedStructure => 60,
            IssueCode::Duplicate => 60,
            IssueCode::QuoteMissing => 35,
            IssueCode::QuoteUngrounded => 40,
            IssueCode::MandatoryQuoteMissing => 20,
            IssueCode::MissingArticle => 25,
            IssueCode::MissingInstrument => 25,
            IssueCode::IncorrectOptionsUnjustified => 10,
            IssueCode::QuoteRepaired => 10,
            IssueCode::CitationSynthesized => 15,
            IssueCode::MalformedOutput => 100,
            IssueCode::BatchIncomplete => 0,
            IssueCode::ExtraItemsDiscarded => 0,
            IssueCode::GeneratorUnavailable => 100,
        }
    }

    /// 是否属于引用类问题
    pub fn is_citation(self) -> bool {
        matches!(
            self,
            IssueCode::MissingArticle | IssueCode::MissingInstrument
        )
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 校验问题
///
/// `item_index` 为 `None` 表示批次级问题。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub item_index: Option<usize>,
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn item(item_index: usize, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            item_index: Some(item_index),
            code,
            message: message.into(),
        }
    }

    pub fn batch(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            item_index: None,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item_index {
            Some(index) => write!(f, "item {} [{}]: {}", index + 1, self.code, self.message),
            None => write!(f, "batch [{}]: {}", self.code, self.message),
        }
    }
}

/// 单题校验结果
///
/// 所有校验器执行完毕后由 `ValidationOutcome::new` 一次性生成，之后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub score: u32,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    /// 根据问题和警告计算分数
    ///
    /// 从 100 分开始扣分，下限为 0。存在任何问题或分数低于 `min_pass_score` 时不合格。
    pub fn new(
        issues: Vec<ValidationIssue>,
        warnings: Vec<ValidationIssue>,
        min_pass_score: u32,
    ) -> Self {
        let penalty: u32 = issues
            .iter()
            .chain(warnings.iter())
            .map(|issue| issue.code.penalty())
            .sum();
        let score = 100u32.saturating_sub(penalty);
        let valid = issues.is_empty() && score >= min_pass_score;

        Self {
            valid,
            score,
            issues,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_clean_item_scores_full() {
        let outcome = ValidationOutcome::new(Vec::new(), Vec::new(), 60);
        assert!(outcome.valid);
        assert_eq!(outcome.score, 100);
    }

    #[test]
    fn test_outcome_score_clamped_at_zero() {
        let issues = vec![
            ValidationIssue::item(0, IssueCode::Duplicate, "dup"),
            ValidationIssue::item(0, IssueCode::MalformedStructure, "bad"),
        ];
        let outcome = ValidationOutcome::new(issues, Vec::new(), 60);
        assert!(!outcome.valid);
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn test_outcome_warnings_only_still_valid() {
        let warnings = vec![
            ValidationIssue::item(2, IssueCode::QuoteRepaired, "repaired"),
            ValidationIssue::item(2, IssueCode::CitationSynthesized, "synth"),
        ];
        let outcome = ValidationOutcome::new(Vec::new(), warnings, 60);
        assert!(outcome.valid);
        assert_eq!(outcome.score, 75);
    }

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::item(4, IssueCode::MissingArticle, "no article");
        assert_eq!(issue.to_string(), "item 5 [missing_article]: no article");

        let issue = ValidationIssue::batch(IssueCode::MalformedOutput, "no array");
        assert_eq!(issue.to_string(), "batch [malformed_output]: no array");
    }

    #[test]
    fn test_issue_code_serializes_snake_case() {
        let json = serde_json::to_string(&IssueCode::IncorrectOptionsUnjustified).unwrap();
        assert_eq!(json, "\"incorrect_options_unjustified\"");
    }
}
