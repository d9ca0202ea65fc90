//! 批次校验报告
//!
//! 只读模型：汇总每题的校验结果，供重试判断和日志使用。

use serde::Serialize;
use std::fmt;

use crate::models::{ValidationIssue, ValidationOutcome};

/// 分数档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBucket {
    Critical,
    Poor,
    Fair,
    Good,
}

impl ScoreBucket {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=39 => ScoreBucket::Critical,
            40..=59 => ScoreBucket::Poor,
            60..=79 => ScoreBucket::Fair,
            _ => ScoreBucket::Good,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreBucket::Critical => "critical",
            ScoreBucket::Poor => "poor",
            ScoreBucket::Fair => "fair",
            ScoreBucket::Good => "good",
        }
    }
}

/// 各档位的题目数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub critical: usize,
    pub poor: usize,
    pub fair: usize,
    pub good: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<ValidationOutcome>,
    /// 不属于某一题的问题（数量不足、输出无法解析等）
    pub batch_issues: Vec<ValidationIssue>,
    pub batch_warnings: Vec<ValidationIssue>,
}

impl BatchReport {
    pub fn new(
        outcomes: Vec<ValidationOutcome>,
        batch_issues: Vec<ValidationIssue>,
        batch_warnings: Vec<ValidationIssue>,
    ) -> Self {
        Self {
            outcomes,
            batch_issues,
            batch_warnings,
        }
    }

    /// 整批失败（例如输出无法解析），没有逐题结果
    pub fn failed(issue: ValidationIssue) -> Self {
        Self {
            outcomes: Vec::new(),
            batch_issues: vec![issue],
            batch_warnings: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.valid).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn mean_score(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let total: u32 = self.outcomes.iter().map(|o| o.score).sum();
        total as f64 / self.outcomes.len() as f64
    }

    pub fn buckets(&self) -> BucketCounts {
        let mut counts = BucketCounts::default();
        for outcome in &self.outcomes {
            match ScoreBucket::from_score(outcome.score) {
                ScoreBucket::Critical => counts.critical += 1,
                ScoreBucket::Poor => counts.poor += 1,
                ScoreBucket::Fair => counts.fair += 1,
                ScoreBucket::Good => counts.good += 1,
            }
        }
        counts
    }

    /// 全部问题：批次级在前，逐题按题号
    pub fn all_issues(&self) -> Vec<ValidationIssue> {
        self.batch_issues
            .iter()
            .chain(self.outcomes.iter().flat_map(|o| o.issues.iter()))
            .cloned()
            .collect()
    }

    pub fn all_warnings(&self) -> Vec<ValidationIssue> {
        self.batch_warnings
            .iter()
            .chain(self.outcomes.iter().flat_map(|o| o.warnings.iter()))
            .cloned()
            .collect()
    }

    /// 恰好 `target` 题且全部合格，并且没有批次级问题
    pub fn is_success(&self, target: usize) -> bool {
        self.batch_issues.is_empty()
            && self.outcomes.len() == target
            && self.outcomes.iter().all(|o| o.valid)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.buckets();
        write!(
            f,
            "合格 {}/{} | 平均分 {:.1} | good {} / fair {} / poor {} / critical {} | 批次问题 {}",
            self.passed(),
            self.outcomes.len(),
            self.mean_score(),
            buckets.good,
            buckets.fair,
            buckets.poor,
            buckets.critical,
            self.batch_issues.len()
        )
    }
}
