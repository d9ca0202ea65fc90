//! 重试状态
//!
//! 每次尝试使用一份不可变的状态，失败后用 `next` 生成下一份。

use crate::config::PipelineConfig;
use crate::models::ValidationIssue;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// 当前尝试序号（从1开始）
    pub attempt: u32,
    pub max_attempts: u32,
    /// 本次尝试使用的温度
    pub temperature: f32,
    /// 历次失败累积的修正意见，逐行
    pub accumulated_feedback: Vec<String>,
}

impl RetryState {
    pub fn initial(config: &PipelineConfig) -> Self {
        Self {
            attempt: 1,
            max_attempts: config.max_attempts,
            temperature: config.temperature_for(1),
            accumulated_feedback: Vec::new(),
        }
    }

    /// 记录本次失败的问题，进入下一次尝试
    ///
    /// 每次最多记 `max_feedback_issues` 条，超出部分只记数量。
    pub fn next(&self, issues: &[ValidationIssue], config: &PipelineConfig) -> Self {
        let max_issues = config.max_feedback_issues;
        let mut feedback = self.accumulated_feedback.clone();
        feedback.push(format!("Attempt {} was rejected:", self.attempt));
        feedback.extend(issues.iter().take(max_issues).map(|issue| format!("- {}", issue)));
        if issues.len() > max_issues {
            feedback.push(format!("- ... and {} more problems of the same kind", issues.len() - max_issues));
        }

        let attempt = self.attempt + 1;
        Self {
            attempt,
            max_attempts: self.max_attempts,
            temperature: config.temperature_for(attempt),
            accumulated_feedback: feedback,
        }
    }

    /// 是否已是最后一次尝试
    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn has_feedback(&self) -> bool {
        !self.accumulated_feedback.is_empty()
    }
}
