//! 失败记录服务 - 业务能力层
//!
//! 只负责"写失败记录文件"能力，不关心流程

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::error::summarize_issues;
use crate::models::ValidationIssue;

/// 失败记录中最多列出的问题条数
const RECORDED_ISSUE_LIMIT: usize = 12;

/// 失败记录服务
///
/// 职责：
/// - 将最终失败的专题追加写入失败记录文件
/// - 每个专题一行，附带前几条问题
pub struct FailureWriter {
    file_path: String,
}

impl FailureWriter {
    pub fn new() -> Self {
        Self {
            file_path: "failed_topics.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.file_path
    }

    /// 写入一条失败记录
    ///
    /// # 参数
    /// - `topic_id`: 专题ID
    /// - `reason`: 失败原因
    /// - `issues`: 最后一次尝试的问题列表（可以为空）
    pub fn write(&self, topic_id: &str, reason: &str, issues: &[ValidationIssue]) -> Result<()> {
        debug!("写入失败记录: 专题 {} | 问题数: {}", topic_id, issues.len());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .with_context(|| format!("无法打开失败记录文件: {}", self.file_path))?;

        let mut line = format!("专题 {} | {}", topic_id, reason.replace('\n', " "));
        if !issues.is_empty() {
            line.push_str(" | ");
            line.push_str(&summarize_issues(issues, RECORDED_ISSUE_LIMIT));
        }
        line.push('\n');

        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl Default for FailureWriter {
    fn default() -> Self {
        Self::new()
    }
}
