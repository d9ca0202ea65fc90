use thiserror::Error;

use crate::models::{IssueCode, ValidationIssue};

/// 错误信息中最多展示的问题条数
const DISPLAY_ISSUE_LIMIT: usize = 5;

/// 流水线错误
///
/// 校验器遇到质量问题时不会返回错误，只返回问题列表；
/// 这里只包含重试耗尽、调用失败和配置类错误。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 生成器调用失败
    #[error("生成器错误: {0}")]
    Generator(#[from] GeneratorError),

    /// 重试次数用尽，附带最后一次尝试的全部问题
    #[error("generation failed after {attempts} attempts: {}", summarize_issues(.issues, DISPLAY_ISSUE_LIMIT))]
    AttemptsExhausted {
        attempts: u32,
        issues: Vec<ValidationIssue>,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 文件读写失败
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// 是否属于不应重试的配置问题
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_) | PipelineError::Generator(GeneratorError::Misconfigured(_))
        )
    }

    /// 重试耗尽时的全部问题
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            PipelineError::AttemptsExhausted { issues, .. } => issues,
            _ => &[],
        }
    }

    /// 某一类问题的数量
    pub fn count_issues(&self, code: IssueCode) -> usize {
        self.issues().iter().filter(|i| i.code == code).count()
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::File {
            path: String::new(),
            source: err,
        }
    }
}

/// 生成器调用错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    /// 网络错误、上游 5xx、限流等，可以重试
    #[error("瞬时错误: {0}")]
    Transient(String),

    /// 请求超时，可以重试
    #[error("请求超时 ({0} 秒)")]
    Timeout(u64),

    /// 凭证缺失、模型不存在等，不重试
    #[error("上游配置错误: {0}")]
    Misconfigured(String),
}

impl GeneratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GeneratorError::Transient(_) | GeneratorError::Timeout(_))
    }
}

/// 配置错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },

    /// 配置值不合法
    #[error("配置项 {name} 不合法: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// 拼接前 `limit` 条问题，用于错误信息和失败记录
pub fn summarize_issues(issues: &[ValidationIssue], limit: usize) -> String {
    let mut summary = issues
        .iter()
        .take(limit)
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    if issues.len() > limit {
        summary.push_str(&format!(" (+{} more)", issues.len() - limit));
    }
    summary
}

/// 流水线结果类型
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_exhausted_display_lists_first_issues() {
        let issues: Vec<ValidationIssue> = (0..7)
            .map(|i| ValidationIssue::item(i, IssueCode::MissingArticle, "no article"))
            .collect();
        let err = PipelineError::AttemptsExhausted { attempts: 3, issues };
        let text = err.to_string();
        assert!(text.starts_with("generation failed after 3 attempts: item 1 [missing_article]"));
        assert!(text.ends_with("(+2 more)"));
        assert_eq!(err.count_issues(IssueCode::MissingArticle), 7);
    }

    #[test]
    fn test_misconfiguration_detection() {
        let err = PipelineError::from(GeneratorError::Misconfigured("bad key".into()));
        assert!(err.is_misconfiguration());
        let err = PipelineError::from(GeneratorError::Timeout(30));
        assert!(!err.is_misconfiguration());
        assert!(GeneratorError::Timeout(30).is_transient());
    }
}
