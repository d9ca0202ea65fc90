use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, PipelineError};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的专题数量（1 表示顺序处理）
    pub max_concurrent_topics: usize,
    /// 专题任务 TOML 存放目录
    pub jobs_folder: String,
    /// 已有题库目录（每个专题一个 JSON 文件）
    pub corpus_folder: String,
    /// 通过校验的题目输出目录
    pub output_folder: String,
    /// 生成失败记录文件
    pub failure_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 两批专题之间的等待时间（毫秒）
    pub topic_delay_ms: u64,
    /// 两次生成请求之间的最小间隔（毫秒）
    pub min_request_interval_ms: u64,
    /// 单次生成请求超时（秒）
    pub request_timeout_secs: u64,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 校验与重试参数
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_topics: 1,
            jobs_folder: "topics".to_string(),
            corpus_folder: "corpus".to_string(),
            output_folder: "accepted".to_string(),
            failure_log_file: "failed_topics.txt".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            topic_delay_ms: 2000,
            min_request_interval_ms: 1000,
            request_timeout_secs: 180,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_topics: std::env::var("MAX_CONCURRENT_TOPICS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_topics),
            jobs_folder: std::env::var("JOBS_FOLDER").unwrap_or(default.jobs_folder),
            corpus_folder: std::env::var("CORPUS_FOLDER").unwrap_or(default.corpus_folder),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            failure_log_file: std::env::var("FAILURE_LOG_FILE").unwrap_or(default.failure_log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            topic_delay_ms: std::env::var("TOPIC_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.topic_delay_ms),
            min_request_interval_ms: std::env::var("MIN_REQUEST_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.min_request_interval_ms),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            pipeline: default.pipeline,
        }
    }

    /// 读取环境变量，并在设置了 `PIPELINE_CONFIG` 时加载校验参数文件
    pub fn load() -> Result<Self, PipelineError> {
        let mut config = Self::from_env();
        if let Ok(path) = std::env::var("PIPELINE_CONFIG") {
            config.pipeline = PipelineConfig::from_toml_file(Path::new(&path))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// 检查必需的配置项
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::EnvVarNotFound {
                var_name: "LLM_API_KEY".to_string(),
            });
        }
        if self.max_concurrent_topics == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CONCURRENT_TOPICS".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        self.pipeline.validate()
    }
}

/// 生成与重试参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 每批需要的题目数量
    pub target_count: usize,
    /// 最大生成尝试次数
    pub max_attempts: u32,
    /// 每次尝试使用的温度，递减
    pub temperature_schedule: Vec<f32>,
    pub max_output_tokens: u32,
    /// 每轮反馈最多带多少条问题
    pub max_feedback_issues: usize,
    /// 瞬时错误（超时、5xx）的重试次数
    pub transient_retries: u32,
    /// 瞬时错误重试的基础等待时间（毫秒），按 2 的幂增长
    pub backoff_base_ms: u64,
    /// 发给生成器的必引片段数量
    pub mandatory_quote_count: usize,
    /// 提示词中依据材料的最大字符数
    pub max_source_chars: usize,
    pub validation: ValidationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_count: 15,
            max_attempts: 3,
            temperature_schedule: vec![0.7, 0.5, 0.3],
            max_output_tokens: 8000,
            max_feedback_issues: 12,
            transient_retries: 3,
            backoff_base_ms: 1000,
            mandatory_quote_count: 6,
            max_source_chars: 12000,
            validation: ValidationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从 TOML 文件加载，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::File {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 第 `attempt` 次尝试（从 1 开始）的温度，超出时沿用最后一个值
    pub fn temperature_for(&self, attempt: u32) -> f32 {
        let index = (attempt.max(1) - 1) as usize;
        self.temperature_schedule
            .get(index)
            .or_else(|| self.temperature_schedule.last())
            .copied()
            .unwrap_or(0.3)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_count == 0 {
            return Err(ConfigError::InvalidValue {
                name: "target_count".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_attempts".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        self.validation.validate()
    }
}

/// 错误选项说明检查的严格程度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// 只记警告
    #[default]
    Warning,
    /// 视为不合格
    HardFail,
}

/// 校验阈值
///
/// 所有校验组件都从这里取参数，不使用全局常量。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// 题干 Jaccard 相似度达到该值即视为重复
    pub similarity_threshold: f64,
    /// 引用片段长度下限（字符）
    pub quote_min_chars: usize,
    /// 引用片段长度上限（字符）
    pub quote_max_chars: usize,
    /// 必引片段长度下限
    pub fragment_min_chars: usize,
    /// 必引片段长度上限
    pub fragment_max_chars: usize,
    /// 必引片段至少包含的字母数
    pub fragment_min_letters: usize,
    /// 兜底片段长度范围
    pub fallback_min_chars: usize,
    pub fallback_max_chars: usize,
    /// 存在必引片段时，解析必须逐字使用其中之一
    pub require_mandatory_quote: bool,
    /// 三个错误选项中至少要提到几个
    pub min_incorrect_referenced: usize,
    pub justification_strictness: Strictness,
    /// 解析缺少引用时，允许从依据材料中提取条款补上
    pub allow_citation_synthesis: bool,
    /// 相同答案字母最多连续出现次数
    pub max_run: usize,
    /// 一批中至少出现的不同答案字母数
    pub min_distinct_letters: usize,
    pub rebalance_max_iterations: usize,
    /// 合格分数线
    pub min_pass_score: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.70,
            quote_min_chars: 15,
            quote_max_chars: 400,
            fragment_min_chars: 25,
            fragment_max_chars: 260,
            fragment_min_letters: 12,
            fallback_min_chars: 60,
            fallback_max_chars: 180,
            require_mandatory_quote: true,
            min_incorrect_referenced: 2,
            justification_strictness: Strictness::Warning,
            allow_citation_synthesis: true,
            max_run: 2,
            min_distinct_letters: 3,
            rebalance_max_iterations: 64,
            min_pass_score: 60,
        }
    }
}

impl ValidationConfig {
    /// 严格模式：错误选项说明不足直接判不合格
    pub fn strict() -> Self {
        Self {
            justification_strictness: Strictness::HardFail,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                name: "similarity_threshold".to_string(),
                reason: format!("{} 不在 [0, 1] 范围内", self.similarity_threshold),
            });
        }
        if self.quote_min_chars > self.quote_max_chars {
            return Err(ConfigError::InvalidValue {
                name: "quote_min_chars".to_string(),
                reason: "不能大于 quote_max_chars".to_string(),
            });
        }
        if self.max_run == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_run".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.min_distinct_letters > 4 {
            return Err(ConfigError::InvalidValue {
                name: "min_distinct_letters".to_string(),
                reason: "最多只有 4 个字母".to_string(),
            });
        }
        Ok(())
    }
}
