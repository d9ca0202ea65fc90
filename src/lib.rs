//! # Question QA
//!
//! 生成题目的质检与修复流水线：调用外部生成器批量出选择题，
//! 逐题校验、能修则修、不能修就带着修正意见重试，只保存整批合格的结果。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 只暴露"调用生成器"的能力
//! - `QuestionGenerator` - 生成器接口，`OpenAiGenerator` 为 OpenAI 兼容实现
//! - `GenerationThrottle` - 所有并发任务共用的调用节流
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `normalizer` - 文本规范化
//! - `Deduplicator` - 题干近似重复判断
//! - `QuoteGrounding` - 引用片段核对与修复
//! - `CitationValidator` - 条款、法规和错误选项说明检查
//! - `DistributionRebalancer` - 答案字母分布调整
//! - `BatchReport` - 批次报告
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个专题生成一批题目"的完整流程
//! - `BatchValidator` - 单次尝试的整批校验
//! - `GenerationFlow` - 状态机（请求 → 校验 → 重试 / 成功 / 失败）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量专题处理器，管理并发和统计
//! - `orchestrator/topic_processor` - 单个专题处理器
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, PipelineConfig, Strictness, ValidationConfig};
pub use error::{ConfigError, GeneratorError, PipelineError, Result};
pub use infrastructure::{GenerationRequest, GenerationThrottle, OpenAiGenerator, QuestionGenerator};
pub use models::{CandidateItem, IssueCode, OptionLetter, TopicJob, ValidationIssue, ValidationOutcome};
pub use orchestrator::{App, RunStats};
pub use workflow::{BatchCtx, FlowOutput, GenerationFlow, RetryState};
