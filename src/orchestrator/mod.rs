//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量专题处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载专题（Vec<TopicJob>）
//! - 控制并发数量（Semaphore），所有任务共用一个生成器节流器
//! - 输出全局统计信息
//!
//! ### `topic_processor` - 单个专题处理器
//! - 查询已有题库
//! - 委托 GenerationFlow 生成、校验、重试
//! - 保存合格题目或写失败记录
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<TopicJob>)
//!     ↓
//! topic_processor (处理单个 TopicJob)
//!     ↓
//! workflow::GenerationFlow (生成一批题目：请求 → 校验 → 重试)
//!     ↓
//! services (能力层：去重 / 引用核对 / 引用校验 / 答案分布 / 报告)
//!     ↓
//! infrastructure (基础设施：QuestionGenerator / GenerationThrottle)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，topic_processor 管单个
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体校验判断

pub mod batch_processor;
pub mod topic_processor;

// 重新导出主要类型
pub use batch_processor::{App, RunStats};
pub use topic_processor::{process_topic, TopicDeps};
