//! 批次处理上下文
//!
//! 封装"我正在为哪个专题生成第几批题目"这一信息

use std::fmt::Display;

use crate::models::{GenerationMode, TopicJob};

/// 批次处理上下文
#[derive(Debug, Clone)]
pub struct BatchCtx {
    /// 专题ID
    pub topic_id: String,

    /// 专题索引（仅用于日志显示，从1开始）
    pub topic_index: usize,

    pub mode: GenerationMode,
}

impl BatchCtx {
    pub fn new(topic_id: String, topic_index: usize, mode: GenerationMode) -> Self {
        Self {
            topic_id,
            topic_index,
            mode,
        }
    }

    pub fn for_job(job: &TopicJob, topic_index: usize) -> Self {
        Self::new(job.topic_id.clone(), topic_index, job.mode)
    }
}

impl Display for BatchCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            GenerationMode::Theme => "主题",
            GenerationMode::PracticalCase => "案例",
        };
        write!(f, "[专题 ID#{} 序号#{} 模式#{}]", self.topic_id, self.topic_index, mode)
    }
}
