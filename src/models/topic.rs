use serde::{Deserialize, Serialize};

/// 生成模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// 按专题批量出题
    #[default]
    Theme,
    /// 案例分析题
    PracticalCase,
}

/// 一个待生成的专题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicJob {
    /// 专题 ID（用于查询题库和保存结果）
    pub topic_id: String,
    pub title: String,
    #[serde(default)]
    pub mode: GenerationMode,
    /// 依据材料，所有引用都必须出自这里
    pub base_content: String,
    /// 额外的出题要求
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl TopicJob {
    pub fn with_file_path(mut self, file_path: String) -> Self {
        self.file_path = Some(file_path);
        self
    }
}
