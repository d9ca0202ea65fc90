//! 已有题库查询 - 业务能力层
//!
//! 去重时需要同一专题下已有的题干。

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// 已有题库
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// 专题下已有的题干
    async fn existing_questions(&self, topic_id: &str) -> Result<Vec<String>>;
}

/// 文件题库：`<folder>/<topic_id>.json`
///
/// 文件内容是字符串数组，或带 `prompt_text` / `question` 字段的对象数组。
/// 文件不存在视为空题库。
pub struct FileCorpus {
    folder: PathBuf,
}

impl FileCorpus {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    fn path_for(&self, topic_id: &str) -> PathBuf {
        self.folder.join(format!("{}.json", topic_id))
    }
}

#[async_trait]
impl CorpusSource for FileCorpus {
    async fn existing_questions(&self, topic_id: &str) -> Result<Vec<String>> {
        let path = self.path_for(topic_id);
        if !path.exists() {
            debug!("专题 {} 没有已有题库", topic_id);
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| PipelineError::File {
                path: path.display().to_string(),
                source,
            })?;
        let entries: Vec<Value> = serde_json::from_str(&content)?;

        let questions: Vec<String> = entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(text) => Some(text.clone()),
                Value::Object(map) => map
                    .get("prompt_text")
                    .or_else(|| map.get("question"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect();

        debug!("专题 {} 已有题目 {} 道", topic_id, questions.len());
        Ok(questions)
    }
}
