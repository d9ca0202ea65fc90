//! 合格题目保存 - 业务能力层
//!
//! 只接收整批通过校验并调整过答案分布的题目。

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::CandidateItem;

#[async_trait]
pub trait AcceptedSink: Send + Sync {
    async fn persist(&self, topic_id: &str, items: &[CandidateItem]) -> Result<()>;
}

#[derive(Serialize)]
struct AcceptedBatch<'a> {
    topic_id: &'a str,
    generated_at: String,
    items: &'a [CandidateItem],
}

/// 写入 `<folder>/<topic_id>.json`，已存在时覆盖
pub struct JsonFileSink {
    folder: PathBuf,
}

impl JsonFileSink {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn path_for(&self, topic_id: &str) -> PathBuf {
        self.folder.join(format!("{}.json", topic_id))
    }
}

#[async_trait]
impl AcceptedSink for JsonFileSink {
    async fn persist(&self, topic_id: &str, items: &[CandidateItem]) -> Result<()> {
        fs::create_dir_all(&self.folder)
            .await
            .map_err(|source| PipelineError::File {
                path: self.folder.display().to_string(),
                source,
            })?;

        let batch = AcceptedBatch {
            topic_id,
            generated_at: chrono::Local::now().to_rfc3339(),
            items,
        };
        let json = serde_json::to_string_pretty(&batch)?;

        let path = self.path_for(topic_id);
        fs::write(&path, json)
            .await
            .map_err(|source| PipelineError::File {
                path: path.display().to_string(),
                source,
            })?;

        info!("💾 已保存 {} 道题目: {}", items.len(), path.display());
        Ok(())
    }
}
