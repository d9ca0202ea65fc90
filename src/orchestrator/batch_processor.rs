//! 批量专题处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量专题的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：初始化日志文件、创建生成器、节流器、题库和输出组件
//! 2. **批量加载**：扫描并加载所有待处理的专题（`Vec<TopicJob>`）
//! 3. **并发控制**：使用 Semaphore 限制并发数量
//! 4. **分批处理**：将专题分批次处理，批与批之间等待 `topic_delay_ms`
//! 5. **资源管理**：所有并发任务共用同一个生成器节流器
//! 6. **全局统计**：汇总所有专题的处理结果
//! 7. **配置错误终止**：生成器凭证或模型配置错误时，不再启动后续批次
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个专题的细节
//! - **向下委托**：委托 topic_processor 处理单个专题

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::infrastructure::{GenerationThrottle, OpenAiGenerator, QuestionGenerator};
use crate::models::{load_all_topic_jobs, TopicJob};
use crate::orchestrator::topic_processor::{self, TopicDeps};
use crate::services::{AcceptedSink, CorpusSource, FailureWriter, FileCorpus, JsonFileSink};
use crate::utils::logging;
use crate::workflow::GenerationFlow;

/// 应用主结构
pub struct App {
    config: Config,
    flow: Arc<GenerationFlow>,
    corpus: Arc<dyn CorpusSource>,
    sink: Arc<dyn AcceptedSink>,
    failure_writer: Arc<FailureWriter>,
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// 保存的合格题目总数
    pub accepted_questions: usize,
}

/// 批次处理结果
#[derive(Debug, Default)]
struct BatchResult {
    success: usize,
    failed: usize,
    accepted_questions: usize,
    /// 生成器配置错误（所有专题都会失败）
    misconfigured: Option<String>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(config.max_concurrent_topics, &config.llm_model_name);

        let generator: Arc<dyn QuestionGenerator> = Arc::new(OpenAiGenerator::new(&config));
        let corpus: Arc<dyn CorpusSource> = Arc::new(FileCorpus::new(&config.corpus_folder));
        let sink: Arc<dyn AcceptedSink> = Arc::new(JsonFileSink::new(&config.output_folder));

        Ok(Self::with_components(config, generator, corpus, sink))
    }

    /// 使用指定组件创建应用
    pub fn with_components(
        config: Config,
        generator: Arc<dyn QuestionGenerator>,
        corpus: Arc<dyn CorpusSource>,
        sink: Arc<dyn AcceptedSink>,
    ) -> Self {
        let throttle = Arc::new(GenerationThrottle::new(Duration::from_millis(
            config.min_request_interval_ms,
        )));
        let flow = Arc::new(GenerationFlow::new(generator, throttle, config.pipeline.clone()));
        let failure_writer = Arc::new(FailureWriter::with_path(config.failure_log_file.clone()));

        Self {
            config,
            flow,
            corpus,
            sink,
            failure_writer,
        }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunStats> {
        info!("\n📁 正在扫描待处理的专题...");
        let jobs = load_all_topic_jobs(&self.config.jobs_folder).await?;

        if jobs.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(RunStats::default());
        }

        logging::log_topics_loaded(jobs.len(), self.config.max_concurrent_topics);

        let stats = self.process_jobs(jobs).await?;

        logging::print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            stats.accepted_questions,
            &self.config.output_log_file,
        );

        Ok(stats)
    }

    /// 处理所有专题
    ///
    /// 遇到生成器配置错误时，当前批次结束后停止，返回错误。
    pub async fn process_jobs(&self, jobs: Vec<TopicJob>) -> Result<RunStats> {
        let chunk_size = self.config.max_concurrent_topics.max(1);
        let semaphore = Arc::new(Semaphore::new(chunk_size));
        let total = jobs.len();
        let total_batches = total.div_ceil(chunk_size);
        let mut stats = RunStats {
            total,
            ..Default::default()
        };

        for (batch_idx, batch_jobs) in jobs.chunks(chunk_size).enumerate() {
            let batch_start = batch_idx * chunk_size;
            let batch_num = batch_idx + 1;

            if batch_idx > 0 && self.config.topic_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.topic_delay_ms)).await;
            }

            logging::log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_start + batch_jobs.len(),
                total,
            );

            let batch_result = self
                .process_batch(batch_jobs, batch_start, semaphore.clone())
                .await?;

            stats.success += batch_result.success;
            stats.failed += batch_result.failed;
            stats.accepted_questions += batch_result.accepted_questions;

            logging::log_batch_complete(
                batch_num,
                batch_result.success,
                batch_result.success + batch_result.failed,
            );

            if let Some(reason) = batch_result.misconfigured {
                let skipped = total - (batch_start + batch_jobs.len());
                error!(
                    "❌ 生成器配置错误，终止处理（成功 {} | 失败 {} | 未处理 {}）: {}",
                    stats.success, stats.failed, skipped, reason
                );
                return Err(anyhow!("生成器配置错误，已终止处理: {}", reason));
            }
        }

        Ok(stats)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch_jobs: &[TopicJob],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<BatchResult> {
        let mut handles = Vec::new();

        for (idx, job) in batch_jobs.iter().enumerate() {
            let topic_index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;

            let job = job.clone();
            let flow = self.flow.clone();
            let corpus = self.corpus.clone();
            let sink = self.sink.clone();
            let failure_writer = self.failure_writer.clone();
            let output_log_file = self.config.output_log_file.clone();
            let verbose_logging = self.config.verbose_logging;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let deps = TopicDeps {
                    flow: &flow,
                    corpus: corpus.as_ref(),
                    sink: sink.as_ref(),
                    failure_writer: &failure_writer,
                    output_log_file: &output_log_file,
                    verbose_logging,
                };
                match topic_processor::process_topic(&deps, job, topic_index).await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        error!("[专题 {}] ❌ 处理过程中发生错误: {:#}", topic_index, e);
                        Err(e)
                    }
                }
            });
            handles.push((topic_index, handle));
        }

        let mut result = BatchResult::default();

        for (topic_index, handle) in handles {
            match handle.await {
                Ok(Ok(Some(count))) => {
                    result.success += 1;
                    result.accepted_questions += count;
                }
                Ok(Ok(None)) => {
                    result.failed += 1;
                }
                Ok(Err(e)) => {
                    result.failed += 1;
                    if let Some(pipeline_error) = e.downcast_ref::<PipelineError>() {
                        if pipeline_error.is_misconfiguration() {
                            result.misconfigured = Some(pipeline_error.to_string());
                        }
                    }
                }
                Err(e) => {
                    error!("[专题 {}] 任务执行失败: {}", topic_index, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }
}
