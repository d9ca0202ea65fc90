//! 单个专题处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责处理单个专题，是专题级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **查询题库**：取出专题下已有题目，用于去重
//! 2. **流程调度**：委托 `GenerationFlow` 生成并校验一批题目
//! 3. **保存结果**：整批合格时交给 `AcceptedSink`
//! 4. **失败记录**：重试耗尽或调用失败时写入失败记录
//! 5. **统计输出**：记录尝试次数、分数和调整情况

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::error::{summarize_issues, PipelineError};
use crate::models::TopicJob;
use crate::services::{AcceptedSink, CorpusSource, FailureWriter};
use crate::utils::logging::{append_log_line, truncate_text};
use crate::workflow::{BatchCtx, FlowOutput, GenerationFlow};

/// 错误日志中展示的问题条数
const REPORTED_ISSUE_LIMIT: usize = 5;

/// 处理专题所需的组件
pub struct TopicDeps<'a> {
    pub flow: &'a GenerationFlow,
    pub corpus: &'a dyn CorpusSource,
    pub sink: &'a dyn AcceptedSink,
    pub failure_writer: &'a FailureWriter,
    pub output_log_file: &'a str,
    pub verbose_logging: bool,
}

/// 处理单个专题
///
/// # 返回
/// - `Ok(Some(n))`：整批合格，保存了 n 道题目
/// - `Ok(None)`：生成失败，已写入失败记录
/// - `Err`：生成器配置错误，或题库读取、保存结果、写失败记录出错
pub async fn process_topic(deps: &TopicDeps<'_>, job: TopicJob, topic_index: usize) -> Result<Option<usize>> {
    let ctx = BatchCtx::for_job(&job, topic_index);
    log_topic_start(&ctx, &job);

    let corpus = deps
        .corpus
        .existing_questions(&job.topic_id)
        .await
        .with_context(|| format!("无法读取专题 {} 的已有题库", job.topic_id))?;
    info!("[专题 {}] 📚 已有题目 {} 道", topic_index, corpus.len());

    match deps.flow.run(&job, &corpus, &ctx).await {
        Ok(output) => {
            if deps.verbose_logging {
                log_accepted_items(topic_index, &output);
            }

            deps.sink
                .persist(&job.topic_id, &output.items)
                .await
                .with_context(|| format!("无法保存专题 {} 的题目", job.topic_id))?;

            let summary = format!(
                "专题 {} | 成功 | 尝试 {} 次 | {} 道题目 | {} | 警告 {} | 调整答案 {} 处",
                job.topic_id,
                output.attempts,
                output.items.len(),
                output.report,
                output.report.all_warnings().len(),
                output.rebalance.relabels.len()
            );
            append_log_line(deps.output_log_file, &summary)?;
            info!("[专题 {}] ✅ 专题处理完成\n", topic_index);

            Ok(Some(output.items.len()))
        }
        Err(e) => {
            error!(
                "[专题 {}] ❌ generation failed: {}",
                topic_index,
                truncate_text(&failure_summary(&e), 600)
            );

            deps.failure_writer.write(&job.topic_id, &e.to_string(), e.issues())?;
            append_log_line(
                deps.output_log_file,
                &format!("专题 {} | 失败 | {}", job.topic_id, e),
            )?;

            // 配置错误对所有专题都一样，返回错误让批量处理器终止后续批次
            if e.is_misconfiguration() {
                return Err(e.into());
            }
            Ok(None)
        }
    }
}

fn failure_summary(error: &PipelineError) -> String {
    match error {
        PipelineError::AttemptsExhausted { issues, .. } => summarize_issues(issues, REPORTED_ISSUE_LIMIT),
        other => other.to_string(),
    }
}

// ========== 日志辅助函数 ==========

fn log_topic_start(ctx: &BatchCtx, job: &TopicJob) {
    info!("[专题 {}] 开始处理 {}", ctx.topic_index, ctx);
    info!("[专题 {}] 标题: {}", ctx.topic_index, job.title);
    info!(
        "[专题 {}] 依据材料: {} 字符",
        ctx.topic_index,
        job.base_content.chars().count()
    );
}

fn log_accepted_items(topic_index: usize, output: &FlowOutput) {
    for (i, item) in output.items.iter().enumerate() {
        info!("[专题 {}]   {}. {}", topic_index, i + 1, item);
    }
}
