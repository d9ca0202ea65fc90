//! 批次生成流程 - 流程层
//!
//! 核心职责：定义"一个专题生成一批合格题目"的完整流程
//!
//! 状态机：
//! `Idle → Requesting → Validating → {Success | Retrying → Requesting | Failed}`
//!
//! - Requesting：按温度表调用生成器；超时和瞬时错误在这里按指数退避重试，
//!   用尽后本次尝试记为失败；配置类错误直接终止
//! - Validating：整批校验，只有恰好 `target_count` 题全部合格才算成功
//! - Retrying：把问题（限量）累积进修正意见，进入下一次尝试
//! - Success：调整答案分布后返回
//! - Failed：返回带最后一次全部问题的错误，不返回部分结果

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{summarize_issues, GeneratorError, PipelineError, Result};
use crate::infrastructure::{GenerationRequest, GenerationThrottle, QuestionGenerator};
use crate::models::{CandidateItem, IssueCode, TopicJob, ValidationIssue};
use crate::services::distribution_rebalancer::{DistributionRebalancer, RebalanceReport};
use crate::services::quote_grounding::select_mandatory_quotes;
use crate::services::validation_report::BatchReport;
use crate::workflow::batch_ctx::BatchCtx;
use crate::workflow::batch_validator::{BatchValidation, BatchValidator};
use crate::workflow::prompt::{system_prompt, truncate_source, user_prompt};
use crate::workflow::retry_state::RetryState;

/// 日志中展示的问题条数
const LOGGED_ISSUE_LIMIT: usize = 5;

/// 流程状态
#[derive(Debug)]
enum FlowState {
    Idle,
    Requesting(RetryState),
    Validating { retry: RetryState, raw: String },
    Retrying(RetryState),
    Success { attempts: u32, validation: BatchValidation },
    Failed { attempts: u32, issues: Vec<ValidationIssue> },
}

/// 流程输出
#[derive(Debug, Clone)]
pub struct FlowOutput {
    /// 合格且已调整答案分布的题目
    pub items: Vec<CandidateItem>,
    pub report: BatchReport,
    pub rebalance: RebalanceReport,
    /// 使用的尝试次数
    pub attempts: u32,
}

/// 批次生成流程
///
/// - 编排生成、校验、重试
/// - 不持有可变状态，多个专题可以并发使用同一个实例
/// - 与其他实例共用同一个生成器节流器
pub struct GenerationFlow {
    generator: Arc<dyn QuestionGenerator>,
    throttle: Arc<GenerationThrottle>,
    config: PipelineConfig,
}

impl GenerationFlow {
    pub fn new(
        generator: Arc<dyn QuestionGenerator>,
        throttle: Arc<GenerationThrottle>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator,
            throttle,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 为一个专题生成一批合格题目
    pub async fn run(&self, job: &TopicJob, corpus: &[String], ctx: &BatchCtx) -> Result<FlowOutput> {
        let source = truncate_source(&job.base_content, self.config.max_source_chars);
        let mandatory = select_mandatory_quotes(&source, self.config.mandatory_quote_count, &self.config.validation);
        debug!("{} 必引片段 {} 个", ctx, mandatory.len());

        let validator = BatchValidator::new(&self.config, &source, mandatory.clone());
        let system = system_prompt(job.mode);

        let mut state = FlowState::Idle;
        loop {
            state = match state {
                FlowState::Idle => FlowState::Requesting(RetryState::initial(&self.config)),

                FlowState::Requesting(retry) => {
                    let request = GenerationRequest {
                        prompt_text: user_prompt(job, &source, &mandatory, self.config.target_count, &retry),
                        system_prompt: Some(system.clone()),
                        temperature: retry.temperature,
                        max_output_size: self.config.max_output_tokens,
                    };
                    info!(
                        "[专题 {}] 🤖 第 {}/{} 次生成 (温度 {:.1})...",
                        ctx.topic_index, retry.attempt, retry.max_attempts, request.temperature
                    );

                    match self.request_with_backoff(&request, ctx).await {
                        Ok(raw) => FlowState::Validating { retry, raw },
                        Err(e) if !e.is_transient() => {
                            warn!("[专题 {}] ❌ 生成器配置错误，不再重试: {}", ctx.topic_index, e);
                            return Err(PipelineError::Generator(e));
                        }
                        Err(e) => {
                            let issue = ValidationIssue::batch(
                                IssueCode::GeneratorUnavailable,
                                format!("generator unavailable after {} tries: {}", self.config.transient_retries, e),
                            );
                            self.after_failure(retry, &BatchReport::failed(issue), ctx)
                        }
                    }
                }

                FlowState::Validating { retry, raw } => {
                    let validation = validator.validate(&raw, corpus);
                    info!("[专题 {}] 📋 校验结果: {}", ctx.topic_index, validation.report);

                    if validation.is_success(self.config.target_count) {
                        FlowState::Success {
                            attempts: retry.attempt,
                            validation,
                        }
                    } else {
                        self.after_failure(retry, &validation.report, ctx)
                    }
                }

                FlowState::Retrying(next) => {
                    info!(
                        "[专题 {}] 🔄 带 {} 行修正意见重新生成",
                        ctx.topic_index,
                        next.accumulated_feedback.len()
                    );
                    FlowState::Requesting(next)
                }

                FlowState::Success { attempts, validation } => {
                    let BatchValidation { mut items, report } = validation;
                    let rebalance = DistributionRebalancer::new(&self.config.validation).rebalance(&mut items);
                    if !rebalance.compliant {
                        warn!("[专题 {}] ⚠️ 答案分布未能完全调整", ctx.topic_index);
                    }
                    info!(
                        "[专题 {}] ✓ 第 {} 次尝试通过，{} 道题目，调整答案 {} 处",
                        ctx.topic_index,
                        attempts,
                        items.len(),
                        rebalance.relabels.len()
                    );
                    return Ok(FlowOutput {
                        items,
                        report,
                        rebalance,
                        attempts,
                    });
                }

                FlowState::Failed { attempts, issues } => {
                    return Err(PipelineError::AttemptsExhausted { attempts, issues });
                }
            };
        }
    }

    /// 一次尝试失败后的去向
    fn after_failure(&self, retry: RetryState, report: &BatchReport, ctx: &BatchCtx) -> FlowState {
        let issues = report.all_issues();
        warn!(
            "[专题 {}] ⚠️ 第 {} 次尝试未通过 ({} 个问题): {}",
            ctx.topic_index,
            retry.attempt,
            issues.len(),
            summarize_issues(&issues, LOGGED_ISSUE_LIMIT)
        );

        if retry.is_last() {
            FlowState::Failed {
                attempts: retry.attempt,
                issues,
            }
        } else {
            FlowState::Retrying(retry.next(&issues, &self.config))
        }
    }

    /// 调用生成器，瞬时错误按指数退避重试
    async fn request_with_backoff(
        &self,
        request: &GenerationRequest,
        ctx: &BatchCtx,
    ) -> std::result::Result<String, GeneratorError> {
        let tries = self.config.transient_retries.max(1);
        let mut last_error = GeneratorError::Transient("generator was not called".to_string());

        for try_index in 1..=tries {
            self.throttle.acquire().await;

            match self.generator.generate(request).await {
                Ok(raw) => {
                    debug!("{} 生成器返回 {} 字符", ctx, raw.chars().count());
                    return Ok(raw);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("[专题 {}] ⚠️ 生成器调用失败 ({}/{}): {}", ctx.topic_index, try_index, tries, e);
                    last_error = e;
                    if try_index < tries {
                        let delay = self.config.backoff_base_ms.saturating_mul(1u64 << (try_index - 1).min(16));
                        sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}
