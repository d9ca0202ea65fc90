//! 单批校验 - 流程层
//!
//! 一次尝试的生成器输出 → 解析 → 规范化 → 去重 → 结构/引用/出处校验 → 批次报告。
//! 纯函数，不调用外部服务，同样的输入得到同样的结果。

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::models::{decode_batch, decode_record, CandidateItem, IssueCode, ValidationIssue, ValidationOutcome};
use crate::services::citation_validator::CitationValidator;
use crate::services::deduplicator::{Deduplicator, MatchSource};
use crate::services::normalizer::normalize;
use crate::services::quote_grounding::QuoteGrounding;
use crate::services::structure_validator::check_structure;
use crate::services::validation_report::BatchReport;
use crate::workflow::prompt::expected_shape;

/// 单批校验结果
#[derive(Debug, Clone)]
pub struct BatchValidation {
    /// 成功解析的题目（已做规范化和修复），按原顺序
    pub items: Vec<CandidateItem>,
    pub report: BatchReport,
}

impl BatchValidation {
    pub fn is_success(&self, target_count: usize) -> bool {
        self.report.is_success(target_count) && self.items.len() == target_count
    }
}

pub struct BatchValidator<'a> {
    config: &'a PipelineConfig,
    source: &'a str,
    grounding: QuoteGrounding,
    citations: CitationValidator,
    dedup: Deduplicator,
}

impl<'a> BatchValidator<'a> {
    pub fn new(config: &'a PipelineConfig, source: &'a str, mandatory_quotes: Vec<String>) -> Self {
        Self {
            config,
            source,
            grounding: QuoteGrounding::new(source, mandatory_quotes, &config.validation),
            citations: CitationValidator::new(&config.validation),
            dedup: Deduplicator::new(config.validation.similarity_threshold),
        }
    }

    pub fn validate(&self, raw: &str, corpus: &[String]) -> BatchValidation {
        let target = self.config.target_count;

        let decoded = match decode_batch(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                return BatchValidation {
                    items: Vec::new(),
                    report: BatchReport::failed(ValidationIssue::batch(
                        IssueCode::MalformedOutput,
                        format!("{}; the response must be {}", decode_error_text(&e), expected_shape(target)),
                    )),
                };
            }
        };
        debug!("输出形状: {:?}, 记录数: {}", decoded.shape, decoded.records.len());

        let mut batch_issues = Vec::new();
        let mut batch_warnings = Vec::new();

        let mut records: Vec<JsonValue> = decoded.records;
        if records.len() > target {
            batch_warnings.push(ValidationIssue::batch(
                IssueCode::ExtraItemsDiscarded,
                format!("{} questions returned, only the first {} were kept", records.len(), target),
            ));
            records.truncate(target);
        }
        if records.len() < target {
            batch_issues.push(ValidationIssue::batch(
                IssueCode::BatchIncomplete,
                format!("expected exactly {} questions, got {}", target, records.len()),
            ));
        }

        let mut outcomes: Vec<Option<ValidationOutcome>> = vec![None; records.len()];
        let mut decoded_items = Vec::new();
        let mut positions = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match decode_record(record, self.source) {
                Ok(item) => {
                    positions.push(index);
                    decoded_items.push(normalize_item(item));
                }
                Err(problems) => {
                    let issues = problems
                        .into_iter()
                        .map(|p| ValidationIssue::item(index, IssueCode::MalformedStructure, p))
                        .collect();
                    outcomes[index] = Some(self.outcome(issues, Vec::new()));
                }
            }
        }

        let dedup = self.dedup.filter(decoded_items, corpus);

        for dropped in &dedup.dropped {
            let index = positions[dropped.index];
            let origin = match dropped.matched.source {
                MatchSource::Corpus(_) => "an existing question".to_string(),
                MatchSource::Batch(i) => format!("question {} of this batch", positions[i] + 1),
            };
            let issue = ValidationIssue::item(
                index,
                IssueCode::Duplicate,
                format!(
                    "too similar ({:.2}) to {}: \"{}\"",
                    dropped.matched.similarity, origin, dropped.matched.matched_text
                ),
            );
            outcomes[index] = Some(self.outcome(vec![issue], Vec::new()));
        }

        let mut items = Vec::new();
        for (local, mut item) in dedup.kept {
            let index = positions[local];

            let mut issues = check_structure(index, &item);
            let (grounding_issues, mut warnings) = self.grounding.validate(index, &mut item);
            issues.extend(grounding_issues);
            let (citation_issues, citation_warnings) = self.citations.validate(index, &mut item);
            issues.extend(citation_issues);
            warnings.extend(citation_warnings);

            outcomes[index] = Some(self.outcome(issues, warnings));
            items.push(item);
        }

        let report = BatchReport::new(outcomes.into_iter().flatten().collect(), batch_issues, batch_warnings);
        BatchValidation { items, report }
    }

    fn outcome(&self, issues: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> ValidationOutcome {
        ValidationOutcome::new(issues, warnings, self.config.validation.min_pass_score)
    }
}

fn decode_error_text(error: &crate::models::DecodeError) -> &'static str {
    match error {
        crate::models::DecodeError::NoJson => "the response contained no parseable JSON",
        crate::models::DecodeError::NoArray => "the response JSON contained no array of questions",
    }
}

fn normalize_item(mut item: CandidateItem) -> CandidateItem {
    item.prompt_text = normalize(&item.prompt_text);
    for option in item.options.iter_mut() {
        *option = normalize(option);
    }
    item.explanation = normalize(&item.explanation);
    item
}
