//! 题目去重服务 - 业务能力层
//!
//! 用题干分词后的 Jaccard 相似度判断近似重复，先和已有题库比，再和本批已保留的题目比。

use std::collections::BTreeSet;
use tracing::debug;

use crate::models::CandidateItem;
use crate::services::normalizer::{normalize_for_match, tokenize};

/// 重复来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// 已有题库中的第 n 条
    Corpus(usize),
    /// 本批中的第 n 题（原始位置）
    Batch(usize),
}

/// 命中的重复项
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub source: MatchSource,
    pub matched_text: String,
    pub similarity: f64,
}

/// 被丢弃的题目
#[derive(Debug, Clone)]
pub struct DroppedItem {
    /// 在本批中的原始位置
    pub index: usize,
    pub item: CandidateItem,
    pub matched: DuplicateMatch,
}

/// 去重结果
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// 保留的题目及其原始位置，顺序不变
    pub kept: Vec<(usize, CandidateItem)>,
    pub dropped: Vec<DroppedItem>,
}

impl DedupOutcome {
    pub fn kept_items(&self) -> Vec<CandidateItem> {
        self.kept.iter().map(|(_, item)| item.clone()).collect()
    }
}

/// 预处理后的题干
struct Fingerprint {
    key: String,
    tokens: BTreeSet<String>,
}

impl Fingerprint {
    fn new(text: &str) -> Self {
        Self {
            key: normalize_for_match(text),
            tokens: tokenize(text),
        }
    }

    fn similarity(&self, other: &Fingerprint) -> f64 {
        // 没有有效词时永远不算重复
        if self.tokens.is_empty() || other.tokens.is_empty() {
            return 0.0;
        }
        if self.key == other.key {
            return 1.0;
        }
        jaccard(&self.tokens, &other.tokens)
    }
}

/// 两个词集合的 Jaccard 相似度，任一为空时返回 0
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// 两段题干的相似度（已做规范化）
pub fn text_similarity(a: &str, b: &str) -> f64 {
    Fingerprint::new(a).similarity(&Fingerprint::new(b))
}

/// 去重服务
pub struct Deduplicator {
    threshold: f64,
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// 过滤一批题目
    ///
    /// 先出现的保留，后出现的丢弃。报告的命中项是相似度最高的一条（相同时取最先找到的）。
    pub fn filter(&self, batch: Vec<CandidateItem>, corpus: &[String]) -> DedupOutcome {
        let corpus_prints: Vec<Fingerprint> = corpus.iter().map(|t| Fingerprint::new(t)).collect();
        let mut kept_prints: Vec<(usize, Fingerprint)> = Vec::new();
        let mut outcome = DedupOutcome::default();

        for (index, item) in batch.into_iter().enumerate() {
            let print = Fingerprint::new(&item.prompt_text);
            let mut best: Option<DuplicateMatch> = None;

            let corpus_hits = corpus_prints
                .iter()
                .enumerate()
                .map(|(i, p)| (MatchSource::Corpus(i), &corpus[i], print.similarity(p)));
            for (source, text, similarity) in corpus_hits {
                if similarity >= self.threshold
                    && best.as_ref().map_or(true, |b| similarity > b.similarity)
                {
                    best = Some(DuplicateMatch {
                        source,
                        matched_text: text.clone(),
                        similarity,
                    });
                }
            }

            for (kept_index, kept_print) in &kept_prints {
                let similarity = print.similarity(kept_print);
                if similarity >= self.threshold
                    && best.as_ref().map_or(true, |b| similarity > b.similarity)
                {
                    let matched_text = outcome
                        .kept
                        .iter()
                        .find(|(i, _)| i == kept_index)
                        .map(|(_, kept)| kept.prompt_text.clone())
                        .unwrap_or_default();
                    best = Some(DuplicateMatch {
                        source: MatchSource::Batch(*kept_index),
                        matched_text,
                        similarity,
                    });
                }
            }

            match best {
                Some(matched) => {
                    debug!(
                        "题目 {} 判定为重复 (相似度 {:.2}, 来源 {:?})",
                        index + 1,
                        matched.similarity,
                        matched.source
                    );
                    outcome.dropped.push(DroppedItem {
                        index,
                        item,
                        matched,
                    });
                }
                None => {
                    kept_prints.push((index, print));
                    outcome.kept.push((index, item));
                }
            }
        }

        outcome
    }
}
