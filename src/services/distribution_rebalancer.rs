//! 答案分布调整服务 - 业务能力层
//!
//! 职责：
//! - 消除同一答案字母的过长连续段
//! - 保证一批题目中出现足够多的不同答案字母
//!
//! 调整方式只有一种：循环移动四个选项并更新正确答案字母，正确选项的文本不变。
//! 解析中明确提到的选项字母按同样的位移改写。

use tracing::debug;

use crate::config::ValidationConfig;
use crate::models::{CandidateItem, OptionLetter};
use crate::services::citation_validator::relabel_option_references;

/// 一次改标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relabel {
    pub index: usize,
    pub from: OptionLetter,
    pub to: OptionLetter,
}

/// 调整结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    pub relabels: Vec<Relabel>,
    pub iterations: usize,
    /// 结束时是否满足全部约束
    pub compliant: bool,
}

impl RebalanceReport {
    pub fn changed(&self) -> bool {
        !self.relabels.is_empty()
    }
}

pub struct DistributionRebalancer {
    max_run: usize,
    min_distinct: usize,
    max_iterations: usize,
}

impl DistributionRebalancer {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            max_run: config.max_run.max(1),
            min_distinct: config.min_distinct_letters.min(4),
            max_iterations: config.rebalance_max_iterations,
        }
    }

    /// 检查是否满足约束
    pub fn is_compliant(&self, items: &[CandidateItem]) -> bool {
        let letters = letters_of(items);
        self.find_long_run(&letters).is_none() && !self.lacks_diversity(&letters)
    }

    /// 原地调整一批题目，题目顺序不变
    pub fn rebalance(&self, items: &mut [CandidateItem]) -> RebalanceReport {
        let mut report = RebalanceReport::default();

        while report.iterations < self.max_iterations {
            let letters = letters_of(items);

            if let Some((start, end)) = self.find_long_run(&letters) {
                report.iterations += 1;
                let mut current = letters;
                for index in start + self.max_run..end {
                    let target = least_used_letter(&current, index);
                    report.relabels.push(relabel(&mut items[index], index, target));
                    current[index] = target;
                }
                continue;
            }

            if self.lacks_diversity(&letters) {
                report.iterations += 1;
                let counts = letter_counts(&letters);
                let Some(unused) = OptionLetter::ALL.into_iter().find(|l| counts[l.index()] == 0) else {
                    break;
                };
                let most_used = most_used_letter(&counts);
                let Some(index) = letters.iter().rposition(|l| *l == most_used) else {
                    break;
                };
                report.relabels.push(relabel(&mut items[index], index, unused));
                continue;
            }

            break;
        }

        report.compliant = self.is_compliant(items);
        if report.changed() {
            debug!(
                "答案分布调整: 改标 {} 题, 迭代 {} 次, 达标: {}",
                report.relabels.len(),
                report.iterations,
                report.compliant
            );
        }
        report
    }

    /// 第一个超长连续段 [start, end)
    fn find_long_run(&self, letters: &[OptionLetter]) -> Option<(usize, usize)> {
        let mut start = 0;
        while start < letters.len() {
            let mut end = start + 1;
            while end < letters.len() && letters[end] == letters[start] {
                end += 1;
            }
            if end - start > self.max_run {
                return Some((start, end));
            }
            start = end;
        }
        None
    }

    fn lacks_diversity(&self, letters: &[OptionLetter]) -> bool {
        let required = self.min_distinct.min(letters.len());
        let distinct = letter_counts(letters).iter().filter(|c| **c > 0).count();
        distinct < required
    }
}

fn letters_of(items: &[CandidateItem]) -> Vec<OptionLetter> {
    items.iter().map(|item| item.correct_letter).collect()
}

fn letter_counts(letters: &[OptionLetter]) -> [usize; 4] {
    let mut counts = [0usize; 4];
    for letter in letters {
        counts[letter.index()] += 1;
    }
    counts
}

/// 使用次数最多的字母，相同时取字母序靠前的
fn most_used_letter(counts: &[usize; 4]) -> OptionLetter {
    let mut best = OptionLetter::A;
    for letter in OptionLetter::ALL {
        if counts[letter.index()] > counts[best.index()] {
            best = letter;
        }
    }
    best
}

/// 给位置 `index` 选新字母：不同于当前字母和左右相邻字母，使用次数最少，相同时按字母序
fn least_used_letter(letters: &[OptionLetter], index: usize) -> OptionLetter {
    let counts = letter_counts(letters);
    let mut excluded = vec![letters[index]];
    if index > 0 {
        excluded.push(letters[index - 1]);
    }
    if let Some(next) = letters.get(index + 1) {
        excluded.push(*next);
    }

    OptionLetter::ALL
        .into_iter()
        .filter(|letter| !excluded.contains(letter))
        .min_by_key(|letter| (counts[letter.index()], letter.index()))
        .unwrap_or(letters[index])
}

fn relabel(item: &mut CandidateItem, index: usize, target: OptionLetter) -> Relabel {
    let from = item.correct_letter;
    let shift = (target.index() + 4 - from.index()) % 4;
    item.rotate_options(shift);
    item.explanation = relabel_option_references(&item.explanation, shift);
    Relabel {
        index,
        from,
        to: item.correct_letter,
    }
}
