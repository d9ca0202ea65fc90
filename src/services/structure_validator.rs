//! 结构校验
//!
//! 题干、解析非空，四个选项非空且互不相同，正确答案字母落在选项范围内。

use std::collections::HashSet;

use crate::models::{CandidateItem, IssueCode, ValidationIssue};
use crate::services::normalizer::normalize_for_match;

pub fn check_structure(index: usize, item: &CandidateItem) -> Vec<ValidationIssue> {
    let mut problems = Vec::new();

    if item.prompt_text.trim().is_empty() {
        problems.push("question text is empty".to_string());
    }
    if item.explanation.trim().is_empty() {
        problems.push("explanation is empty".to_string());
    }

    let mut seen = HashSet::new();
    for (i, option) in item.options.iter().enumerate() {
        let key = normalize_for_match(option);
        let letter = (b'A' + i as u8) as char;
        if key.is_empty() {
            problems.push(format!("option {} is empty", letter));
        } else if !seen.insert(key) {
            problems.push(format!("option {} repeats another option", letter));
        }
    }

    problems
        .into_iter()
        .map(|message| ValidationIssue::item(index, IssueCode::MalformedStructure, message))
        .collect()
}
