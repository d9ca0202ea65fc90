//! 提示词构建
//!
//! 提示词用英文书写，要求生成器使用依据材料的语言出题。
//! 修正意见和问题描述同样是英文，直接拼进下一轮提示词。

use crate::models::{GenerationMode, TopicJob};
use crate::workflow::retry_state::RetryState;

/// 期望的输出形状，输出无法解析时也用它提醒生成器
pub fn expected_shape(target_count: usize) -> String {
    format!(
        "a JSON array of exactly {} objects and nothing else (no prose, no code fences), each shaped like \
         {{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \"correct\": \"A\", \
         \"explanation\": \"...\", \"difficulty\": \"easy|medium|hard\"}}",
        target_count
    )
}

pub fn system_prompt(mode: GenerationMode) -> String {
    let base = "You are an expert author of multiple-choice questions for public administration \
                competitive examinations. You write strictly from the legal source text you are given, \
                you never invent articles or laws, and you always answer with valid JSON only.";
    match mode {
        GenerationMode::Theme => base.to_string(),
        GenerationMode::PracticalCase => format!(
            "{} You specialise in practical cases: short realistic scenarios that require applying \
             the rules of the source text to a concrete situation.",
            base
        ),
    }
}

/// 截断依据材料（按字符，不切断多字节字符）
pub fn truncate_source(source: &str, max_chars: usize) -> String {
    match source.char_indices().nth(max_chars) {
        Some((byte_index, _)) => source[..byte_index].to_string(),
        None => source.to_string(),
    }
}

/// 构建一次尝试的用户提示词
pub fn user_prompt(
    job: &TopicJob,
    source: &str,
    mandatory_quotes: &[String],
    target_count: usize,
    state: &RetryState,
) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "Write exactly {} multiple-choice questions about \"{}\". \
         Write them in the same language as the source text.",
        target_count, job.title
    ));

    if job.mode == GenerationMode::PracticalCase {
        sections.push(
            "Every question must open with a short practical case (two or three sentences describing \
             a concrete administrative situation) and then ask how the rules apply to it."
                .to_string(),
        );
    }

    sections.push(
        [
            "Rules for every question:",
            "1. Exactly 4 options and exactly one correct option.",
            "2. The explanation must cite the article it relies on (for example \"Artículo 21\") and the law with its number (for example \"Ley 39/2015\").",
            "3. The explanation must quote the source text word for word between double quotes.",
            "4. The explanation must say why at least two of the incorrect options are wrong, naming them by letter (for example \"option B is incorrect because ...\").",
            "5. Do not repeat or paraphrase questions that already exist, and do not repeat a question within the batch.",
            "6. Vary the position of the correct answer across the batch.",
        ]
        .join("\n"),
    );

    if let Some(instructions) = job.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(format!("Additional instructions:\n{}", instructions.trim()));
    }

    if !mandatory_quotes.is_empty() {
        let list = mandatory_quotes
            .iter()
            .enumerate()
            .map(|(i, quote)| format!("{}. \"{}\"", i + 1, quote))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "Mandatory quotes: every explanation must include at least one of these fragments copied exactly, between double quotes:\n{}",
            list
        ));
    }

    sections.push(format!("Source text:\n<<<\n{}\n>>>", source));

    if state.has_feedback() {
        sections.push(format!(
            "Your previous answers were rejected. Fix every problem listed below in this new batch:\n{}",
            state.accumulated_feedback.join("\n")
        ));
    }

    sections.push(format!("Answer with {}.", expected_shape(target_count)));

    sections.join("\n\n")
}
