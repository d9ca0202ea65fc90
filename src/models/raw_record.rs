//! 生成器原始输出解析
//!
//! 生成器返回的 JSON 形状并不固定：可能是顶层数组，可能是包在某个键下的数组，
//! 也可能夹带 Markdown 代码块或说明文字。这里把输出按形状逐一尝试，
//! 找不到数组时返回 `DecodeError`，由调用方把本次尝试记为失败。

use phf::phf_map;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::models::question::{CandidateItem, Difficulty, OptionLetter};

/// 识别出的批次形状
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchShape {
    /// 顶层就是数组
    TopLevelArray,
    /// 对象中已知键下的数组
    KeyedArray(String),
    /// 对象中第一个数组字段
    FirstArrayField(String),
}

/// 解析出的批次
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    pub shape: BatchShape,
    pub records: Vec<JsonValue>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("输出中没有可解析的 JSON")]
    NoJson,
    #[error("JSON 中找不到题目数组")]
    NoArray,
}

/// 包裹数组时常见的键
const KNOWN_BATCH_KEYS: [&str; 6] = ["questions", "preguntas", "items", "data", "results", "batch"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Prompt,
    Options,
    Correct,
    Explanation,
    Difficulty,
}

static FIELD_ALIASES: phf::Map<&'static str, Field> = phf_map! {
    "question" => Field::Prompt,
    "questiontext" => Field::Prompt,
    "question_text" => Field::Prompt,
    "prompt" => Field::Prompt,
    "prompttext" => Field::Prompt,
    "prompt_text" => Field::Prompt,
    "stem" => Field::Prompt,
    "pregunta" => Field::Prompt,
    "enunciado" => Field::Prompt,
    "options" => Field::Options,
    "choices" => Field::Options,
    "answers" => Field::Options,
    "opciones" => Field::Options,
    "alternativas" => Field::Options,
    "respuestas" => Field::Options,
    "correct" => Field::Correct,
    "correctanswer" => Field::Correct,
    "correct_answer" => Field::Correct,
    "correctletter" => Field::Correct,
    "correct_letter" => Field::Correct,
    "correctindex" => Field::Correct,
    "correct_index" => Field::Correct,
    "correctindexorletter" => Field::Correct,
    "correct_index_or_letter" => Field::Correct,
    "answer" => Field::Correct,
    "solution" => Field::Correct,
    "respuesta_correcta" => Field::Correct,
    "respuestacorrecta" => Field::Correct,
    "solucion" => Field::Correct,
    "explanation" => Field::Explanation,
    "explanationtext" => Field::Explanation,
    "explanation_text" => Field::Explanation,
    "rationale" => Field::Explanation,
    "justification" => Field::Explanation,
    "explicacion" => Field::Explanation,
    "explicación" => Field::Explanation,
    "justificacion" => Field::Explanation,
    "justificación" => Field::Explanation,
    "difficulty" => Field::Difficulty,
    "difficultylabel" => Field::Difficulty,
    "difficulty_label" => Field::Difficulty,
    "level" => Field::Difficulty,
    "dificultad" => Field::Difficulty,
    "nivel" => Field::Difficulty,
};

static DIFFICULTY_LABELS: phf::Map<&'static str, Difficulty> = phf_map! {
    "easy" => Difficulty::Easy,
    "low" => Difficulty::Easy,
    "basic" => Difficulty::Easy,
    "facil" => Difficulty::Easy,
    "fácil" => Difficulty::Easy,
    "baja" => Difficulty::Easy,
    "medium" => Difficulty::Medium,
    "intermediate" => Difficulty::Medium,
    "moderate" => Difficulty::Medium,
    "media" => Difficulty::Medium,
    "medio" => Difficulty::Medium,
    "hard" => Difficulty::Hard,
    "high" => Difficulty::Hard,
    "advanced" => Difficulty::Hard,
    "dificil" => Difficulty::Hard,
    "difícil" => Difficulty::Hard,
    "alta" => Difficulty::Hard,
};

/// 解析生成器输出，找出题目数组
pub fn decode_batch(raw: &str) -> Result<DecodedBatch, DecodeError> {
    let payload = parse_json_payload(raw).ok_or(DecodeError::NoJson)?;

    match payload {
        JsonValue::Array(records) => Ok(DecodedBatch {
            shape: BatchShape::TopLevelArray,
            records,
        }),
        JsonValue::Object(map) => {
            // 先找已知键
            for known in KNOWN_BATCH_KEYS {
                let found = map
                    .iter()
                    .find(|(key, value)| key.to_lowercase() == known && value.is_array());
                if let Some((key, JsonValue::Array(records))) = found {
                    return Ok(DecodedBatch {
                        shape: BatchShape::KeyedArray(key.clone()),
                        records: records.clone(),
                    });
                }
            }

            // 再退而求其次：按文档顺序第一个非空数组字段，全为空时取第一个数组字段
            let arrays: Vec<(&String, &Vec<JsonValue>)> = map
                .iter()
                .filter_map(|(key, value)| value.as_array().map(|records| (key, records)))
                .collect();
            arrays
                .iter()
                .find(|(_, records)| !records.is_empty())
                .or_else(|| arrays.first())
                .map(|(key, records)| DecodedBatch {
                    shape: BatchShape::FirstArrayField((*key).clone()),
                    records: (*records).clone(),
                })
                .ok_or(DecodeError::NoArray)
        }
        _ => Err(DecodeError::NoArray),
    }
}

/// 从原始文本中取出 JSON
///
/// 依次尝试：整段文本、代码块内容、第一个 `[`/`{` 到最后一个 `]`/`}` 之间的片段。
fn parse_json_payload(raw: &str) -> Option<JsonValue> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some(value);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str::<JsonValue>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find(|c: char| c == '[' || c == '{')?;
    let end = unfenced.rfind(|c: char| c == ']' || c == '}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<JsonValue>(&unfenced[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // 跳过 ```json 这样的语言标记
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// 把单条记录解析为 `CandidateItem`
///
/// 返回的错误信息会原样进入下一轮的修正提示，所以用英文描述。
pub fn decode_record(value: &JsonValue, source_context: &str) -> Result<CandidateItem, Vec<String>> {
    let Some(map) = value.as_object() else {
        return Err(vec!["record is not a JSON object".to_string()]);
    };

    let mut prompt = None;
    let mut options = None;
    let mut correct = None;
    let mut explanation = None;
    let mut difficulty = None;

    for (key, field_value) in map {
        let Some(field) = FIELD_ALIASES.get(key.trim().to_lowercase().as_str()) else {
            continue;
        };
        let slot = match field {
            Field::Prompt => &mut prompt,
            Field::Options => &mut options,
            Field::Correct => &mut correct,
            Field::Explanation => &mut explanation,
            Field::Difficulty => &mut difficulty,
        };
        if slot.is_none() {
            *slot = Some(field_value);
        }
    }

    let mut errors = Vec::new();

    let prompt_text = match prompt.and_then(|v| v.as_str()) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => {
            errors.push("missing question text".to_string());
            String::new()
        }
    };

    let parsed_options = match options {
        Some(value) => match parse_options(value) {
            Ok(list) => Some(list),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        None => {
            errors.push("missing options array".to_string());
            None
        }
    };

    let correct_letter = match (correct, parsed_options.as_ref()) {
        (Some(value), Some(list)) => {
            let letter = parse_correct(value, list);
            if letter.is_none() {
                errors.push(format!(
                    "correct answer {} is not a letter A-D or an index 0-3",
                    value
                ));
            }
            letter
        }
        (None, _) => {
            errors.push("missing correct answer".to_string());
            None
        }
        (Some(_), None) => None,
    };

    let explanation = explanation
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let difficulty = difficulty
        .and_then(|v| v.as_str())
        .and_then(|label| DIFFICULTY_LABELS.get(label.trim().to_lowercase().as_str()))
        .copied()
        .unwrap_or_default();

    match (parsed_options, correct_letter) {
        (Some(options), Some(correct_letter)) if errors.is_empty() => Ok(CandidateItem {
            prompt_text,
            options,
            correct_letter,
            explanation,
            difficulty,
            source_context: source_context.to_string(),
        }),
        _ => Err(errors),
    }
}

/// 解析选项，必须正好 4 个
fn parse_options(value: &JsonValue) -> Result<[String; 4], String> {
    let texts: Vec<String> = match value {
        JsonValue::Array(entries) => entries.iter().filter_map(option_text).collect(),
        JsonValue::Object(map) => OptionLetter::ALL
            .iter()
            .filter_map(|letter| {
                map.iter()
                    .find(|(key, _)| {
                        let key = key.trim().trim_end_matches([')', '.', ':']);
                        key.len() == 1 && key.starts_with(|c: char| OptionLetter::from_char(c) == Some(*letter))
                    })
                    .and_then(|(_, v)| option_text(v))
            })
            .collect(),
        _ => return Err("options must be an array".to_string()),
    };

    let count = texts.len();
    let texts = strip_option_labels(texts);
    texts
        .try_into()
        .map_err(|_| format!("expected exactly 4 options, got {}", count))
}

fn option_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Object(map) => ["text", "texto", "option", "content", "value"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string),
        _ => None,
    }
}

/// 去掉 "A) ..." 这样的自带标号
///
/// 只有四个选项都按 A-D 顺序带标号时才去掉，避免误删正文。
fn strip_option_labels(texts: Vec<String>) -> Vec<String> {
    if texts.len() != 4 {
        return texts;
    }
    let labelled = texts.iter().zip(OptionLetter::ALL).all(|(text, letter)| {
        let mut chars = text.trim_start().chars();
        let first = chars.next().and_then(OptionLetter::from_char);
        let second = chars.next();
        let third = chars.next();
        first == Some(letter)
            && matches!(second, Some(')') | Some('.') | Some(':') | Some('-'))
            && matches!(third, Some(c) if c.is_whitespace())
    });
    if !labelled {
        return texts;
    }
    texts
        .into_iter()
        .map(|text| text.trim_start().chars().skip(3).collect::<String>().trim().to_string())
        .collect()
}

/// 解析正确答案：字母、0-based 索引，或正确选项的原文
fn parse_correct(value: &JsonValue, options: &[String; 4]) -> Option<OptionLetter> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .and_then(|index| OptionLetter::from_index(index as usize)),
        JsonValue::String(text) => {
            let cleaned = text.trim().trim_end_matches([')', '.', ':']).trim();
            let mut chars = cleaned.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_digit() => {
                    c.to_digit(10).and_then(|d| OptionLetter::from_index(d as usize))
                }
                (Some(c), None) => OptionLetter::from_char(c),
                _ => {
                    let lowered = cleaned.to_lowercase();
                    if let Some(index) = options
                        .iter()
                        .position(|option| option.trim().to_lowercase() == lowered)
                    {
                        return OptionLetter::from_index(index);
                    }
                    // "B) texto" 这样的写法
                    let mut chars = cleaned.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), Some(')')) => OptionLetter::from_char(c),
                        _ => None,
                    }
                }
            }
        }
        _ => None,
    }
}
