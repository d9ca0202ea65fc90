//! 引用校验服务 - 业务能力层
//!
//! 只做模式匹配：
//! - 条款引用（"Artículo 21", "art. 14.2", "Article 3"）
//! - 法规名称及编号（"Ley 39/2015", "Real Decreto Legislativo 5/2015", "Law 40/2015"）
//! - 错误选项说明（解析中至少提到几个错误选项的字母）
//!
//! 选项说明只是启发式检查，不做语义判断。

use regex::Regex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::{Strictness, ValidationConfig};
use crate::models::{CandidateItem, IssueCode, OptionLetter, ValidationIssue};

static ARTICLE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:art[íi]culos?|articles?|arts?\.?)\s*\d+(?:\.\d+)*(?:\s+(?:bis|ter|quater)\b)?").ok()
});

static INSTRUMENT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:real\s+decreto(?:\s+legislativo|[\s-]+ley)?",
        r"|decreto(?:\s+legislativo|[\s-]+ley)?",
        r"|ley(?:\s+org[áa]nica)?",
        r"|royal\s+(?:legislative\s+)?decree(?:[\s-]+law)?",
        r"|legislative\s+decree|decree(?:[\s-]+law)?",
        r"|organic\s+law|law",
        r"|directiva|directive|reglamento|regulation)",
        r"\s+(?:\((?:ue|eu|ce|cee)\)\s*)?(?:n[º°o]\.?\s*)?\d+/\d{2,4}",
    ))
    .ok()
});

/// "opción B", "options B and C", "la respuesta D"
static LETTER_LIST_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?i:opci[óo]n(?:es)?|options?|respuestas?|answers?|alternativas?|letras?)",
        r"\s+(?:(?i:la|el|las|los|the)\s+)?",
        r"(\(?[A-D]\b\)?(?:\s*(?:,|y|e|o|u|and|or|/)\s*\(?[A-D]\b\)?)*)",
    ))
    .ok()
});

/// "B) es incorrecta", "(C)"
static PAREN_LETTER_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(\[])([A-D])\)").ok());

/// 引号内的原文和自动补上的引用行，其中的字母不是对选项的引用
static PROTECTED_SPAN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?m)"[^"]*"|“[^”]*”|«[^»]*»|^(?:Legal basis|Quoted source):.*$"#).ok()
});

/// 第一处条款引用
pub fn find_article(text: &str) -> Option<String> {
    ARTICLE_RE
        .as_ref()
        .and_then(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

/// 第一处法规引用
pub fn find_instrument(text: &str) -> Option<String> {
    INSTRUMENT_RE
        .as_ref()
        .and_then(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

pub fn contains_article_reference(text: &str) -> bool {
    find_article(text).is_some()
}

/// 找出解析中所有明确提到的选项字母及其字节位置
pub fn find_letter_references(text: &str) -> Vec<(Range<usize>, OptionLetter)> {
    let mut found: BTreeMap<usize, OptionLetter> = BTreeMap::new();

    if let Some(re) = LETTER_LIST_RE.as_ref() {
        for caps in re.captures_iter(text) {
            let Some(group) = caps.get(1) else { continue };
            for (offset, c) in group.as_str().char_indices() {
                if let ('A'..='D', Some(letter)) = (c, OptionLetter::from_char(c)) {
                    found.insert(group.start() + offset, letter);
                }
            }
        }
    }

    if let Some(re) = PAREN_LETTER_RE.as_ref() {
        for caps in re.captures_iter(text) {
            let Some(group) = caps.get(1) else { continue };
            if let Some(letter) = group.as_str().chars().next().and_then(OptionLetter::from_char) {
                found.insert(group.start(), letter);
            }
        }
    }

    let protected: Vec<Range<usize>> = PROTECTED_SPAN_RE
        .as_ref()
        .map(|re| re.find_iter(text).map(|m| m.range()).collect())
        .unwrap_or_default();

    found
        .into_iter()
        .filter(|(start, _)| !protected.iter().any(|span| span.contains(start)))
        .map(|(start, letter)| (start..start + 1, letter))
        .collect()
}

/// 解析中提到的选项字母集合
pub fn referenced_letters(text: &str) -> BTreeSet<OptionLetter> {
    find_letter_references(text)
        .into_iter()
        .map(|(_, letter)| letter)
        .collect()
}

/// 选项循环移动后，同步改写解析里的字母
pub fn relabel_option_references(text: &str, shift: usize) -> String {
    let references = find_letter_references(text);
    if references.is_empty() || shift % 4 == 0 {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, letter) in references {
        result.push_str(&text[cursor..range.start]);
        result.push(letter.rotate(shift).as_char());
        cursor = range.end;
    }
    result.push_str(&text[cursor..]);
    result
}

/// 单题引用检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationCheck {
    pub article: Option<String>,
    pub instrument: Option<String>,
    /// 提到的错误选项数量（0-3）
    pub referenced_incorrect: usize,
}

/// 引用校验服务
pub struct CitationValidator {
    min_incorrect_referenced: usize,
    strictness: Strictness,
    allow_synthesis: bool,
}

impl CitationValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            min_incorrect_referenced: config.min_incorrect_referenced,
            strictness: config.justification_strictness,
            allow_synthesis: config.allow_citation_synthesis,
        }
    }

    /// 只检查，不修改
    pub fn check(&self, item: &CandidateItem) -> CitationCheck {
        let referenced = referenced_letters(&item.explanation);
        let referenced_incorrect = OptionLetter::ALL
            .iter()
            .filter(|letter| **letter != item.correct_letter && referenced.contains(letter))
            .count();

        CitationCheck {
            article: find_article(&item.explanation),
            instrument: find_instrument(&item.explanation),
            referenced_incorrect,
        }
    }

    /// 检查并在必要时补上引用依据
    ///
    /// 解析只缺条款或只缺法规时，从依据材料中提取第一处引用，加一行 `Legal basis: ...`，
    /// 并记为 `citation_synthesized` 警告。两者都缺的解析不补，
    /// 依据材料中找不到时同样保留为问题。
    pub fn validate(
        &self,
        index: usize,
        item: &mut CandidateItem,
    ) -> (Vec<ValidationIssue>, Vec<ValidationIssue>) {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        let mut check = self.check(item);

        if check.article.is_none() != check.instrument.is_none() && self.allow_synthesis {
            if let Some(header) = synthesize_header(&check, &item.source_context) {
                debug!("题目 {} 缺少引用，补充: {}", index + 1, header);
                item.explanation = format!("{}\n{}", header, item.explanation);
                warnings.push(ValidationIssue::item(
                    index,
                    IssueCode::CitationSynthesized,
                    format!("citation added from the source material, needs review: {}", header),
                ));
                check = self.check(item);
            }
        }

        if check.article.is_none() {
            issues.push(ValidationIssue::item(
                index,
                IssueCode::MissingArticle,
                "explanation must cite the article it relies on (e.g. \"Artículo 21\")",
            ));
        }
        if check.instrument.is_none() {
            issues.push(ValidationIssue::item(
                index,
                IssueCode::MissingInstrument,
                "explanation must name the governing law with its number (e.g. \"Ley 39/2015\")",
            ));
        }

        if check.referenced_incorrect < self.min_incorrect_referenced {
            let issue = ValidationIssue::item(
                index,
                IssueCode::IncorrectOptionsUnjustified,
                format!(
                    "explanation mentions {} of the 3 incorrect options, at least {} required (e.g. \"la opción B es incorrecta porque...\")",
                    check.referenced_incorrect, self.min_incorrect_referenced
                ),
            );
            match self.strictness {
                Strictness::Warning => warnings.push(issue),
                Strictness::HardFail => issues.push(issue),
            }
        }

        (issues, warnings)
    }
}

/// 用依据材料中的第一处条款/法规拼出补充说明，只补缺少的部分
fn synthesize_header(check: &CitationCheck, source_context: &str) -> Option<String> {
    let mut parts = Vec::new();
    if check.article.is_none() {
        if let Some(article) = find_article(source_context) {
            parts.push(article);
        }
    }
    if check.instrument.is_none() {
        if let Some(instrument) = find_instrument(source_context) {
            parts.push(instrument);
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("Legal basis: {}.", parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    fn item(explanation: &str, correct: OptionLetter, source: &str) -> CandidateItem {
        CandidateItem {
            prompt_text: "Q".to_string(),
            options: ["uno", "dos", "tres", "cuatro"].map(String::from),
            correct_letter: correct,
            explanation: explanation.to_string(),
            difficulty: Difficulty::Medium,
            source_context: source.to_string(),
        }
    }

    #[test]
    fn test_article_patterns() {
        assert!(contains_article_reference("según el Artículo 21 de la ley"));
        assert!(contains_article_reference("ver art. 14.2"));
        assert!(contains_article_reference("Article 3 states"));
        assert!(contains_article_reference("arts. 5 y 6"));
        assert!(contains_article_reference("ARTÍCULO 9 bis"));
        assert!(!contains_article_reference("el arte de resolver"));
        assert!(!contains_article_reference("sin referencia alguna"));
        assert_eq!(find_article("conforme al artículo 21.3, ..."), Some("artículo 21.3".to_string()));
    }

    #[test]
    fn test_instrument_patterns() {
        for text in [
            "Ley 39/2015",
            "la ley orgánica 3/2018",
            "Real Decreto Legislativo 5/2015",
            "Real Decreto-ley 20/2012",
            "Law 40/2015",
            "Royal Legislative Decree 8/2015",
            "Reglamento (UE) 2016/679",
        ] {
            assert!(find_instrument(text).is_some(), "{}", text);
        }
        assert!(find_instrument("la ley de procedimiento").is_none());
        assert!(find_instrument("Ley 39").is_none());
    }

    #[test]
    fn test_letter_references() {
        let text = "La opción B es incorrecta. Las opciones C y D tampoco. A) es la correcta.";
        let letters = referenced_letters(text);
        assert_eq!(
            letters,
            [OptionLetter::A, OptionLetter::B, OptionLetter::C, OptionLetter::D]
                .into_iter()
                .collect()
        );

        // "Bajo" no cuenta como la letra B
        assert!(referenced_letters("la opción Bajo ningún concepto").is_empty());
        assert_eq!(
            referenced_letters("Options (B) and (C) are wrong"),
            [OptionLetter::B, OptionLetter::C].into_iter().collect()
        );
    }

    #[test]
    fn test_relabel_option_references() {
        let text = "La opción A es correcta; la opción B no, ni las opciones C y D.";
        let relabelled = relabel_option_references(text, 1);
        assert_eq!(
            relabelled,
            "La opción B es correcta; la opción C no, ni las opciones D y A."
        );
        assert_eq!(relabel_option_references(text, 4), text);
    }

    #[test]
    fn test_letters_inside_quotes_and_headers_are_not_references() {
        let text = "Legal basis: Artículo 9 B).\nQuoted source: \"A) Funcionarios de carrera y B) Personal laboral fijo\"\nLa opción C no figura en la norma.";
        assert_eq!(referenced_letters(text), [OptionLetter::C].into_iter().collect());

        let relabelled = relabel_option_references(text, 1);
        assert!(relabelled.contains("\"A) Funcionarios de carrera y B) Personal laboral fijo\""));
        assert!(relabelled.starts_with("Legal basis: Artículo 9 B)."));
        assert!(relabelled.ends_with("La opción D no figura en la norma."));
    }

    #[test]
    fn test_validate_complete_explanation() {
        let validator = CitationValidator::new(&ValidationConfig::default());
        let mut it = item(
            "Según el artículo 21 de la Ley 39/2015 la A es correcta. La opción B confunde plazos y la opción C cita otra norma.",
            OptionLetter::A,
            "",
        );
        let (issues, warnings) = validator.validate(0, &mut it);
        assert!(issues.is_empty(), "{:?}", issues);
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_missing_citations_without_source_are_issues() {
        let validator = CitationValidator::new(&ValidationConfig::default());
        let mut it = item("Es así. La opción B y la opción C son incorrectas.", OptionLetter::A, "texto sin referencias");
        let (issues, _) = validator.validate(3, &mut it);
        let codes: Vec<IssueCode> = issues.iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![IssueCode::MissingArticle, IssueCode::MissingInstrument]);
        assert_eq!(issues[0].item_index, Some(3));
    }

    #[test]
    fn test_missing_article_synthesized_from_source() {
        let validator = CitationValidator::new(&ValidationConfig::default());
        let source = "Artículo 21. Obligación de resolver. Ley 39/2015, de 1 de octubre.";
        let mut it = item("Según la Ley 39/2015, las opciones B y C son incorrectas.", OptionLetter::A, source);
        let (issues, warnings) = validator.validate(0, &mut it);

        assert!(issues.is_empty(), "{:?}", issues);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, IssueCode::CitationSynthesized);
        assert!(it.explanation.starts_with("Legal basis: Artículo 21.\nSegún la Ley 39/2015"));
    }

    #[test]
    fn test_missing_instrument_synthesized_from_source() {
        let validator = CitationValidator::new(&ValidationConfig::default());
        let source = "Artículo 21. Obligación de resolver. Ley 39/2015, de 1 de octubre.";
        let mut it = item("Conforme al artículo 21, las opciones B y C son incorrectas.", OptionLetter::A, source);
        let (issues, warnings) = validator.validate(0, &mut it);

        assert!(issues.is_empty(), "{:?}", issues);
        assert_eq!(warnings[0].code, IssueCode::CitationSynthesized);
        assert!(it.explanation.starts_with("Legal basis: Ley 39/2015.\n"));
    }

    #[test]
    fn test_uncited_explanation_not_synthesized_even_with_source() {
        let validator = CitationValidator::new(&ValidationConfig::default());
        let source = "Artículo 21. Obligación de resolver. Ley 39/2015, de 1 de octubre.";
        let explanation = "Las opciones B y C son incorrectas.";
        let mut it = item(explanation, OptionLetter::A, source);
        let (issues, warnings) = validator.validate(0, &mut it);

        let codes: Vec<IssueCode> = issues.iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![IssueCode::MissingArticle, IssueCode::MissingInstrument]);
        assert!(warnings.is_empty());
        assert_eq!(it.explanation, explanation);
    }

    #[test]
    fn test_synthesis_can_be_disabled() {
        let config = ValidationConfig {
            allow_citation_synthesis: false,
            ..ValidationConfig::default()
        };
        let validator = CitationValidator::new(&config);
        let mut it = item("Según la Ley 39/2015, las opciones B y C son incorrectas.", OptionLetter::A, "Artículo 21 de la Ley 39/2015");
        let (issues, warnings) = validator.validate(0, &mut it);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::MissingArticle);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_justification_strictness() {
        let explanation = "Artículo 21 de la Ley 39/2015. La opción B es incorrecta.";

        let lenient = CitationValidator::new(&ValidationConfig::default());
        let mut it = item(explanation, OptionLetter::A, "");
        let (issues, warnings) = lenient.validate(0, &mut it);
        assert!(issues.is_empty());
        assert_eq!(warnings[0].code, IssueCode::IncorrectOptionsUnjustified);

        let strict = CitationValidator::new(&ValidationConfig::strict());
        let mut it = item(explanation, OptionLetter::A, "");
        let (issues, warnings) = strict.validate(0, &mut it);
        assert_eq!(issues[0].code, IssueCode::IncorrectOptionsUnjustified);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_correct_letter_not_counted_as_incorrect_reference() {
        let validator = CitationValidator::new(&ValidationConfig::default());
        let it = item("La opción C es la correcta y la opción B no.", OptionLetter::C, "");
        assert_eq!(validator.check(&it).referenced_incorrect, 1);
    }
}
