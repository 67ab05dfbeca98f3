//! Technician-code extraction from free-text "Name (CODE)" fields.
//!
//! Exports write the assigned technician as `"JOAO SILVA (TR12345)"`. The
//! code is the first `TR`/`TT`/`TC` digit run anywhere in the text. Matching
//! is case-sensitive unless the configuration opts into folding.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::{config::IdentifierConfig, error::KpiResult};

#[derive(Debug, Clone)]
pub struct CodeExtractor {
    pattern: Regex,
    fold_case: bool,
}

impl CodeExtractor {
    pub fn new(config: &IdentifierConfig) -> KpiResult<Self> {
        let alternation = config
            .prefixes
            .iter()
            .map(|p| format!("{}\\d+", regex::escape(p)))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&format!("(?:{alternation})"))
            .case_insensitive(config.case_insensitive)
            .build()?;
        Ok(Self {
            pattern,
            fold_case: config.case_insensitive,
        })
    }

    /// First code in `text`, or an empty string.
    pub fn extract(&self, text: Option<&str>) -> String {
        let Some(text) = text else {
            return String::new();
        };
        match self.pattern.find(text) {
            Some(m) if self.fold_case => m.as_str().to_uppercase(),
            Some(m) => m.as_str().to_string(),
            None => String::new(),
        }
    }

    pub fn is_code(&self, text: &str) -> bool {
        self.pattern
            .find(text)
            .is_some_and(|m| m.start() == 0 && m.end() == text.len())
    }
}

fn default_extractor() -> &'static CodeExtractor {
    static EXTRACTOR: OnceLock<CodeExtractor> = OnceLock::new();
    EXTRACTOR.get_or_init(|| {
        CodeExtractor::new(&IdentifierConfig::default())
            .unwrap_or_else(|e| panic!("built-in code pattern failed to compile: {e}"))
    })
}

fn suffix_pattern() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(r"\s*\(.*\)")
            .unwrap_or_else(|e| panic!("built-in suffix pattern failed to compile: {e}"))
    })
}

/// Extract with the default case-sensitive `TR|TT|TC` pattern.
pub fn extract_code(text: &str) -> String {
    default_extractor().extract(Some(text))
}

/// `"JOAO SILVA (TR123)"` → `"JOAO SILVA"`.
pub fn strip_code_suffix(text: &str) -> String {
    suffix_pattern().replace_all(text, "").trim().to_string()
}

pub fn first_name(text: &str) -> String {
    strip_code_suffix(text)
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Label shown when the roster has no display name: `"JOAO TR123"`.
pub fn short_label(raw_name: &str, code: &str) -> String {
    let first = first_name(raw_name);
    match (first.is_empty(), code.is_empty()) {
        (false, false) => format!("{first} {code}"),
        _ => raw_name.chars().take(20).collect(),
    }
}
