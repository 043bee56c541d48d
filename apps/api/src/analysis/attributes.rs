//! Attribute Extractor: candidate name and skill keywords from resume text.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::analysis::stopwords::is_stop_word;
use crate::nlp::{EntityLabel, EntityRecognizer, EntitySpan, ModelError};

pub const MAX_SKILLS: usize = 30;

/// Characters that split a whitespace-delimited chunk into separate tokens.
const INFIX_SEPARATORS: &[char] = &[
    '-', '/', ',', ';', ':', '|', '(', ')', '[', ']', '{', '}', '"', '•', '·', '…',
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAttributes {
    pub name: Option<String>,
    /// At most `MAX_SKILLS`, deduplicated, in first-seen order.
    pub skills: Vec<String>,
}

impl ResumeAttributes {
    /// Compact JSON rendering fed to the similarity scorer and the feedback prompt.
    pub fn to_summary(&self) -> String {
        json!({ "name": self.name, "skills": self.skills }).to_string()
    }
}

/// Runs entity recognition and keyword extraction over the resume.
/// Blocking: the recognizer runs model inference.
pub fn extract_attributes(
    text: &str,
    recognizer: &dyn EntityRecognizer,
) -> Result<ResumeAttributes, ModelError> {
    let spans = recognizer.recognize(text)?;
    Ok(ResumeAttributes {
        name: first_person(&spans),
        skills: extract_skills(text),
    })
}

/// The first person entity in document order. With a references section this may well be
/// somebody other than the candidate.
pub fn first_person(spans: &[EntitySpan]) -> Option<String> {
    spans
        .iter()
        .find(|s| s.label == EntityLabel::Person)
        .map(|s| s.text.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Alphabetic, non-stop-word tokens, deduplicated and capped at `MAX_SKILLS`.
pub fn extract_skills(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text)
        .filter(|t| t.chars().all(char::is_alphabetic))
        .filter(|t| !is_stop_word(&t.to_lowercase()))
        .filter(|t| seen.insert(*t))
        .take(MAX_SKILLS)
        .map(str::to_string)
        .collect()
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || INFIX_SEPARATORS.contains(&c))
        .map(|chunk| strip_possessive(chunk.trim_matches(|c: char| !c.is_alphanumeric())))
        .filter(|t| !t.is_empty())
}

fn strip_possessive(token: &str) -> &str {
    token
        .strip_suffix("'s")
        .or_else(|| token.strip_suffix("\u{2019}s"))
        .unwrap_or(token)
}
