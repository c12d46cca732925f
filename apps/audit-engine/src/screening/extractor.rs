//! Feature extraction: the pluggable resume → `FeatureRecord` step.
//!
//! Default: `RuleBasedExtractor`, deterministic keyword and pattern rules.
//! Richer NLP backends implement `FeatureExtractor` and honor the same output
//! contract: a `skills` list and an `experience_years` number, always present.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AuditError;
use crate::models::record::{EXPERIENCE_YEARS_FEATURE, SKILLS_FEATURE};
use crate::models::{AttributeValue, FeatureRecord, FeatureValue};

/// Raw resume handed to an extractor. Protected attributes are self-reported
/// and pass through untouched; they never come from the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub protected_attributes: HashMap<String, AttributeValue>,
}

#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, document: &ResumeDocument) -> Result<FeatureRecord, AuditError>;
}

/// Checks an extractor honored the fixed output contract.
pub fn check_contract(record: &FeatureRecord) -> Result<(), AuditError> {
    match record.features.get(SKILLS_FEATURE) {
        Some(FeatureValue::List(_)) => {}
        _ => {
            return Err(AuditError::InvalidInput(format!(
                "extractor output for '{}' lacks a '{SKILLS_FEATURE}' list",
                record.id
            )))
        }
    }
    if record.experience_years().is_none() {
        return Err(AuditError::InvalidInput(format!(
            "extractor output for '{}' lacks a numeric '{EXPERIENCE_YEARS_FEATURE}'",
            record.id
        )));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// RuleBasedExtractor
// ────────────────────────────────────────────────────────────────────────────

const DEFAULT_SKILLS: &[&str] = &[
    "rust",
    "python",
    "java",
    "javascript",
    "typescript",
    "go",
    "c++",
    "sql",
    "aws",
    "docker",
    "kubernetes",
    "react",
    "node.js",
    "machine learning",
    "data analysis",
    "project management",
];

const EXPERIENCE_PATTERN: &str = r"(?i)(\d{1,2}(?:\.\d+)?)\s*\+?\s*(?:years?|yrs?)\b";
const EDUCATION_PATTERN: &str = r"(?i)\b(?:university|college|institute|school)\b";
const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const PHONE_PATTERN: &str = r"\+?\d[\d\s().-]{8,}\d";
const MIN_PHONE_DIGITS: usize = 10;

/// Keyword and pattern based extractor.
///
/// - `experience_years`: largest "N years" mention, 0 when none
/// - `skills`: vocabulary terms found on token boundaries, sorted
/// - `education_count`: mentions of university / college / institute / school
/// - `has_email`, `has_phone`
pub struct RuleBasedExtractor {
    skill_vocabulary: Vec<String>,
    experience: Regex,
    education: Regex,
    email: Regex,
    phone: Regex,
}

impl RuleBasedExtractor {
    pub fn new() -> Result<Self, AuditError> {
        Self::with_vocabulary(DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_vocabulary(skill_vocabulary: Vec<String>) -> Result<Self, AuditError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| AuditError::Internal(anyhow::anyhow!("bad extractor pattern: {e}")))
        };
        Ok(Self {
            skill_vocabulary: skill_vocabulary
                .iter()
                .map(|s| normalize(s))
                .filter(|s| !s.trim().is_empty())
                .collect(),
            experience: compile(EXPERIENCE_PATTERN)?,
            education: compile(EDUCATION_PATTERN)?,
            email: compile(EMAIL_PATTERN)?,
            phone: compile(PHONE_PATTERN)?,
        })
    }

    fn experience_years(&self, text: &str) -> f64 {
        self.experience
            .captures_iter(text)
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
            .fold(0.0, f64::max)
    }

    fn skills(&self, text: &str) -> Vec<String> {
        let haystack = normalize(text);
        self.skill_vocabulary
            .iter()
            .filter(|skill| haystack.contains(skill.as_str()))
            .map(|skill| skill.trim().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn has_phone(&self, text: &str) -> bool {
        self.phone.find_iter(text).any(|m| {
            m.as_str().chars().filter(|c| c.is_ascii_digit()).count() >= MIN_PHONE_DIGITS
        })
    }
}

/// Lowercases and re-joins tokens with single spaces, padded on both ends so
/// that `contains(" term ")` matches whole tokens only.
fn normalize(text: &str) -> String {
    let tokens: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#' || c == '.'))
        .map(|t| t.trim_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    format!(" {} ", tokens.join(" "))
}

#[async_trait]
impl FeatureExtractor for RuleBasedExtractor {
    async fn extract(&self, document: &ResumeDocument) -> Result<FeatureRecord, AuditError> {
        let text = &document.text;
        let mut record = FeatureRecord::new(document.id.clone())
            .with_feature(
                EXPERIENCE_YEARS_FEATURE,
                FeatureValue::Number(self.experience_years(text)),
            )
            .with_feature(SKILLS_FEATURE, FeatureValue::List(self.skills(text)))
            .with_feature(
                "education_count",
                FeatureValue::Number(self.education.find_iter(text).count() as f64),
            )
            .with_feature("has_email", FeatureValue::Bool(self.email.is_match(text)))
            .with_feature("has_phone", FeatureValue::Bool(self.has_phone(text)));
        record.protected_attributes = document.protected_attributes.clone();
        Ok(record)
    }
}
