use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Feature keys every extractor must produce.
pub const SKILLS_FEATURE: &str = "skills";
pub const EXPERIENCE_YEARS_FEATURE: &str = "experience_years";

/// A single extracted feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FeatureValue {
    /// Numeric view used when building a design matrix.
    /// Booleans map to 0/1, lists to their length, free text has no numeric view.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Number(n) if n.is_finite() => Some(*n),
            FeatureValue::Number(_) => None,
            FeatureValue::Text(_) => None,
            FeatureValue::List(items) => Some(items.len() as f64),
        }
    }
}

/// A protected-attribute value: categorical (e.g. gender) or numeric (e.g. age).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Numeric(f64),
    Category(String),
}

/// Normalized features of one resume plus its protected attributes.
///
/// Protected attributes are kept apart from `features` so they never leak into
/// a classifier's design matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: String,
    #[serde(default)]
    pub features: HashMap<String, FeatureValue>,
    #[serde(default)]
    pub protected_attributes: HashMap<String, AttributeValue>,
}

impl FeatureRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: HashMap::new(),
            protected_attributes: HashMap::new(),
        }
    }

    pub fn with_feature(mut self, name: &str, value: FeatureValue) -> Self {
        self.features.insert(name.to_string(), value);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.protected_attributes.insert(name.to_string(), value);
        self
    }

    pub fn skills(&self) -> &[String] {
        match self.features.get(SKILLS_FEATURE) {
            Some(FeatureValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn experience_years(&self) -> Option<f64> {
        self.features
            .get(EXPERIENCE_YEARS_FEATURE)
            .and_then(FeatureValue::as_number)
    }
}
