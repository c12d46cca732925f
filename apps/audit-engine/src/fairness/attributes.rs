//! Protected-attribute allow-list.
//!
//! Every protected attribute a record carries must be registered here. The
//! registry resolves raw attribute values into the group labels the metric
//! calculator partitions on (category names, or bucket labels for numerics).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::AuditError;
use crate::fairness::bucketing::{Bucketizer, AGE_CUT_POINTS, AGE_DOMAIN_MIN};
use crate::models::{AttributeValue, FeatureRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeKind {
    /// Empty `values` accepts any category.
    Categorical {
        #[serde(default)]
        values: Vec<String>,
    },
    Numerical {
        min: f64,
        #[serde(default = "default_cut_points")]
        cut_points: Vec<f64>,
    },
}

fn default_cut_points() -> Vec<f64> {
    AGE_CUT_POINTS.to_vec()
}

impl AttributeKind {
    pub fn bucketizer(&self) -> Result<Option<Bucketizer>, AuditError> {
        match self {
            AttributeKind::Categorical { .. } => Ok(None),
            AttributeKind::Numerical { min, cut_points } => {
                Bucketizer::new(*min, cut_points.clone()).map(Some)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectedAttributeRegistry {
    attributes: BTreeMap<String, AttributeKind>,
}

impl Default for ProtectedAttributeRegistry {
    fn default() -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "gender".to_string(),
            AttributeKind::Categorical {
                values: vec!["male".into(), "female".into(), "other".into()],
            },
        );
        attributes.insert(
            "age".to_string(),
            AttributeKind::Numerical {
                min: AGE_DOMAIN_MIN,
                cut_points: AGE_CUT_POINTS.to_vec(),
            },
        );
        Self { attributes }
    }
}

impl ProtectedAttributeRegistry {
    pub fn new(attributes: BTreeMap<String, AttributeKind>) -> Result<Self, AuditError> {
        let registry = Self { attributes };
        registry.validate()?;
        Ok(registry)
    }

    /// Checks every numeric attribute has a total bucketing function.
    pub fn validate(&self) -> Result<(), AuditError> {
        for (name, kind) in &self.attributes {
            kind.bucketizer().map_err(|e| {
                AuditError::InvalidProtectedAttribute(format!("'{name}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn kind(&self, name: &str) -> Result<&AttributeKind, AuditError> {
        self.attributes.get(name).ok_or_else(|| {
            AuditError::InvalidProtectedAttribute(format!(
                "'{name}' is not in the protected-attribute allow-list"
            ))
        })
    }

    /// Every protected-attribute key on the record must be allow-listed.
    pub fn check_record(&self, record: &FeatureRecord) -> Result<(), AuditError> {
        for name in record.protected_attributes.keys() {
            if !self.attributes.contains_key(name) {
                return Err(AuditError::InvalidProtectedAttribute(format!(
                    "record {} carries '{name}', which is not in the allow-list",
                    record.id
                )));
            }
        }
        Ok(())
    }

    /// Group labels an attribute can resolve to, or `None` for open categoricals.
    pub fn labels(&self, name: &str) -> Result<Option<Vec<String>>, AuditError> {
        match self.kind(name)? {
            AttributeKind::Categorical { values } if values.is_empty() => Ok(None),
            AttributeKind::Categorical { values } => Ok(Some(values.clone())),
            AttributeKind::Numerical { min, cut_points } => {
                Ok(Some(Bucketizer::new(*min, cut_points.clone())?.labels()))
            }
        }
    }

    /// Resolves a raw value to its group label.
    ///
    /// A category outside the configured `values` resolves to `None`: the
    /// record belongs to no known group and is excluded, not rejected.
    pub fn group_label(
        &self,
        name: &str,
        value: &AttributeValue,
    ) -> Result<Option<String>, AuditError> {
        let kind = self.kind(name)?;
        match (kind, value) {
            (AttributeKind::Categorical { values }, AttributeValue::Category(category)) => {
                if !values.is_empty() && !values.iter().any(|v| v == category) {
                    return Ok(None);
                }
                Ok(Some(category.clone()))
            }
            (AttributeKind::Numerical { .. }, AttributeValue::Numeric(n)) => {
                let bucketizer = kind.bucketizer()?.ok_or_else(|| {
                    AuditError::InvalidProtectedAttribute(format!("'{name}' has no bucketing"))
                })?;
                bucketizer.bucket(*n).map(Some)
            }
            (AttributeKind::Categorical { .. }, AttributeValue::Numeric(n)) => {
                Err(AuditError::InvalidProtectedAttribute(format!(
                    "'{name}' is categorical but got numeric value {n}"
                )))
            }
            (AttributeKind::Numerical { .. }, AttributeValue::Category(c)) => {
                Err(AuditError::InvalidProtectedAttribute(format!(
                    "'{name}' is numerical but got category '{c}'"
                )))
            }
        }
    }

    /// Validates a privileged/unprivileged designation for an attribute.
    pub fn check_designation(
        &self,
        name: &str,
        privileged: &str,
        unprivileged: &str,
    ) -> Result<(), AuditError> {
        if privileged == unprivileged {
            return Err(AuditError::InvalidProtectedAttribute(format!(
                "privileged and unprivileged values of '{name}' must differ (both '{privileged}')"
            )));
        }
        if let Some(labels) = self.labels(name)? {
            for designated in [privileged, unprivileged] {
                if !labels.iter().any(|l| l == designated) {
                    return Err(AuditError::InvalidProtectedAttribute(format!(
                        "'{designated}' is not a group of '{name}' (groups: {})",
                        labels.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_allows_gender_and_age() {
        let registry = ProtectedAttributeRegistry::default();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["age", "gender"]);
        registry.validate().unwrap();
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let registry = ProtectedAttributeRegistry::default();
        let err = registry.kind("ethnicity").unwrap_err();
        assert_eq!(err.code(), "INVALID_PROTECTED_ATTRIBUTE");
    }

    #[test]
    fn test_check_record_rejects_unlisted_key() {
        let registry = ProtectedAttributeRegistry::default();
        let record = FeatureRecord::new("r-1")
            .with_attribute("gender", AttributeValue::Category("female".into()))
            .with_attribute("religion", AttributeValue::Category("x".into()));
        assert!(registry.check_record(&record).is_err());
    }

    #[test]
    fn test_numeric_value_is_bucketed() {
        let registry = ProtectedAttributeRegistry::default();
        let label = registry
            .group_label("age", &AttributeValue::Numeric(17.0))
            .unwrap();
        assert_eq!(label.as_deref(), Some("18-24"));
        let label = registry
            .group_label("age", &AttributeValue::Numeric(60.0))
            .unwrap();
        assert_eq!(label.as_deref(), Some("55+"));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let registry = ProtectedAttributeRegistry::default();
        assert!(registry
            .group_label("age", &AttributeValue::Category("old".into()))
            .is_err());
        assert!(registry
            .group_label("gender", &AttributeValue::Numeric(1.0))
            .is_err());
    }

    #[test]
    fn test_unlisted_category_resolves_to_no_group() {
        let registry = ProtectedAttributeRegistry::default();
        let label = registry
            .group_label("gender", &AttributeValue::Category("nonbinary".into()))
            .unwrap();
        assert_eq!(label, None);
        assert!(registry.check_designation("gender", "male", "nonbinary").is_err());
    }

    #[test]
    fn test_designation_must_name_known_groups() {
        let registry = ProtectedAttributeRegistry::default();
        registry.check_designation("age", "25-34", "55+").unwrap();
        assert!(registry.check_designation("age", "25-34", "60-70").is_err());
        assert!(registry.check_designation("gender", "male", "male").is_err());
    }

    #[test]
    fn test_registry_deserializes_config_shape() {
        let json = r#"{
            "gender": {"type": "categorical", "values": ["male", "female", "other"]},
            "age": {"type": "numerical", "min": 18, "max": 65}
        }"#;
        let registry: ProtectedAttributeRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(registry, ProtectedAttributeRegistry::default());
    }

    #[test]
    fn test_new_rejects_non_total_bucketing() {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "age".to_string(),
            AttributeKind::Numerical {
                min: 18.0,
                cut_points: vec![40.0, 30.0],
            },
        );
        assert!(ProtectedAttributeRegistry::new(attributes).is_err());
    }
}
