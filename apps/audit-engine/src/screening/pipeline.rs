//! Batch screening: extract features, then predict, one resume at a time.
//!
//! Every prediction is logged on the `model_decisions` target with the
//! decision, its confidence and the top contributing features.

use serde::Serialize;
use tracing::info;

use crate::errors::AuditError;
use crate::fairness::ProtectedAttributeRegistry;
use crate::models::{Decision, FeatureRecord};
use crate::screening::extractor::{check_contract, FeatureExtractor, ResumeDocument};
use crate::screening::model::Classifier;

/// How many contributing features a decision log line carries.
const LOGGED_FEATURES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ScreenedResume {
    pub record: FeatureRecord,
    pub decision: Decision,
}

/// Screens `documents` in order. Fails on the first document whose features
/// break the extractor contract or whose protected attributes are not
/// allow-listed; nothing is returned for a partially screened batch.
pub async fn screen_batch(
    extractor: &dyn FeatureExtractor,
    classifier: &dyn Classifier,
    registry: &ProtectedAttributeRegistry,
    documents: &[ResumeDocument],
) -> Result<Vec<ScreenedResume>, AuditError> {
    if documents.is_empty() {
        return Err(AuditError::EmptyBatch(
            "screening needs at least one resume".to_string(),
        ));
    }

    let mut screened = Vec::with_capacity(documents.len());
    for document in documents {
        let record = extractor.extract(document).await?;
        check_contract(&record)?;
        registry.check_record(&record)?;

        let decision = classifier.predict(&record)?;
        info!(
            target: "model_decisions",
            record_id = %decision.record_id(),
            decision = decision.outcome().as_str(),
            confidence = decision.confidence(),
            top_features = ?top_features(&decision),
            "Screening decision"
        );
        screened.push(ScreenedResume { record, decision });
    }
    Ok(screened)
}

/// Features with the largest absolute contribution, strongest first.
fn top_features(decision: &Decision) -> Vec<(&str, f64)> {
    let mut features: Vec<(&str, f64)> = decision
        .feature_importance()
        .iter()
        .map(|(name, v)| (name.as_str(), *v))
        .collect();
    features.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(b.0)));
    features.truncate(LOGGED_FEATURES);
    features
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{AttributeValue, FeatureValue, Outcome};
    use crate::screening::extractor::RuleBasedExtractor;
    use crate::screening::model::{FeatureSchema, TrainedModel};

    fn make_document(id: &str, text: &str, gender: &str) -> ResumeDocument {
        ResumeDocument {
            id: id.to_string(),
            text: text.to_string(),
            protected_attributes: HashMap::from([(
                "gender".to_string(),
                AttributeValue::Category(gender.into()),
            )]),
        }
    }

    fn make_model() -> TrainedModel {
        let schema = FeatureSchema {
            names: vec!["experience_years".to_string()],
            means: vec![4.0],
            scales: vec![2.0],
        };
        TrainedModel::new(schema, vec![3.0], 0.0).unwrap()
    }

    /// Extractor that forgets the skills list.
    struct BrokenExtractor;

    #[async_trait]
    impl FeatureExtractor for BrokenExtractor {
        async fn extract(&self, document: &ResumeDocument) -> Result<FeatureRecord, AuditError> {
            Ok(FeatureRecord::new(document.id.clone())
                .with_feature("experience_years", FeatureValue::Number(1.0)))
        }
    }

    #[tokio::test]
    async fn test_screen_batch_predicts_in_order() {
        let extractor = RuleBasedExtractor::new().unwrap();
        let docs = vec![
            make_document("senior", "Engineer with 9 years of Rust", "female"),
            make_document("junior", "Graduate with 1 year of Python", "male"),
        ];
        let screened = screen_batch(
            &extractor,
            &make_model(),
            &ProtectedAttributeRegistry::default(),
            &docs,
        )
        .await
        .unwrap();

        assert_eq!(screened.len(), 2);
        assert_eq!(screened[0].decision.record_id(), "senior");
        assert_eq!(screened[0].decision.outcome(), Outcome::Favorable);
        assert_eq!(screened[1].decision.outcome(), Outcome::Unfavorable);
        assert_eq!(
            screened[1].record.protected_attributes.get("gender"),
            Some(&AttributeValue::Category("male".into()))
        );
    }

    #[tokio::test]
    async fn test_screen_batch_rejects_unlisted_attribute() {
        let extractor = RuleBasedExtractor::new().unwrap();
        let mut doc = make_document("a", "3 years", "female");
        doc.protected_attributes
            .insert("religion".to_string(), AttributeValue::Category("x".into()));
        let err = screen_batch(
            &extractor,
            &make_model(),
            &ProtectedAttributeRegistry::default(),
            &[doc],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PROTECTED_ATTRIBUTE");
    }

    #[tokio::test]
    async fn test_screen_batch_enforces_extractor_contract() {
        let err = screen_batch(
            &BrokenExtractor,
            &make_model(),
            &ProtectedAttributeRegistry::default(),
            &[make_document("a", "", "male")],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_screen_batch_rejects_empty_input() {
        let extractor = RuleBasedExtractor::new().unwrap();
        let err = screen_batch(
            &extractor,
            &make_model(),
            &ProtectedAttributeRegistry::default(),
            &[],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "EMPTY_BATCH");
    }

    #[test]
    fn test_top_features_sorted_by_magnitude() {
        let decision = Decision::new(
            "a",
            Outcome::Favorable,
            0.8,
            HashMap::from([
                ("x".to_string(), 0.1),
                ("y".to_string(), -2.0),
                ("z".to_string(), 1.0),
                ("w".to_string(), 0.0),
            ]),
        )
        .unwrap();
        assert_eq!(top_features(&decision), vec![("y", -2.0), ("z", 1.0), ("x", 0.1)]);
    }
}
