//! Numeric protected-attribute bucketing.
//!
//! A `Bucketizer` is a domain minimum plus a strictly increasing cut-point list.
//! Bucket `i` covers `[cut[i-1], cut[i])`; the first bucket starts at the domain
//! minimum and the last is open-ended. Values outside the domain clamp to the
//! nearest terminal bucket, so every finite value maps to exactly one bucket.

use serde::{Deserialize, Serialize};

use crate::errors::AuditError;

/// Default age bands: 18-24, 25-34, 35-44, 45-54, 55+.
pub const AGE_DOMAIN_MIN: f64 = 18.0;
pub const AGE_CUT_POINTS: [f64; 4] = [25.0, 35.0, 45.0, 55.0];

#[derive(Deserialize)]
struct BucketizerParts {
    lower_bound: f64,
    cut_points: Vec<f64>,
}

impl TryFrom<BucketizerParts> for Bucketizer {
    type Error = AuditError;

    fn try_from(parts: BucketizerParts) -> Result<Self, Self::Error> {
        Bucketizer::new(parts.lower_bound, parts.cut_points)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BucketizerParts")]
pub struct Bucketizer {
    lower_bound: f64,
    cut_points: Vec<f64>,
}

impl Bucketizer {
    /// Fails with `InvalidProtectedAttribute` when the cut points are not
    /// finite, not strictly increasing, or do not lie above the lower bound.
    pub fn new(lower_bound: f64, cut_points: Vec<f64>) -> Result<Self, AuditError> {
        if !lower_bound.is_finite() {
            return Err(AuditError::InvalidProtectedAttribute(format!(
                "Bucket lower bound must be finite, got {lower_bound}"
            )));
        }
        let mut previous = lower_bound;
        for &cut in &cut_points {
            if !cut.is_finite() || cut <= previous {
                return Err(AuditError::InvalidProtectedAttribute(format!(
                    "Bucket cut points must be finite and strictly increasing above {lower_bound}: {cut_points:?}"
                )));
            }
            previous = cut;
        }
        Ok(Self {
            lower_bound,
            cut_points,
        })
    }

    pub fn age_bands() -> Self {
        Self {
            lower_bound: AGE_DOMAIN_MIN,
            cut_points: AGE_CUT_POINTS.to_vec(),
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    pub fn cut_points(&self) -> &[f64] {
        &self.cut_points
    }

    pub fn bucket_count(&self) -> usize {
        self.cut_points.len() + 1
    }

    /// Index of the bucket holding `value`, clamping out-of-domain values.
    pub fn bucket_index(&self, value: f64) -> Result<usize, AuditError> {
        if !value.is_finite() {
            return Err(AuditError::InvalidProtectedAttribute(format!(
                "Cannot bucket non-finite value {value}"
            )));
        }
        Ok(self.cut_points.partition_point(|&cut| cut <= value))
    }

    pub fn bucket(&self, value: f64) -> Result<String, AuditError> {
        let index = self.bucket_index(value)?;
        Ok(self.label(index))
    }

    /// All bucket labels in ascending order.
    pub fn labels(&self) -> Vec<String> {
        (0..self.bucket_count()).map(|i| self.label(i)).collect()
    }

    fn label(&self, index: usize) -> String {
        let start = if index == 0 {
            self.lower_bound
        } else {
            self.cut_points[index - 1]
        };
        match self.cut_points.get(index) {
            None => format!("{}+", fmt_bound(start)),
            Some(&end) if is_integral(start) && is_integral(end) => {
                format!("{}-{}", fmt_bound(start), fmt_bound(end - 1.0))
            }
            Some(&end) => format!("{}-<{}", fmt_bound(start), fmt_bound(end)),
        }
    }
}

fn is_integral(x: f64) -> bool {
    x.fract() == 0.0
}

fn fmt_bound(x: f64) -> String {
    if is_integral(x) {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_band_labels() {
        let bands = Bucketizer::age_bands();
        assert_eq!(
            bands.labels(),
            vec!["18-24", "25-34", "35-44", "45-54", "55+"]
        );
    }

    #[test]
    fn test_age_below_domain_clamps_to_first_band() {
        let bands = Bucketizer::age_bands();
        assert_eq!(bands.bucket(17.0).unwrap(), "18-24");
        assert_eq!(bands.bucket(0.0).unwrap(), "18-24");
    }

    #[test]
    fn test_age_above_last_cut_is_open_band() {
        let bands = Bucketizer::age_bands();
        assert_eq!(bands.bucket(60.0).unwrap(), "55+");
        assert_eq!(bands.bucket(120.0).unwrap(), "55+");
    }

    #[test]
    fn test_cut_point_belongs_to_upper_band() {
        let bands = Bucketizer::age_bands();
        assert_eq!(bands.bucket(24.9).unwrap(), "18-24");
        assert_eq!(bands.bucket(25.0).unwrap(), "25-34");
        assert_eq!(bands.bucket(55.0).unwrap(), "55+");
    }

    #[test]
    fn test_bucketing_is_monotonic() {
        let bands = Bucketizer::age_bands();
        let mut last = 0;
        for age in 0..100 {
            let idx = bands.bucket_index(age as f64).unwrap();
            assert!(idx >= last, "bucket index decreased at age {age}");
            last = idx;
        }
        assert_eq!(last, bands.bucket_count() - 1);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let bands = Bucketizer::age_bands();
        let err = bands.bucket(f64::NAN).unwrap_err();
        assert_eq!(err.code(), "INVALID_PROTECTED_ATTRIBUTE");
        assert!(bands.bucket(f64::INFINITY).is_err());
    }

    #[test]
    fn test_non_increasing_cuts_rejected() {
        assert!(Bucketizer::new(18.0, vec![30.0, 25.0]).is_err());
        assert!(Bucketizer::new(18.0, vec![25.0, 25.0]).is_err());
        assert!(Bucketizer::new(18.0, vec![10.0]).is_err());
        assert!(Bucketizer::new(f64::NAN, vec![25.0]).is_err());
    }

    #[test]
    fn test_no_cuts_is_single_open_bucket() {
        let b = Bucketizer::new(0.0, vec![]).unwrap();
        assert_eq!(b.labels(), vec!["0+"]);
        assert_eq!(b.bucket(-5.0).unwrap(), "0+");
    }

    #[test]
    fn test_fractional_cut_labels() {
        let b = Bucketizer::new(0.0, vec![0.5]).unwrap();
        assert_eq!(b.labels(), vec!["0-<0.5", "0.5+"]);
    }

    #[test]
    fn test_deserialize_validates_cut_points() {
        let bad = r#"{"lower_bound": 18, "cut_points": [40, 30]}"#;
        assert!(serde_json::from_str::<Bucketizer>(bad).is_err());
        let good = r#"{"lower_bound": 18, "cut_points": [25, 35, 45, 55]}"#;
        let b: Bucketizer = serde_json::from_str(good).unwrap();
        assert_eq!(b, Bucketizer::age_bands());
    }
}
