// =============================================================================
// OVERLAY COORDINATOR — classifier.rs
// Классификация входящего трафика: normal / anomalous
// =============================================================================
//
// Модель — чёрный ящик за трейтом AnomalyScorer.
// Classifier — обёртка: любая ошибка скорера => Verdict::Normal.
// =============================================================================

use crate::constants::{DEFAULT_FEATURE_FREQUENCY, DEFAULT_FEATURE_SIZE};
use crate::error::Result;
use ndarray::{arr1, Array1};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const FEATURE_DIM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Normal,
    Anomalous,
}

impl Verdict {
    pub fn is_anomalous(self) -> bool {
        self == Verdict::Anomalous
    }
}

/// Per-message feature vector. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFeatures {
    pub size: f64,
    pub frequency: f64,
}

impl Default for ClassificationFeatures {
    fn default() -> Self {
        ClassificationFeatures { size: DEFAULT_FEATURE_SIZE, frequency: DEFAULT_FEATURE_FREQUENCY }
    }
}

impl ClassificationFeatures {
    pub fn new(size: f64, frequency: f64) -> Self {
        ClassificationFeatures { size, frequency }
    }

    /// Reads numeric `size` / `frequency` from the decoded message object,
    /// substituting defaults for anything absent or non-numeric.
    pub fn extract(message: &serde_json::Value) -> Self {
        let defaults = Self::default();
        let field = |name: &str, fallback: f64| {
            message
                .get(name)
                .and_then(serde_json::Value::as_f64)
                .filter(|v| v.is_finite())
                .unwrap_or(fallback)
        };
        ClassificationFeatures {
            size: field("size", defaults.size),
            frequency: field("frequency", defaults.frequency),
        }
    }

    pub fn to_array(&self) -> Array1<f64> {
        arr1(&[self.size, self.frequency])
    }
}

/// Pluggable scoring model. Must be deterministic for a fixed internal state.
pub trait AnomalyScorer: Send + Sync {
    /// `Err(ClassificationUnavailable)` when the model is not ready.
    fn score(&self, features: &ClassificationFeatures) -> Result<Verdict>;
}

impl<F> AnomalyScorer for F
where
    F: Fn(&ClassificationFeatures) -> Verdict + Send + Sync,
{
    fn score(&self, features: &ClassificationFeatures) -> Result<Verdict> {
        Ok(self(features))
    }
}

/// Shared, read-only view of the scorer used by every session.
#[derive(Clone)]
pub struct Classifier {
    scorer: Arc<dyn AnomalyScorer>,
}

impl Classifier {
    pub fn new(scorer: Arc<dyn AnomalyScorer>) -> Self {
        Classifier { scorer }
    }

    pub fn from_scorer<S: AnomalyScorer + 'static>(scorer: S) -> Self {
        Self::new(Arc::new(scorer))
    }

    /// Classifier that never flags anything.
    pub fn permissive() -> Self {
        Self::from_scorer(|_: &ClassificationFeatures| Verdict::Normal)
    }

    pub fn classify(&self, features: &ClassificationFeatures) -> Verdict {
        match self.scorer.score(features) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::debug!("classifier fallback to normal: {}", e);
                Verdict::Normal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    struct NotReady;

    impl AnomalyScorer for NotReady {
        fn score(&self, _: &ClassificationFeatures) -> Result<Verdict> {
            Err(Error::ClassificationUnavailable("not fitted".into()))
        }
    }

    #[test]
    fn test_extract_defaults() {
        let f = ClassificationFeatures::extract(&json!({"type": "ack"}));
        assert_eq!(f, ClassificationFeatures::new(0.0, 1.0));
    }

    #[test]
    fn test_extract_present_and_bad_values() {
        let f = ClassificationFeatures::extract(&json!({"size": 4096, "frequency": 12.5}));
        assert_eq!(f, ClassificationFeatures::new(4096.0, 12.5));
        let f = ClassificationFeatures::extract(&json!({"size": "huge", "frequency": null}));
        assert_eq!(f, ClassificationFeatures::default());
    }

    #[test]
    fn test_unavailable_defaults_to_normal() {
        let c = Classifier::from_scorer(NotReady);
        assert_eq!(c.classify(&ClassificationFeatures::new(1e9, 1e9)), Verdict::Normal);
    }

    #[test]
    fn test_closure_scorer() {
        let c = Classifier::from_scorer(|f: &ClassificationFeatures| {
            if f.size > 1000.0 { Verdict::Anomalous } else { Verdict::Normal }
        });
        assert!(c.classify(&ClassificationFeatures::new(5000.0, 1.0)).is_anomalous());
        assert!(!c.classify(&ClassificationFeatures::new(10.0, 1.0)).is_anomalous());
        assert_eq!(Classifier::permissive().classify(&ClassificationFeatures::new(5000.0, 1.0)), Verdict::Normal);
    }

    #[test]
    fn test_to_array_shape() {
        assert_eq!(ClassificationFeatures::new(3.0, 4.0).to_array().len(), FEATURE_DIM);
    }
}
