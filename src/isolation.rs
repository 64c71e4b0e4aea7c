// =============================================================================
// OVERLAY COORDINATOR — isolation.rs
// Isolation Forest — one-class детектор выбросов
// =============================================================================
//
// Идея: выброс изолируется случайными разрезами быстрее, чем нормальная точка.
//   s(x) = 2^(-E[h(x)] / c(ψ))
//   h(x) — глубина листа, c(ψ) — средняя глубина неуспешного поиска в BST
//
// Порог: (1 - contamination)-квантиль скоров baseline выборки.
// Обучение (сбор baseline) — внешняя забота; здесь только fit + score.
// =============================================================================

use crate::classifier::{AnomalyScorer, ClassificationFeatures, Verdict, FEATURE_DIM};
use crate::constants::DEFAULT_CONTAMINATION;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone)]
pub struct IsolationConfig {
    pub n_trees: usize,
    pub sample_size: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        IsolationConfig {
            n_trees: 100,
            sample_size: 256,
            contamination: DEFAULT_CONTAMINATION,
            seed: 0x1505_F0E5_7000,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split { feature: usize, value: f64, left: Box<Node>, right: Box<Node> },
}

/// Average path length of an unsuccessful BST search over `n` points.
fn c_factor(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build(data: &ArrayView2<f64>, rows: &[usize], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // только признаки с ненулевым разбросом
    let mut spans = Vec::with_capacity(data.ncols());
    for feature in 0..data.ncols() {
        let column = data.column(feature);
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(column[r]), hi.max(column[r]))
        });
        if hi > lo {
            spans.push((feature, lo, hi));
        }
    }
    if spans.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = spans[rng.gen_range(0..spans.len())];
    let value = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.iter().copied().partition(|&r| data[[r, feature]] < value);

    Node::Split {
        feature,
        value,
        left: Box::new(build(data, &left, depth + 1, limit, rng)),
        right: Box::new(build(data, &right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, x: &ArrayView1<f64>, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + c_factor(*size),
        Node::Split { feature, value, left, right } => {
            if x[*feature] < *value {
                path_length(left, x, depth + 1)
            } else {
                path_length(right, x, depth + 1)
            }
        }
    }
}

/// Fitted forest plus its decision threshold.
#[derive(Debug, Clone)]
struct FittedForest {
    trees: Vec<Node>,
    normaliser: f64,
    threshold: f64,
}

impl FittedForest {
    fn anomaly_score(&self, x: &ArrayView1<f64>) -> f64 {
        if self.normaliser <= 0.0 {
            return 0.5;
        }
        let mean = self.trees.iter().map(|t| path_length(t, x, 0)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean / self.normaliser)
    }
}

pub struct IsolationForest {
    config: IsolationConfig,
    fitted: Option<FittedForest>,
}

impl IsolationForest {
    /// Unfitted forest; scoring reports `ClassificationUnavailable`.
    pub fn new(config: IsolationConfig) -> Self {
        IsolationForest { config, fitted: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fit(&mut self, baseline: ArrayView2<f64>) -> Result<()> {
        let n = baseline.nrows();
        if n < 2 {
            return Err(Error::ClassificationUnavailable(format!("baseline needs at least 2 rows, got {}", n)));
        }
        if baseline.ncols() != FEATURE_DIM {
            return Err(Error::ClassificationUnavailable(format!(
                "baseline must have {} columns, got {}",
                FEATURE_DIM,
                baseline.ncols()
            )));
        }
        if baseline.iter().any(|v| !v.is_finite()) {
            return Err(Error::ClassificationUnavailable("baseline contains non-finite values".into()));
        }
        if !(0.0..0.5).contains(&self.config.contamination) || self.config.n_trees == 0 {
            return Err(Error::ClassificationUnavailable("invalid forest configuration".into()));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let psi = self.config.sample_size.clamp(2, n);
        let limit = (psi as f64).log2().ceil() as usize;

        let trees: Vec<Node> = (0..self.config.n_trees)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                build(&baseline, &rows, 0, limit, &mut rng)
            })
            .collect();

        let mut forest = FittedForest { trees, normaliser: c_factor(psi), threshold: f64::INFINITY };

        let mut scores: Vec<f64> = baseline.axis_iter(Axis(0)).map(|row| forest.anomaly_score(&row)).collect();
        scores.sort_by(|a, b| a.total_cmp(b));
        let cut = ((1.0 - self.config.contamination) * n as f64).ceil() as usize;
        forest.threshold = scores[cut.clamp(1, n) - 1];

        log::info!(
            "🌲 Isolation forest fitted: {} trees, ψ={}, threshold={:.4}",
            forest.trees.len(),
            psi,
            forest.threshold
        );
        self.fitted = Some(forest);
        Ok(())
    }

    /// Raw anomaly score in (0, 1]; higher is more isolated.
    pub fn anomaly_score(&self, features: &ClassificationFeatures) -> Result<f64> {
        let forest = self
            .fitted
            .as_ref()
            .ok_or_else(|| Error::ClassificationUnavailable("isolation forest not fitted".into()))?;
        let x = features.to_array();
        Ok(forest.anomaly_score(&x.view()))
    }

    pub fn threshold(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.threshold)
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(IsolationConfig::default())
    }
}

impl AnomalyScorer for IsolationForest {
    fn score(&self, features: &ClassificationFeatures) -> Result<Verdict> {
        let score = self.anomaly_score(features)?;
        let threshold = self.threshold().unwrap_or(f64::INFINITY);
        Ok(if score > threshold { Verdict::Anomalous } else { Verdict::Normal })
    }
}

/// Baseline file: JSON array of `[size, frequency]` pairs.
pub fn load_baseline(path: &Path) -> Result<Array2<f64>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("baseline {}: {}", path.display(), e)))?;
    let rows: Vec<[f64; FEATURE_DIM]> =
        serde_json::from_str(&raw).map_err(|e| Error::Config(format!("baseline {}: {}", path.display(), e)))?;
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((rows.len(), FEATURE_DIM), flat)
        .map_err(|e| Error::Config(format!("baseline {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;

    fn uniform_baseline(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((n, FEATURE_DIM), |(_, col)| {
            if col == 0 { rng.gen_range(200.0..400.0) } else { rng.gen_range(1.0..3.0) }
        })
    }

    fn fitted() -> IsolationForest {
        let mut forest = IsolationForest::default();
        forest.fit(uniform_baseline(512, 7).view()).unwrap();
        forest
    }

    #[test]
    fn test_unfitted_is_unavailable() {
        let forest = IsolationForest::default();
        let err = forest.score(&ClassificationFeatures::default()).unwrap_err();
        assert!(matches!(err, Error::ClassificationUnavailable(_)));
        // через Classifier — всегда normal
        let c = Classifier::from_scorer(forest);
        assert_eq!(c.classify(&ClassificationFeatures::new(1e9, 1e9)), Verdict::Normal);
    }

    #[test]
    fn test_single_point_baseline_rejected() {
        let mut forest = IsolationForest::default();
        let one = Array2::<f64>::zeros((1, FEATURE_DIM));
        assert!(forest.fit(one.view()).is_err());
        assert!(!forest.is_fitted());
    }

    #[test]
    fn test_outlier_flagged_center_normal() {
        let forest = fitted();
        assert_eq!(forest.score(&ClassificationFeatures::new(300.0, 2.0)).unwrap(), Verdict::Normal);
        assert_eq!(forest.score(&ClassificationFeatures::new(1_000_000.0, 500.0)).unwrap(), Verdict::Anomalous);
    }

    #[test]
    fn test_scores_are_deterministic() {
        let a = fitted();
        let b = fitted();
        let probe = ClassificationFeatures::new(390.0, 2.9);
        assert_eq!(a.anomaly_score(&probe).unwrap(), a.anomaly_score(&probe).unwrap());
        assert_eq!(a.anomaly_score(&probe).unwrap(), b.anomaly_score(&probe).unwrap());
    }

    #[test]
    fn test_contamination_share_of_baseline() {
        let baseline = uniform_baseline(400, 11);
        let mut forest = IsolationForest::default();
        forest.fit(baseline.view()).unwrap();
        let flagged = baseline
            .axis_iter(Axis(0))
            .filter(|row| {
                let f = ClassificationFeatures::new(row[0], row[1]);
                forest.score(&f).unwrap().is_anomalous()
            })
            .count();
        // строго больше порога => не больше 5% baseline
        assert!(flagged <= 20, "flagged {}", flagged);
    }

    #[test]
    fn test_constant_baseline_never_panics() {
        let mut forest = IsolationForest::default();
        forest.fit(Array2::<f64>::zeros((10, FEATURE_DIM)).view()).unwrap();
        assert_eq!(forest.score(&ClassificationFeatures::new(0.0, 0.0)).unwrap(), Verdict::Normal);
    }

    #[test]
    fn test_load_baseline() {
        let dir = std::env::temp_dir().join(format!("baseline-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&dir, "[[1.0, 2.0], [3, 4]]").unwrap();
        let data = load_baseline(&dir).unwrap();
        assert_eq!(data.dim(), (2, FEATURE_DIM));
        assert_eq!(data[[1, 0]], 3.0);
        std::fs::remove_file(&dir).unwrap();
    }
}
