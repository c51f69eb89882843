//! Gradient-boosted regression trees.
//!
//! Squared-error boosting with second-order (Newton) leaf weights, exact
//! greedy splits and L2 leaf regularisation. Defaults mirror the usual
//! XGBoost regressor defaults. The ensemble starts from the mean of the
//! training targets, so a dataset whose targets are all equal is
//! reproduced exactly.

use linfa::dataset::DatasetBase;
use linfa::traits::{Fit, PredictInplace};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::PredictionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularisation on leaf weights
    pub lambda: f64,
    /// Minimum gain required to split
    pub gamma: f64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            lambda: 1.0,
            gamma: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            Node::Leaf { weight } => *weight,
            Node::Split { feature, threshold, left, right } => {
                if row[*feature] < *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }

    fn is_zero_leaf(&self) -> bool {
        matches!(self, Node::Leaf { weight } if *weight == 0.0)
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct TreeBuilder<'a> {
    params: &'a GradientBoostingParams,
    features: &'a Array2<f64>,
    gradients: &'a [f64],
}

impl TreeBuilder<'_> {
    // Squared error has a constant hessian of 1, so H is the sample count.
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn leaf(&self, g: f64, h: f64) -> Node {
        let weight = -g / (h + self.params.lambda);
        // normalise -0.0
        Node::Leaf { weight: if weight == 0.0 { 0.0 } else { weight } }
    }

    fn build(&self, rows: Vec<usize>, depth: usize) -> Node {
        let g: f64 = rows.iter().map(|&i| self.gradients[i]).sum();
        let h = rows.len() as f64;

        if depth >= self.params.max_depth || h < 2.0 * self.params.min_child_weight {
            return self.leaf(g, h);
        }

        match self.best_split(&rows, g, h) {
            Some(split) => Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(self.build(split.left, depth + 1)),
                right: Box::new(self.build(split.right, depth + 1)),
            },
            None => self.leaf(g, h),
        }
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let parent = self.score(g, h);
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..self.features.ncols() {
            let column = self.features.column(feature);
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut gl = 0.0;
            for pos in 0..sorted.len().saturating_sub(1) {
                gl += self.gradients[sorted[pos]];
                let hl = (pos + 1) as f64;
                let hr = h - hl;

                let here = column[sorted[pos]];
                let next = column[sorted[pos + 1]];
                if here == next {
                    continue;
                }
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.score(gl, hl) + self.score(g - gl, hr) - parent)
                    - self.params.gamma;
                if gain > 0.0 && best.map_or(true, |(_, _, b)| gain > b) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| {
            let column = self.features.column(feature);
            let (left, right) = rows.iter().partition(|&&i| column[i] < threshold);
            BestSplit { feature, threshold, left, right }
        })
    }
}

/// A fitted boosted-tree ensemble
#[derive(Debug, Clone)]
pub struct GradientBoostedRegressor {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Node>,
}

impl GradientBoostedRegressor {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + self.learning_rate * tree.predict(row))
    }
}

impl Fit<Array2<f64>, Array1<f64>, PredictionError> for GradientBoostingParams {
    type Object = GradientBoostedRegressor;

    fn fit(
        &self,
        dataset: &DatasetBase<Array2<f64>, Array1<f64>>,
    ) -> Result<Self::Object, PredictionError> {
        let features = dataset.records();
        let targets = dataset.targets();

        if features.nrows() == 0 {
            return Err(PredictionError::EmptyBatch);
        }
        if features.nrows() != targets.len() {
            return Err(PredictionError::LengthMismatch {
                features: features.nrows(),
                targets: targets.len(),
            });
        }
        if !features.iter().chain(targets.iter()).all(|v| v.is_finite()) {
            return Err(PredictionError::NonFinite);
        }

        let base_score = targets.sum() / targets.len() as f64;
        let mut predictions = vec![base_score; targets.len()];
        let mut trees = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(targets.iter())
                .map(|(p, y)| p - y)
                .collect();

            let builder = TreeBuilder { params: self, features, gradients: &gradients };
            let tree = builder.build((0..features.nrows()).collect(), 0);
            if tree.is_zero_leaf() {
                tracing::debug!(round, "boosting converged");
                break;
            }

            for (i, row) in features.rows().into_iter().enumerate() {
                predictions[i] += self.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(GradientBoostedRegressor {
            base_score,
            learning_rate: self.learning_rate,
            trees,
        })
    }
}

impl PredictInplace<Array2<f64>, Array1<f64>> for GradientBoostedRegressor {
    fn predict_inplace(&self, features: &Array2<f64>, targets: &mut Array1<f64>) {
        assert_eq!(
            features.nrows(),
            targets.len(),
            "The number of data points must match the number of output targets."
        );
        for (row, target) in features.rows().into_iter().zip(targets.iter_mut()) {
            *target = self.predict_row(row);
        }
    }

    fn default_target(&self, features: &Array2<f64>) -> Array1<f64> {
        Array1::zeros(features.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linfa::prelude::*;
    use ndarray::array;

    fn fit(features: Array2<f64>, targets: Array1<f64>) -> GradientBoostedRegressor {
        let dataset = Dataset::new(features, targets);
        GradientBoostingParams::default().fit(&dataset).unwrap()
    }

    #[test]
    fn test_single_sample_is_memorised_exactly() {
        let features = array![[10.0, 10.0, 10.0]];
        let model = fit(features.clone(), array![10.0]);
        let predictions = model.predict(&features);
        assert_eq!(predictions[0], 10.0);
        assert_eq!(model.n_trees(), 0);
    }

    #[test]
    fn test_constant_targets_reproduced_exactly() {
        let features = array![[20.0, 20.0, 20.0], [20.0, 20.0, 20.0]];
        let model = fit(features.clone(), array![20.0, 20.0]);
        let predictions = model.predict(&features);
        assert_eq!(predictions.to_vec(), vec![20.0, 20.0]);
    }

    #[test]
    fn test_distinct_rows_fit_closely() {
        let features = array![
            [10.0, 12.0, 14.0],
            [25.0, 30.0, 35.0],
            [40.0, 45.0, 50.0],
            [5.0, 0.0, 10.0],
            [48.0, 50.0, 49.0],
        ];
        let targets = features.mean_axis(ndarray::Axis(1)).unwrap();
        let model = fit(features.clone(), targets.clone());
        let predictions = model.predict(&features);

        for (p, t) in predictions.iter().zip(targets.iter()) {
            assert!((p - t).abs() < 1e-3, "prediction {} too far from {}", p, t);
        }
        assert!(model.n_trees() > 0);
    }

    #[test]
    fn test_predictions_preserve_order() {
        let features = array![[1.0, 1.0, 1.0], [30.0, 30.0, 30.0], [60.0, 60.0, 60.0]];
        let targets = array![1.0, 30.0, 60.0];
        let predictions = fit(features.clone(), targets).predict(&features);
        assert!(predictions[0] < predictions[1]);
        assert!(predictions[1] < predictions[2]);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let dataset = Dataset::new(Array2::<f64>::zeros((0, 3)), Array1::<f64>::zeros(0));
        let result = GradientBoostingParams::default().fit(&dataset);
        assert!(matches!(result, Err(PredictionError::EmptyBatch)));
    }

    #[test]
    fn test_non_finite_rejected() {
        let dataset = Dataset::new(array![[f64::NAN, 1.0, 2.0]], array![1.0]);
        let result = GradientBoostingParams::default().fit(&dataset);
        assert!(matches!(result, Err(PredictionError::NonFinite)));
    }
}
