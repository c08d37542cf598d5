//! Gradient-boosted regression trees for binary classification.
//!
//! Each round fits a regression tree to the gradient and hessian of the
//! logistic loss and adds its leaf weights, scaled by the learning rate, to
//! the running margin. Split search works on per-feature histograms: the
//! training values of each column are cut into at most `MAX_BINS` buckets
//! once per fit, so finding a split costs one pass over the node's rows per
//! feature.

use crate::error::{PipelineError, Result};
use crate::ml::models::{GradientBoostingParams, Label, ModelFamily, PHISHING};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Upper bound on histogram buckets per feature
const MAX_BINS: usize = 64;

/// L2 regularisation on leaf weights
const LAMBDA: f64 = 1.0;

/// Minimum hessian sum on each side of a split
const MIN_CHILD_WEIGHT: f64 = 1.0;

/// Margins are clamped to keep the sigmoid finite
const MAX_MARGIN: f64 = 30.0;

/// Regression tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { weight } => *weight,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Training matrix quantised into histogram buckets
struct BinnedMatrix {
    /// Candidate split thresholds per feature, ascending
    thresholds: Vec<Vec<f64>>,
    /// Bucket index per feature (outer) and row (inner)
    bins: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    fn new(x: &Array2<f64>) -> Self {
        let mut thresholds = Vec::with_capacity(x.ncols());
        let mut bins = Vec::with_capacity(x.ncols());

        for column in x.columns() {
            let mut distinct: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup();

            let cuts = Self::cut_points(&distinct);
            let column_bins = column
                .iter()
                .map(|v| cuts.partition_point(|t| t < v) as u16)
                .collect();

            thresholds.push(cuts);
            bins.push(column_bins);
        }

        Self { thresholds, bins }
    }

    /// Midpoints between (sampled) consecutive distinct values
    fn cut_points(distinct: &[f64]) -> Vec<f64> {
        if distinct.len() < 2 {
            return Vec::new();
        }
        let anchors: Vec<f64> = if distinct.len() <= MAX_BINS {
            distinct.to_vec()
        } else {
            let mut sampled: Vec<f64> = (0..MAX_BINS)
                .map(|i| distinct[i * distinct.len() / MAX_BINS])
                .collect();
            sampled.push(distinct[distinct.len() - 1]);
            sampled.dedup();
            sampled
        };
        anchors.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }
}

/// Best split found for a node
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Gradient-boosted tree ensemble with logistic loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    /// Initial margin (log-odds of the training positive rate)
    base_margin: f64,

    /// Shrinkage applied to every tree
    learning_rate: f64,

    /// Fitted trees, in boosting order
    trees: Vec<TreeNode>,
}

impl GradientBoostedTrees {
    /// Fit an ensemble on a binary problem
    pub fn fit(x: &Array2<f64>, y: &[Label], params: &GradientBoostingParams) -> Result<Self> {
        if x.nrows() != y.len() || x.nrows() == 0 {
            return Err(PipelineError::training(
                ModelFamily::GradientBoosting,
                format!("{} rows of features for {} labels", x.nrows(), y.len()),
            ));
        }
        if params.learning_rate <= 0.0 || params.max_depth == 0 {
            return Err(PipelineError::training(
                ModelFamily::GradientBoosting,
                "learning_rate must be positive and max_depth at least 1",
            ));
        }

        let targets: Vec<f64> = y.iter().map(|&l| f64::from(u8::from(l == PHISHING))).collect();
        let positive_rate = targets.iter().sum::<f64>() / targets.len() as f64;
        let positive_rate = positive_rate.clamp(1e-6, 1.0 - 1e-6);
        let base_margin = (positive_rate / (1.0 - positive_rate)).ln();

        let binned = BinnedMatrix::new(x);
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut margins = vec![base_margin; x.nrows()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let mut gradients = Vec::with_capacity(margins.len());
            let mut hessians = Vec::with_capacity(margins.len());
            for (margin, target) in margins.iter().zip(&targets) {
                let p = sigmoid(*margin);
                gradients.push(p - target);
                hessians.push((p * (1.0 - p)).max(1e-16));
            }

            let tree = Self::build_tree(
                &binned,
                &gradients,
                &hessians,
                &rows,
                0,
                params.max_depth as usize,
            );
            for (i, margin) in margins.iter_mut().enumerate() {
                let update = params.learning_rate * tree.predict(x.row(i));
                *margin = (*margin + update).clamp(-MAX_MARGIN, MAX_MARGIN);
            }
            trees.push(tree);
        }

        Ok(Self {
            base_margin,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    /// Raw margin per row
    pub fn decision_function(&self, x: &Array2<f64>) -> Vec<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let boosted: f64 = self.trees.iter().map(|tree| tree.predict(row)).sum();
                self.base_margin + self.learning_rate * boosted
            })
            .collect()
    }

    /// Phishing probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        self.decision_function(x).into_iter().map(sigmoid).collect()
    }

    /// Class labels, phishing when the probability exceeds 0.5
    pub fn predict(&self, x: &Array2<f64>) -> Vec<Label> {
        self.predict_proba(x)
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Deepest tree in the ensemble
    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(TreeNode::depth).max().unwrap_or(0)
    }

    fn build_tree(
        binned: &BinnedMatrix,
        gradients: &[f64],
        hessians: &[f64],
        rows: &[usize],
        depth: usize,
        max_depth: usize,
    ) -> TreeNode {
        let g_sum: f64 = rows.iter().map(|&i| gradients[i]).sum();
        let h_sum: f64 = rows.iter().map(|&i| hessians[i]).sum();
        let leaf = TreeNode::Leaf {
            weight: -g_sum / (h_sum + LAMBDA),
        };

        if depth >= max_depth || rows.len() < 2 {
            return leaf;
        }

        let Some(best) = Self::find_best_split(binned, gradients, hessians, rows, g_sum, h_sum)
        else {
            return leaf;
        };

        let feature_bins = &binned.bins[best.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| (feature_bins[i] as usize) <= best.bin);

        TreeNode::Split {
            feature: best.feature,
            threshold: binned.thresholds[best.feature][best.bin],
            left: Box::new(Self::build_tree(
                binned,
                gradients,
                hessians,
                &left_rows,
                depth + 1,
                max_depth,
            )),
            right: Box::new(Self::build_tree(
                binned,
                gradients,
                hessians,
                &right_rows,
                depth + 1,
                max_depth,
            )),
        }
    }

    /// Scan every feature histogram; the first strictly best gain wins
    fn find_best_split(
        binned: &BinnedMatrix,
        gradients: &[f64],
        hessians: &[f64],
        rows: &[usize],
        g_sum: f64,
        h_sum: f64,
    ) -> Option<SplitCandidate> {
        let parent_score = g_sum * g_sum / (h_sum + LAMBDA);
        let mut best: Option<SplitCandidate> = None;

        for (feature, cuts) in binned.thresholds.iter().enumerate() {
            if cuts.is_empty() {
                continue;
            }
            let n_bins = cuts.len() + 1;
            let mut g_hist = vec![0.0; n_bins];
            let mut h_hist = vec![0.0; n_bins];
            for &i in rows {
                let bin = binned.bins[feature][i] as usize;
                g_hist[bin] += gradients[i];
                h_hist[bin] += hessians[i];
            }

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for bin in 0..n_bins - 1 {
                g_left += g_hist[bin];
                h_left += h_hist[bin];
                let g_right = g_sum - g_left;
                let h_right = h_sum - h_left;
                if h_left < MIN_CHILD_WEIGHT || h_right < MIN_CHILD_WEIGHT {
                    continue;
                }

                let gain = g_left * g_left / (h_left + LAMBDA)
                    + g_right * g_right / (h_right + LAMBDA)
                    - parent_score;
                let improves = match &best {
                    Some(current) => gain > current.gain,
                    None => gain > 1e-12,
                };
                if improves {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
