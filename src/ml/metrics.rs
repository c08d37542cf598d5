use crate::ml::models::{Label, MetricKind, PHISHING};
use serde::{Deserialize, Serialize};

/// Binary classification metrics relative to the phishing class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Accuracy
    pub accuracy: f64,

    /// Precision
    pub precision: f64,

    /// Recall
    pub recall: f64,

    /// F1 score
    pub f1: f64,

    /// Confusion counts
    pub confusion: ConfusionMatrix,
}

/// Confusion counts with phishing as the positive class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[Label], y_pred: &[Label]) -> Self {
        let mut matrix = ConfusionMatrix::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == PHISHING, p == PHISHING) {
                (true, true) => matrix.true_positives += 1,
                (false, true) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
                (true, false) => matrix.false_negatives += 1,
            }
        }
        matrix
    }

    /// Number of scored samples
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// Number of positive samples
    pub fn support(&self) -> usize {
        self.true_positives + self.false_negatives
    }
}

impl Metrics {
    /// Calculate metrics; zero denominators yield 0.0
    pub fn calculate(y_true: &[Label], y_pred: &[Label]) -> Self {
        let confusion = ConfusionMatrix::from_predictions(y_true, y_pred);
        let n_samples = confusion.total();
        if n_samples == 0 {
            return Metrics::default();
        }

        let tp = confusion.true_positives as f64;
        let fp = confusion.false_positives as f64;
        let fn_count = confusion.false_negatives as f64;

        let accuracy = (confusion.true_positives + confusion.true_negatives) as f64 / n_samples as f64;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_count > 0.0 {
            tp / (tp + fn_count)
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Metrics {
            accuracy,
            precision,
            recall,
            f1,
            confusion,
        }
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Accuracy => self.accuracy,
            MetricKind::Precision => self.precision,
            MetricKind::Recall => self.recall,
            MetricKind::F1 => self.f1,
        }
    }

    /// Metric name -> value, in reporting order
    pub fn as_pairs(&self) -> [(&'static str, f64); 4] {
        [
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
        ]
    }
}
