use crate::error::{PipelineError, Result, Stage};
use crate::ml::models::{Label, SplitConfig, LEGITIMATE, PHISHING};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// A materialised train/test partition
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Vec<Label>,
    pub y_test: Vec<Label>,
}

/// Shuffled, unstratified split of `n_samples` rows
///
/// The test partition takes `ceil(n * test_size)` rows; when `n >= 2` both
/// partitions are kept non-empty.
pub fn train_test_indices(n_samples: usize, config: &SplitConfig) -> SplitIndices {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let mut n_test = (n_samples as f64 * config.test_size).ceil() as usize;
    if n_samples >= 2 {
        n_test = n_test.clamp(1, n_samples - 1);
    } else {
        n_test = n_test.min(n_samples);
    }

    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    SplitIndices { train, test }
}

/// Split features and labels with the configured ratio and seed
pub fn train_test_split(
    x: &Array2<f64>,
    y: &[Label],
    config: &SplitConfig,
) -> Result<TrainTestSplit> {
    validate_inputs(x, y, Stage::Training)?;
    let indices = train_test_indices(x.nrows(), config);

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &indices.train),
        x_test: x.select(Axis(0), &indices.test),
        y_train: indices.train.iter().map(|&i| y[i]).collect(),
        y_test: indices.test.iter().map(|&i| y[i]).collect(),
    })
}

/// Stratified, unshuffled k-fold assignment
///
/// Rows of each class are dealt round-robin over the folds in index order.
/// Returns one (train, validation) pair of index lists per fold.
pub fn stratified_k_fold(y: &[Label], k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let mut fold_of = vec![0usize; y.len()];
    for class in [LEGITIMATE, PHISHING] {
        let members = y.iter().enumerate().filter(|&(_, &label)| label == class);
        for (position, (row, _)) in members.enumerate() {
            fold_of[row] = position % k;
        }
    }

    (0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&row| fold_of[row] == fold);
            (train, validation)
        })
        .collect()
}

/// Check row alignment, emptiness and label domain
pub fn validate_inputs(x: &Array2<f64>, y: &[Label], stage: Stage) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeMismatch {
            stage,
            left: "feature matrix",
            left_rows: x.nrows(),
            right: "labels",
            right_rows: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::EmptyDataset { stage });
    }
    if let Some((row, &label)) = y
        .iter()
        .enumerate()
        .find(|&(_, &l)| l != LEGITIMATE && l != PHISHING)
    {
        return Err(PipelineError::InvalidLabel { stage, row, label });
    }
    Ok(())
}
