use crate::error::{PipelineError, Result, Stage};
use crate::ml::tfidf::SparseMatrix;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

/// Unified feature matrix: lexical columns followed by n-gram columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    /// Dense values (n_samples × n_features)
    pub values: Array2<f64>,

    /// Column names, one per column
    pub column_names: Vec<String>,

    /// Number of leading lexical columns
    pub n_lexical: usize,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }
}

/// Concatenate the dense lexical block and the sparse n-gram block column-wise
///
/// Row order is preserved; no scaling or selection is applied.
pub fn combine(
    lexical: &Array2<f64>,
    tfidf: &SparseMatrix,
    lexical_names: &[String],
    tfidf_names: &[String],
) -> Result<FeatureMatrix> {
    if lexical.nrows() != tfidf.n_rows() {
        return Err(PipelineError::ShapeMismatch {
            stage: Stage::Combination,
            left: "lexical features",
            left_rows: lexical.nrows(),
            right: "n-gram features",
            right_rows: tfidf.n_rows(),
        });
    }

    let n_lexical = lexical.ncols();
    let n_rows = lexical.nrows();
    let mut values = Array2::zeros((n_rows, n_lexical + tfidf.n_cols()));
    values.slice_mut(s![.., ..n_lexical]).assign(lexical);
    for i in 0..n_rows {
        for (j, value) in tfidf.row(i) {
            values[[i, n_lexical + j]] = value;
        }
    }

    let mut column_names = Vec::with_capacity(values.ncols());
    column_names.extend(pad_names(lexical_names, n_lexical, "lexical"));
    column_names.extend(pad_names(tfidf_names, tfidf.n_cols(), "ngram"));

    Ok(FeatureMatrix {
        values,
        column_names,
        n_lexical,
    })
}

fn pad_names(names: &[String], n: usize, prefix: &str) -> Vec<String> {
    (0..n)
        .map(|i| {
            names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("{}_{}", prefix, i))
        })
        .collect()
}
