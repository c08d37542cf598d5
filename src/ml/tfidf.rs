//! Character n-gram TF-IDF vectorizer.
//!
//! URLs are lowercased and cut into overlapping character windows of every
//! length in the configured n-gram range. The vocabulary is chosen once at
//! fit time and frozen; transform only ever looks terms up in it, so n-grams
//! that were not seen during fit are dropped.

use crate::error::{PipelineError, Result, Stage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Vectorizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfConfig {
    /// Maximum vocabulary size
    pub max_features: usize,

    /// Character n-gram range (min, max), inclusive
    pub ngram_range: (usize, usize),

    /// Lowercase URLs before tokenizing
    pub lowercase: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            ngram_range: (3, 5),
            lowercase: true,
        }
    }
}

/// Sparse matrix in compressed sparse row layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_rows: usize,
    n_cols: usize,
    /// Row `i` occupies `indices[indptr[i]..indptr[i + 1]]`
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl SparseMatrix {
    /// Empty matrix with no rows
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_rows: 0,
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Append a row given as (column, value) pairs sorted by column
    pub fn push_row(&mut self, entries: &[(usize, f64)]) {
        for &(col, value) in entries {
            debug_assert!(col < self.n_cols);
            if value != 0.0 {
                self.indices.push(col);
                self.data.push(value);
            }
        }
        self.indptr.push(self.indices.len());
        self.n_rows += 1;
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of stored non-zero values
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Non-zero (column, value) pairs of one row
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.indptr[i];
        let end = self.indptr[i + 1];
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.data[start..end].iter().copied())
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.row(i)
            .find(|(col, _)| *col == j)
            .map(|(_, v)| v)
            .unwrap_or(0.0)
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_rows, self.n_cols));
        for i in 0..self.n_rows {
            for (j, value) in self.row(i) {
                dense[[i, j]] = value;
            }
        }
        dense
    }
}

/// Character n-gram TF-IDF vectorizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Configuration
    config: TfidfConfig,

    /// Vocabulary mapping (term -> column)
    vocabulary: HashMap<String, usize>,

    /// Terms in column order
    terms: Vec<String>,

    /// IDF per column
    idf: Vec<f64>,

    /// Is fitted (vocabulary built)
    is_fitted: bool,
}

impl TfidfVectorizer {
    /// Create a new vectorizer
    pub fn new(config: TfidfConfig) -> Self {
        Self {
            config,
            vocabulary: HashMap::new(),
            terms: Vec::new(),
            idf: Vec::new(),
            is_fitted: false,
        }
    }

    /// Build the vocabulary and IDF weights from a corpus
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<()> {
        if corpus.is_empty() {
            return Err(PipelineError::EmptyDataset {
                stage: Stage::Vectorization,
            });
        }
        let (min_n, max_n) = self.config.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(PipelineError::Configuration(format!(
                "invalid n-gram range ({}, {})",
                min_n, max_n
            )));
        }

        let mut corpus_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for document in corpus {
            let counts = self.count_terms(document.as_ref());
            for (term, count) in counts {
                *corpus_freq.entry(term.clone()).or_insert(0) += count;
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let n_docs = corpus.len() as f64;
        let smoothed_idf = |df: usize| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0;

        // Rank by corpus frequency x idf, ties by term so the choice is deterministic
        let mut ranked: Vec<(String, f64)> = corpus_freq
            .into_iter()
            .map(|(term, cf)| {
                let score = cf as f64 * smoothed_idf(doc_freq[&term]);
                (term, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.config.max_features);

        let mut selected: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        selected.sort();

        self.idf = selected
            .iter()
            .map(|term| smoothed_idf(doc_freq[term]))
            .collect();
        self.vocabulary = selected
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        self.terms = selected;
        self.is_fitted = true;

        Ok(())
    }

    /// Weight URLs against the fitted vocabulary
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<SparseMatrix> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted {
                stage: Stage::Vectorization,
                component: "TfidfVectorizer",
            });
        }

        let mut matrix = SparseMatrix::new(self.terms.len());
        for document in documents {
            matrix.push_row(&self.transform_one(document.as_ref()));
        }
        Ok(matrix)
    }

    /// Fit and transform in one step
    pub fn fit_transform<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<SparseMatrix> {
        self.fit(corpus)?;
        self.transform(corpus)
    }

    /// L2-normalised TF-IDF entries of one document, sorted by column
    fn transform_one(&self, document: &str) -> Vec<(usize, f64)> {
        let counts = self.count_terms(document);

        let mut row: Vec<(usize, f64)> = counts
            .into_iter()
            .filter_map(|(term, count)| {
                self.vocabulary
                    .get(&term)
                    .map(|&idx| (idx, count as f64 * self.idf[idx]))
            })
            .collect();
        row.sort_by_key(|(idx, _)| *idx);

        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in row.iter_mut() {
                *value /= norm;
            }
        }
        row
    }

    /// Extract overlapping character n-grams
    fn extract_terms(&self, document: &str) -> Vec<String> {
        let text = if self.config.lowercase {
            document.to_lowercase()
        } else {
            document.to_string()
        };
        let chars: Vec<char> = text.chars().collect();

        let (min_n, max_n) = self.config.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            for window in chars.windows(n) {
                terms.push(window.iter().collect());
            }
        }
        terms
    }

    /// Count term occurrences
    fn count_terms(&self, document: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for term in self.extract_terms(document) {
            *counts.entry(term).or_insert(0) += 1;
        }
        counts
    }

    /// Vocabulary terms in column order
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Vocabulary as a set, independent of column order
    pub fn vocabulary_set(&self) -> HashSet<&str> {
        self.terms.iter().map(String::as_str).collect()
    }

    /// IDF weights in column order
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Column names prefixed for the unified matrix
    pub fn feature_names(&self) -> Vec<String> {
        self.terms.iter().map(|t| format!("ngram:{}", t)).collect()
    }

    /// Check if fitted
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.terms.len()
    }

    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }
}

/// Fit a 3..=5 character n-gram vectorizer over `corpus` and weight it
pub fn create_tfidf_features<S: AsRef<str>>(
    corpus: &[S],
    max_features: usize,
) -> Result<(SparseMatrix, TfidfVectorizer)> {
    let mut vectorizer = TfidfVectorizer::new(TfidfConfig {
        max_features,
        ..Default::default()
    });
    let matrix = vectorizer.fit_transform(corpus)?;
    Ok((matrix, vectorizer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "http://paypal-login-secure.badsite.ru/verify",
            "https://example.com/",
            "http://192.168.1.1/login",
            "https://github.com/torvalds/linux",
        ]
    }

    #[test]
    fn test_vectorizer_creation() {
        let vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        assert!(!vectorizer.is_fitted());
        assert_eq!(vectorizer.vocab_size(), 0);
    }

    #[test]
    fn test_transform_before_fit() {
        let vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let err = vectorizer.transform(&corpus()).unwrap_err();
        assert!(matches!(err, PipelineError::NotFitted { .. }));
    }

    #[test]
    fn test_empty_corpus() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            vectorizer.fit(&empty),
            Err(PipelineError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_ngram_extraction() {
        let vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let terms = vectorizer.extract_terms("ABCDE");
        // 3 trigrams + 2 four-grams + 1 five-gram
        assert_eq!(terms.len(), 6);
        assert!(terms.contains(&"abc".to_string()));
        assert!(terms.contains(&"bcde".to_string()));
        assert!(terms.contains(&"abcde".to_string()));

        assert!(vectorizer.extract_terms("ab").is_empty());
    }

    #[test]
    fn test_fit_transform_shape() {
        let (matrix, vectorizer) = create_tfidf_features(&corpus(), 50).unwrap();
        assert_eq!(matrix.n_rows(), 4);
        assert_eq!(matrix.n_cols(), vectorizer.vocab_size());
        assert!(vectorizer.vocab_size() <= 50);
        assert!(vectorizer.vocab_size() > 0);
        assert!(matrix.nnz() > 0);
    }

    #[test]
    fn test_max_features_cap() {
        let (_, small) = create_tfidf_features(&corpus(), 5).unwrap();
        assert_eq!(small.vocab_size(), 5);

        let (_, large) = create_tfidf_features(&corpus(), 100_000).unwrap();
        assert!(large.vocab_size() > 5);
    }

    #[test]
    fn test_rows_are_l2_normalised() {
        let (matrix, _) = create_tfidf_features(&corpus(), 1000).unwrap();
        for i in 0..matrix.n_rows() {
            let norm: f64 = matrix.row(i).map(|(_, v)| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9, "row {} has norm {}", i, norm);
        }
    }

    #[test]
    fn test_deterministic_vocabulary() {
        let (_, first) = create_tfidf_features(&corpus(), 20).unwrap();
        let (_, second) = create_tfidf_features(&corpus(), 20).unwrap();
        assert_eq!(first.vocabulary_set(), second.vocabulary_set());
        assert_eq!(first.terms(), second.terms());

        let mut reversed = corpus();
        reversed.reverse();
        let (_, third) = create_tfidf_features(&reversed, 20).unwrap();
        assert_eq!(first.vocabulary_set(), third.vocabulary_set());
    }

    #[test]
    fn test_unknown_terms_dropped() {
        let (_, vectorizer) = create_tfidf_features(&corpus(), 1000).unwrap();
        let matrix = vectorizer.transform(&["zzzzzz"]).unwrap();
        assert_eq!(matrix.n_rows(), 1);
        assert_eq!(matrix.row(0).count(), 0);
        assert_eq!(matrix.n_cols(), vectorizer.vocab_size());
    }

    #[test]
    fn test_transform_reuses_fitted_vocabulary() {
        let (fitted, vectorizer) = create_tfidf_features(&corpus(), 1000).unwrap();
        let again = vectorizer.transform(&corpus()).unwrap();
        assert_eq!(fitted, again);
    }

    #[test]
    fn test_sparse_to_dense() {
        let mut matrix = SparseMatrix::new(3);
        matrix.push_row(&[(0, 1.0), (2, 2.0)]);
        matrix.push_row(&[]);
        matrix.push_row(&[(1, 0.0), (1, 0.0)]);

        assert_eq!(matrix.shape(), (3, 3));
        assert_eq!(matrix.nnz(), 2);
        assert_eq!(matrix.get(0, 2), 2.0);
        assert_eq!(matrix.get(1, 0), 0.0);

        let dense = matrix.to_dense();
        assert_eq!(dense[[0, 0]], 1.0);
        assert_eq!(dense[[0, 1]], 0.0);
        assert_eq!(dense[[0, 2]], 2.0);
        assert!(dense.row(2).iter().all(|v| *v == 0.0));
    }
}
