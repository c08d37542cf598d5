/// Phishing URL classification
///
/// This module provides the full modelling pipeline:
/// - Lexical feature extraction from a single URL
/// - Character n-gram TF-IDF statistics over a URL corpus
/// - Feature combination into one dense matrix
/// - Training and evaluation of random forest, SVM and gradient boosting
/// - Grid search with stratified k-fold cross-validation
/// - Model persistence
pub mod boosting;
pub mod classifier;
pub mod combine;
pub mod features;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod split;
pub mod tfidf;
pub mod trainer;
pub mod tuner;

pub use classifier::{Classifier, Estimator, TrainedModel};
pub use combine::{combine, FeatureMatrix};
pub use features::{LexicalExtractor, LexicalFeatures, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
pub use metrics::{ConfusionMatrix, Metrics};
pub use models::{
    Gamma, GradientBoostingParams, Hyperparameters, Label, MetricKind, ModelFamily,
    ModelMetadata, RandomForestParams, SplitConfig, SvmKernel, SvmParams, TrainingConfig,
    TuningConfig, LEGITIMATE, PHISHING,
};
pub use persistence::{BincodeModelStore, ModelStore};
pub use pipeline::{Pipeline, PipelineReport, PreparedFeatures};
pub use tfidf::{create_tfidf_features, SparseMatrix, TfidfConfig, TfidfVectorizer};
pub use trainer::{select_best, train_and_evaluate, FamilyMetrics, FamilyModels};
pub use tuner::{tune, tune_by_name, tune_with_space, SearchResult, SearchSpace};
