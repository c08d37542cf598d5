use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Binary class label: 0 = legitimate, 1 = phishing
pub type Label = u8;

/// Legitimate URL label
pub const LEGITIMATE: Label = 0;

/// Phishing URL label
pub const PHISHING: Label = 1;

/// Supported classifier families
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum ModelFamily {
    /// Bagged decision tree ensemble
    #[strum(to_string = "RandomForest", serialize = "random_forest", serialize = "rf")]
    RandomForest,

    /// Kernel maximum-margin classifier
    #[strum(to_string = "SVM", serialize = "svc", serialize = "support_vector_machine")]
    Svm,

    /// Gradient-boosted tree ensemble
    #[strum(
        to_string = "GradientBoosting",
        serialize = "gradient_boosting",
        serialize = "xgboost",
        serialize = "gbt"
    )]
    GradientBoosting,
}

impl ModelFamily {
    /// Parse a family name, failing closed on anything outside the supported set
    pub fn parse(name: &str) -> Result<Self> {
        ModelFamily::from_str(name.trim())
            .map_err(|_| PipelineError::UnsupportedFamily(name.to_string()))
    }

    /// All families in canonical order
    pub fn all() -> Vec<ModelFamily> {
        ModelFamily::iter().collect()
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::Svm => "Support Vector Machine",
            ModelFamily::GradientBoosting => "Gradient Boosting",
        }
    }
}

/// Train/test split configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows held out for testing (0.0 - 1.0, exclusive)
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for the shuffling permutation
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_seed(),
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err("test_size must be strictly between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

/// Random forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub n_estimators: u16,
    /// `None` grows trees until leaves are pure
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: default_seed(),
        }
    }
}

/// SVM kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvmKernel {
    /// Radial basis function
    Rbf,
    Linear,
}

/// RBF kernel coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// 1 / (n_features * var(X))
    Scale,
    /// 1 / n_features
    Auto,
    Value(f64),
}

impl Gamma {
    /// Resolve to a numeric coefficient against the training matrix
    pub fn resolve(&self, n_features: usize, variance: f64) -> f64 {
        let n = n_features.max(1) as f64;
        match self {
            Gamma::Scale => {
                if variance > 0.0 {
                    1.0 / (n * variance)
                } else {
                    1.0
                }
            }
            Gamma::Auto => 1.0 / n,
            Gamma::Value(v) => *v,
        }
    }
}

impl fmt::Display for Gamma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gamma::Scale => write!(f, "scale"),
            Gamma::Auto => write!(f, "auto"),
            Gamma::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Support vector machine hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    /// Penalty C
    pub c: f64,
    pub kernel: SvmKernel,
    pub gamma: Gamma,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: SvmKernel::Rbf,
            gamma: Gamma::Scale,
        }
    }
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub max_depth: u16,
    pub learning_rate: f64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.3,
        }
    }
}

/// Hyperparameters of one family, tagged by family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hyperparameters {
    RandomForest(RandomForestParams),
    Svm(SvmParams),
    GradientBoosting(GradientBoostingParams),
}

impl Hyperparameters {
    pub fn family(&self) -> ModelFamily {
        match self {
            Hyperparameters::RandomForest(_) => ModelFamily::RandomForest,
            Hyperparameters::Svm(_) => ModelFamily::Svm,
            Hyperparameters::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    /// Parameter name -> value, for reporting
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        match self {
            Hyperparameters::RandomForest(p) => {
                map.insert("n_estimators".to_string(), p.n_estimators.to_string());
                map.insert(
                    "max_depth".to_string(),
                    p.max_depth
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "None".to_string()),
                );
                map.insert(
                    "min_samples_split".to_string(),
                    p.min_samples_split.to_string(),
                );
                map.insert("min_samples_leaf".to_string(), p.min_samples_leaf.to_string());
            }
            Hyperparameters::Svm(p) => {
                map.insert("C".to_string(), p.c.to_string());
                map.insert(
                    "kernel".to_string(),
                    match p.kernel {
                        SvmKernel::Rbf => "rbf".to_string(),
                        SvmKernel::Linear => "linear".to_string(),
                    },
                );
                map.insert("gamma".to_string(), p.gamma.to_string());
            }
            Hyperparameters::GradientBoosting(p) => {
                map.insert("n_estimators".to_string(), p.n_estimators.to_string());
                map.insert("max_depth".to_string(), p.max_depth.to_string());
                map.insert("learning_rate".to_string(), p.learning_rate.to_string());
            }
        }
        map
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}({})", self.family(), parts.join(", "))
    }
}

/// Trainer configuration: split and per-family default hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainingConfig {
    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub random_forest: RandomForestParams,

    #[serde(default)]
    pub svm: SvmParams,

    #[serde(default)]
    pub gradient_boosting: GradientBoostingParams,
}

impl TrainingConfig {
    /// Default hyperparameters for a family
    pub fn hyperparameters_for(&self, family: ModelFamily) -> Hyperparameters {
        match family {
            ModelFamily::RandomForest => Hyperparameters::RandomForest(self.random_forest),
            ModelFamily::Svm => Hyperparameters::Svm(self.svm),
            ModelFamily::GradientBoosting => {
                Hyperparameters::GradientBoosting(self.gradient_boosting)
            }
        }
    }
}

/// Metric used to rank models
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MetricKind {
    Accuracy,
    Precision,
    Recall,
    F1,
}

/// Tuner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Must match the trainer's split for comparable results
    #[serde(default)]
    pub split: SplitConfig,

    /// Cross-validation folds
    #[serde(default = "default_folds")]
    pub folds: usize,

    /// Metric maximised by the search
    #[serde(default = "default_scoring")]
    pub scoring: MetricKind,

    /// Evaluate candidates on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Seed handed to seeded estimators in every candidate
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            split: SplitConfig::default(),
            folds: default_folds(),
            scoring: default_scoring(),
            parallel: default_parallel(),
            seed: default_seed(),
        }
    }
}

impl TuningConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.split.validate()?;
        if self.folds < 2 {
            return Err("folds must be at least 2".to_string());
        }
        Ok(())
    }
}

/// Metadata recorded alongside a fitted estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model family
    pub family: ModelFamily,

    /// Hyperparameters the estimator was fitted with
    pub hyperparameters: Hyperparameters,

    /// Lexical feature schema version the model expects
    pub feature_schema_version: u32,

    /// Number of input columns
    pub n_features: usize,

    /// Number of training rows
    pub n_training_samples: usize,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_folds() -> usize {
    5
}

fn default_scoring() -> MetricKind {
    MetricKind::F1
}

fn default_parallel() -> bool {
    true
}
