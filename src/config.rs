use crate::error::{PipelineError, Result};
use crate::ml::models::{MetricKind, ModelFamily, TrainingConfig, TuningConfig};
use crate::ml::tfidf::TfidfConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an override config file
pub const CONFIG_PATH_ENV: &str = "BAITDETECTOR_CONFIG";

/// Prefix of environment overrides, e.g. `BAITDETECTOR__DATASET__SIZE=500`
pub const ENV_PREFIX: &str = "BAITDETECTOR";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Dataset cache
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Feature construction
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Train/evaluate defaults
    #[serde(default)]
    pub training: TrainingConfig,

    /// Grid search
    #[serde(default)]
    pub tuning: TuningConfig,

    /// Pipeline wiring
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Observability configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the embedded defaults, an optional file and the environment
    ///
    /// `path` wins over `BAITDETECTOR_CONFIG`; a missing file is an error only
    /// when it was named explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        if let Some(file) = &explicit {
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }

        let config: AppConfig = builder
            // Override with environment variables (prefix: BAITDETECTOR__)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate().map_err(PipelineError::Configuration)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dataset.size < 2 {
            return Err("dataset.size must be at least 2".to_string());
        }

        let tfidf = &self.features.tfidf;
        if tfidf.max_features == 0 {
            return Err("features.tfidf.max_features must be greater than 0".to_string());
        }
        let (min_n, max_n) = tfidf.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(format!(
                "features.tfidf.ngram_range must satisfy 1 <= min <= max, got ({}, {})",
                min_n, max_n
            ));
        }

        self.training
            .split
            .validate()
            .map_err(|e| format!("training.split: {}", e))?;
        self.tuning
            .validate()
            .map_err(|e| format!("tuning: {}", e))?;
        if self.tuning.split != self.training.split {
            return Err("tuning.split must equal training.split".to_string());
        }

        if self.training.random_forest.n_estimators == 0 {
            return Err("training.random_forest.n_estimators must be greater than 0".to_string());
        }
        if self.training.svm.c <= 0.0 {
            return Err("training.svm.c must be positive".to_string());
        }
        let boosting = &self.training.gradient_boosting;
        if boosting.n_estimators == 0 || boosting.max_depth == 0 {
            return Err(
                "training.gradient_boosting needs at least one round of depth 1".to_string(),
            );
        }
        if !(boosting.learning_rate > 0.0 && boosting.learning_rate <= 1.0) {
            return Err("training.gradient_boosting.learning_rate must be in (0, 1]".to_string());
        }

        Ok(())
    }
}

/// Dataset cache location and expected size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON cache of `{ url, label }` records
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,

    /// Number of records the pipeline expects
    #[serde(default = "default_dataset_size")]
    pub size: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            size: default_dataset_size(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub tfidf: TfidfConfig,

    /// Fit the n-gram vocabulary on the training split only
    #[serde(default)]
    pub fit_on_train_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Family handed to the grid search
    #[serde(default = "default_tune_family")]
    pub tune_family: ModelFamily,

    /// Metric used to report the best default-parameter family
    #[serde(default = "default_selection_metric")]
    pub selection_metric: MetricKind,

    /// Where the tuned model is written
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tune_family: default_tune_family(),
            selection_metric: default_selection_metric(),
            model_path: default_model_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("baitdetector_dataset.json")
}

fn default_dataset_size() -> usize {
    2000
}

fn default_tune_family() -> ModelFamily {
    ModelFamily::RandomForest
}

fn default_selection_metric() -> MetricKind {
    MetricKind::F1
}

fn default_model_path() -> PathBuf {
    PathBuf::from("best_baitdetector_model.bin")
}

fn default_log_filter() -> String {
    "baitdetector=info".to_string()
}
