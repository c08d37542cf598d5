//! BaitDetector: phishing URL classification.
//!
//! Lexical URL features and character n-gram TF-IDF statistics feed three
//! classifier families (random forest, SVM, gradient boosting), which are
//! trained, evaluated and tuned with grid search before the winner is saved.

pub mod config;
pub mod dataset;
pub mod error;
pub mod ml;

pub use config::AppConfig;
pub use dataset::{Dataset, DatasetProvider, JsonDatasetStore, UrlRecord};
pub use error::{PipelineError, Result, Stage};
