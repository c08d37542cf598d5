use crate::config::AppConfig;
use crate::dataset::{Dataset, DatasetProvider};
use crate::error::{PipelineError, Result, Stage};
use crate::ml::combine::{combine, FeatureMatrix};
use crate::ml::features::LexicalExtractor;
use crate::ml::models::{Label, ModelFamily};
use crate::ml::persistence::ModelStore;
use crate::ml::split::train_test_indices;
use crate::ml::tfidf::TfidfVectorizer;
use crate::ml::trainer::{select_best, train_and_evaluate, FamilyMetrics, FamilyModels};
use crate::ml::tuner::{tune, SearchResult};
use crate::ml::TrainedModel;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Features built from a dataset, plus the fitted vectorizer
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub matrix: FeatureMatrix,
    pub labels: Vec<Label>,
    pub vectorizer: TfidfVectorizer,
}

/// Summary of a full pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub n_samples: usize,
    pub n_features: usize,
    pub vocabulary_size: usize,

    /// Held-out metrics of every family at default hyperparameters
    pub family_metrics: FamilyMetrics,

    /// Best default-parameter family under the configured metric
    pub best_default: Option<(ModelFamily, f64)>,

    /// Grid search outcome for the configured family
    pub search: SearchResult,

    /// Where the tuned model was written
    pub model_path: PathBuf,
}

/// Dataset → features → train/evaluate → tune → persist
pub struct Pipeline {
    config: AppConfig,
    extractor: LexicalExtractor,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            extractor: LexicalExtractor::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Lexical and n-gram blocks combined into one matrix
    pub fn prepare_features(&self, dataset: &Dataset) -> Result<PreparedFeatures> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset {
                stage: Stage::Dataset,
            });
        }
        dataset.validate()?;

        let urls = dataset.urls();
        let start = Instant::now();
        let lexical = self.extractor.extract_matrix(&urls);

        let mut vectorizer = TfidfVectorizer::new(self.config.features.tfidf.clone());
        let tfidf = if self.config.features.fit_on_train_only {
            let split = train_test_indices(urls.len(), &self.config.training.split);
            let train_corpus: Vec<&str> = split.train.iter().map(|&i| urls[i]).collect();
            vectorizer.fit(&train_corpus)?;
            vectorizer.transform(&urls)?
        } else {
            vectorizer.fit_transform(&urls)?
        };

        let matrix = combine(
            &lexical,
            &tfidf,
            &self.extractor.feature_names(),
            &vectorizer.feature_names(),
        )?;

        info!(
            rows = matrix.n_samples(),
            lexical = matrix.n_lexical,
            ngrams = vectorizer.vocab_size(),
            nnz = tfidf.nnz(),
            train_only_vocabulary = self.config.features.fit_on_train_only,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Features built"
        );

        Ok(PreparedFeatures {
            matrix,
            labels: dataset.labels(),
            vectorizer,
        })
    }

    /// Every family at default hyperparameters
    pub fn evaluate(&self, features: &PreparedFeatures) -> Result<(FamilyMetrics, FamilyModels)> {
        train_and_evaluate(&features.matrix.values, &features.labels, &self.config.training)
    }

    /// Grid search for the configured family
    pub fn tune(&self, features: &PreparedFeatures) -> Result<(SearchResult, TrainedModel)> {
        tune(
            &features.matrix.values,
            &features.labels,
            self.config.pipeline.tune_family,
            &self.config.tuning,
        )
    }

    /// Run every stage and persist the tuned model
    pub fn run(
        &self,
        provider: &dyn DatasetProvider,
        store: &dyn ModelStore,
    ) -> Result<PipelineReport> {
        let start = Instant::now();
        info!(size = self.config.dataset.size, "Fetching dataset");
        let dataset = provider.get_dataset(self.config.dataset.size)?;

        let (phishing, legitimate) = dataset.class_counts();
        if phishing == 0 || legitimate == 0 {
            warn!(phishing, legitimate, "Dataset contains a single class");
        }

        let features = self.prepare_features(&dataset)?;

        let (family_metrics, _) = self.evaluate(&features)?;
        let best_default = select_best(&family_metrics, self.config.pipeline.selection_metric);
        if let Some((family, score)) = best_default {
            info!(
                family = %family,
                metric = %self.config.pipeline.selection_metric,
                score,
                "Best family at default hyperparameters"
            );
        }

        let (search, model) = self.tune(&features)?;
        store.save(&model, &self.config.pipeline.model_path)?;

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            model_path = %self.config.pipeline.model_path.display(),
            "Pipeline completed"
        );

        Ok(PipelineReport {
            n_samples: features.matrix.n_samples(),
            n_features: features.matrix.n_features(),
            vocabulary_size: features.vectorizer.vocab_size(),
            family_metrics,
            best_default,
            search,
            model_path: self.config.pipeline.model_path.clone(),
        })
    }
}
