use crate::error::{PipelineError, Result};
use crate::ml::boosting::GradientBoostedTrees;
use crate::ml::features::FEATURE_SCHEMA_VERSION;
use crate::ml::metrics::Metrics;
use crate::ml::models::{
    GradientBoostingParams, Hyperparameters, Label, ModelFamily, ModelMetadata,
    RandomForestParams, SvmKernel, SvmParams, LEGITIMATE, PHISHING,
};
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

/// Trait for binary URL classifiers
pub trait Classifier: Send + Sync {
    /// Fit on a feature matrix and 0/1 labels
    fn fit(&mut self, features: &Array2<f64>, labels: &[Label]) -> Result<()>;

    /// Predict 0/1 labels
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Label>>;

    /// Get model family
    fn family(&self) -> ModelFamily;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

/// Both classes must be present for any family to fit
fn ensure_two_classes(family: ModelFamily, labels: &[Label]) -> Result<()> {
    let positives = labels.iter().filter(|&&l| l == PHISHING).count();
    let negatives = labels.iter().filter(|&&l| l == LEGITIMATE).count();
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::training(
            family,
            format!(
                "training labels contain a single class ({} phishing, {} legitimate)",
                positives, negatives
            ),
        ));
    }
    if positives + negatives != labels.len() {
        return Err(PipelineError::training(family, "labels must be 0 or 1"));
    }
    Ok(())
}

fn ensure_aligned(family: ModelFamily, features: &Array2<f64>, labels: &[Label]) -> Result<()> {
    if features.nrows() != labels.len() {
        return Err(PipelineError::training(
            family,
            format!(
                "{} feature rows for {} labels",
                features.nrows(),
                labels.len()
            ),
        ));
    }
    Ok(())
}

/// Random forest classifier backed by smartcore
#[derive(Serialize, Deserialize)]
pub struct RandomForestModel {
    /// Hyperparameters
    params: RandomForestParams,

    /// Trained model
    model: Option<RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>>,
}

impl RandomForestModel {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    fn parameters(&self) -> RandomForestClassifierParameters {
        let params = RandomForestClassifierParameters::default()
            .with_n_trees(self.params.n_estimators)
            .with_min_samples_split(self.params.min_samples_split)
            .with_min_samples_leaf(self.params.min_samples_leaf)
            .with_seed(self.params.seed);
        match self.params.max_depth {
            Some(depth) => params.with_max_depth(depth),
            None => params,
        }
    }
}

impl Classifier for RandomForestModel {
    fn fit(&mut self, features: &Array2<f64>, labels: &[Label]) -> Result<()> {
        ensure_aligned(self.family(), features, labels)?;
        ensure_two_classes(self.family(), labels)?;

        let x = ndarray_to_densematrix(features);
        let y: Vec<i32> = labels.iter().map(|&l| i32::from(l)).collect();

        let model = RandomForestClassifier::fit(&x, &y, self.parameters())
            .map_err(|e| PipelineError::training(self.family(), e))?;

        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Label>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PipelineError::training(self.family(), "model not trained"))?;

        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| PipelineError::training(self.family(), format!("prediction failed: {}", e)))?;

        Ok(predictions
            .iter()
            .map(|&p| if p == i32::from(PHISHING) { PHISHING } else { LEGITIMATE })
            .collect())
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::RandomForest
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Support vector classifier backed by linfa-svm
#[derive(Serialize, Deserialize)]
pub struct SvmModel {
    /// Hyperparameters
    params: SvmParams,

    /// Gamma resolved against the training matrix
    resolved_gamma: Option<f64>,

    /// Trained model
    model: Option<Svm<f64, bool>>,
}

impl SvmModel {
    pub fn new(params: SvmParams) -> Self {
        Self {
            params,
            resolved_gamma: None,
            model: None,
        }
    }

    /// Resolved RBF coefficient, once trained
    pub fn gamma(&self) -> Option<f64> {
        self.resolved_gamma
    }

    fn variance(features: &Array2<f64>) -> f64 {
        let n = features.len();
        if n == 0 {
            return 0.0;
        }
        let mean = features.sum() / n as f64;
        features.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64
    }
}

impl Classifier for SvmModel {
    fn fit(&mut self, features: &Array2<f64>, labels: &[Label]) -> Result<()> {
        ensure_aligned(self.family(), features, labels)?;
        ensure_two_classes(self.family(), labels)?;

        let gamma = self
            .params
            .gamma
            .resolve(features.ncols(), Self::variance(features));
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(PipelineError::training(
                self.family(),
                format!("gamma must be positive, got {}", gamma),
            ));
        }

        let targets: Array1<bool> = labels.iter().map(|&l| l == PHISHING).collect();
        let dataset = Dataset::new(features.clone(), targets);

        let params = Svm::<f64, bool>::params().pos_neg_weights(self.params.c, self.params.c);
        let params = match self.params.kernel {
            // linfa's gaussian kernel is exp(-|x - y|^2 / eps)
            SvmKernel::Rbf => params.gaussian_kernel(1.0 / gamma),
            SvmKernel::Linear => params.linear_kernel(),
        };

        let model = params
            .fit(&dataset)
            .map_err(|e| PipelineError::training(self.family(), e))?;

        self.resolved_gamma = Some(gamma);
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Label>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PipelineError::training(self.family(), "model not trained"))?;

        let predictions: Array1<bool> = model.predict(features);
        Ok(predictions.iter().map(|&p| u8::from(p)).collect())
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Svm
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Gradient-boosted tree classifier
#[derive(Serialize, Deserialize)]
pub struct GradientBoostingModel {
    /// Hyperparameters
    params: GradientBoostingParams,

    /// Trained ensemble
    model: Option<GradientBoostedTrees>,
}

impl GradientBoostingModel {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            model: None,
        }
    }
}

impl Classifier for GradientBoostingModel {
    fn fit(&mut self, features: &Array2<f64>, labels: &[Label]) -> Result<()> {
        ensure_aligned(self.family(), features, labels)?;
        ensure_two_classes(self.family(), labels)?;

        self.model = Some(GradientBoostedTrees::fit(features, labels, &self.params)?);
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Label>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PipelineError::training(self.family(), "model not trained"))?;
        Ok(model.predict(features))
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::GradientBoosting
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// One estimator of any supported family
#[derive(Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(RandomForestModel),
    Svm(SvmModel),
    GradientBoosting(GradientBoostingModel),
}

impl Estimator {
    /// Unfitted estimator for a hyperparameter set
    pub fn new(hyperparameters: &Hyperparameters) -> Self {
        match *hyperparameters {
            Hyperparameters::RandomForest(p) => Estimator::RandomForest(RandomForestModel::new(p)),
            Hyperparameters::Svm(p) => Estimator::Svm(SvmModel::new(p)),
            Hyperparameters::GradientBoosting(p) => {
                Estimator::GradientBoosting(GradientBoostingModel::new(p))
            }
        }
    }

    pub fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::Svm(m) => m,
            Estimator::GradientBoosting(m) => m,
        }
    }

    pub fn as_classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::Svm(m) => m,
            Estimator::GradientBoosting(m) => m,
        }
    }
}

impl fmt::Debug for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classifier = self.as_classifier();
        f.debug_struct("Estimator")
            .field("family", &classifier.family())
            .field("trained", &classifier.is_trained())
            .finish()
    }
}

/// A fitted classifier plus the configuration it was trained with
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Model metadata
    pub metadata: ModelMetadata,

    estimator: Estimator,
}

impl TrainedModel {
    /// Fit a fresh estimator of the family described by `hyperparameters`
    pub fn fit(
        hyperparameters: Hyperparameters,
        features: &Array2<f64>,
        labels: &[Label],
    ) -> Result<Self> {
        let mut estimator = Estimator::new(&hyperparameters);
        estimator.as_classifier_mut().fit(features, labels)?;

        Ok(Self {
            metadata: ModelMetadata {
                family: hyperparameters.family(),
                hyperparameters,
                feature_schema_version: FEATURE_SCHEMA_VERSION,
                n_features: features.ncols(),
                n_training_samples: features.nrows(),
                trained_at: chrono::Utc::now(),
            },
            estimator,
        })
    }

    /// Predict 0/1 labels for rows of `features`
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<Label>> {
        if features.ncols() != self.metadata.n_features {
            return Err(PipelineError::training(
                self.metadata.family,
                format!(
                    "model expects {} features, got {}",
                    self.metadata.n_features,
                    features.ncols()
                ),
            ));
        }
        self.estimator.as_classifier().predict(features)
    }

    /// Score against held-out labels
    pub fn evaluate(&self, features: &Array2<f64>, labels: &[Label]) -> Result<Metrics> {
        let predictions = self.predict(features)?;
        Ok(Metrics::calculate(labels, &predictions))
    }

    pub fn family(&self) -> ModelFamily {
        self.metadata.family
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.metadata.hyperparameters
    }
}
