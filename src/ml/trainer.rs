use crate::error::{PipelineError, Result, Stage};
use crate::ml::classifier::TrainedModel;
use crate::ml::metrics::Metrics;
use crate::ml::models::{Label, MetricKind, ModelFamily, TrainingConfig};
use crate::ml::split::{train_test_split, validate_inputs};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Held-out metrics per family
pub type FamilyMetrics = BTreeMap<ModelFamily, Metrics>;

/// Fitted model per family
pub type FamilyModels = BTreeMap<ModelFamily, TrainedModel>;

/// Fit every family on one shared split and score each on the test partition
///
/// Any family failing to fit aborts the whole run.
pub fn train_and_evaluate(
    x: &Array2<f64>,
    y: &[Label],
    config: &TrainingConfig,
) -> Result<(FamilyMetrics, FamilyModels)> {
    validate_inputs(x, y, Stage::Training)?;
    config
        .split
        .validate()
        .map_err(PipelineError::Configuration)?;

    let split = train_test_split(x, y, &config.split)?;
    info!(
        train_rows = split.y_train.len(),
        test_rows = split.y_test.len(),
        n_features = x.ncols(),
        "Training all model families"
    );

    let mut results = FamilyMetrics::new();
    let mut models = FamilyModels::new();

    for family in ModelFamily::all() {
        let hyperparameters = config.hyperparameters_for(family);
        debug!(%hyperparameters, "Fitting {}", family.display_name());

        let start = Instant::now();
        let model = TrainedModel::fit(hyperparameters, &split.x_train, &split.y_train)?;
        let metrics = model.evaluate(&split.x_test, &split.y_test)?;

        info!(
            family = %family,
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model evaluated"
        );

        results.insert(family, metrics);
        models.insert(family, model);
    }

    Ok((results, models))
}

/// Family with the highest value of `metric`; ties go to the earlier family
pub fn select_best(results: &FamilyMetrics, metric: MetricKind) -> Option<(ModelFamily, f64)> {
    let mut best: Option<(ModelFamily, f64)> = None;
    for (&family, metrics) in results {
        let score = metrics.get(metric);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((family, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{GradientBoostingParams, RandomForestParams};

    fn create_test_dataset(n_samples: usize) -> (Array2<f64>, Vec<Label>) {
        let x = Array2::from_shape_fn((n_samples, 4), |(i, j)| {
            let label = (i % 2) as f64;
            label * 3.0 + ((i * 7 + j * 3) % 5) as f64 * 0.2
        });
        let y = (0..n_samples).map(|i| (i % 2) as Label).collect();
        (x, y)
    }

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            random_forest: RandomForestParams {
                n_estimators: 10,
                ..Default::default()
            },
            gradient_boosting: GradientBoostingParams {
                n_estimators: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_train_all_families() {
        let (x, y) = create_test_dataset(60);
        let (results, models) = train_and_evaluate(&x, &y, &fast_config()).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(models.len(), 3);
        for (family, metrics) in &results {
            for (name, value) in metrics.as_pairs() {
                assert!(
                    (0.0..=1.0).contains(&value),
                    "{} {} out of range: {}",
                    family,
                    name,
                    value
                );
            }
            assert_eq!(metrics.confusion.total(), 12);
            assert_eq!(models[family].metadata.n_training_samples, 48);
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = create_test_dataset(50);
        let config = fast_config();

        let (first, _) = train_and_evaluate(&x, &y, &config).unwrap();
        let (second, _) = train_and_evaluate(&x, &y, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_inputs() {
        let (x, y) = create_test_dataset(10);
        let config = fast_config();

        assert!(matches!(
            train_and_evaluate(&x, &y[..9], &config),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            train_and_evaluate(&Array2::zeros((0, 4)), &[], &config),
            Err(PipelineError::EmptyDataset { .. })
        ));

        let mut bad_labels = y.clone();
        bad_labels[3] = 7;
        assert!(matches!(
            train_and_evaluate(&x, &bad_labels, &config),
            Err(PipelineError::InvalidLabel { row: 3, .. })
        ));
    }

    #[test]
    fn test_single_class_train_partition_fails() {
        let (x, _) = create_test_dataset(10);
        let y = vec![0; 10];

        let err = train_and_evaluate(&x, &y, &fast_config()).unwrap_err();
        assert_eq!(err.stage(), Stage::Training);
        assert_eq!(err.error_code(), "TRAINING_ERROR");
    }

    #[test]
    fn test_select_best() {
        let perfect = Metrics::calculate(&[1, 0, 1, 0], &[1, 0, 1, 0]);
        let poor = Metrics::calculate(&[1, 0, 1, 0], &[0, 0, 1, 1]);

        let mut results = FamilyMetrics::new();
        results.insert(ModelFamily::RandomForest, poor);
        results.insert(ModelFamily::Svm, perfect);
        results.insert(ModelFamily::GradientBoosting, perfect);

        assert_eq!(
            select_best(&results, MetricKind::F1),
            Some((ModelFamily::Svm, 1.0))
        );
        assert_eq!(select_best(&FamilyMetrics::new(), MetricKind::F1), None);
    }
}
