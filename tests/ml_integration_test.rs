/// Integration tests for the URL classification pipeline
///
/// These tests verify the complete flow:
/// - Lexical feature extraction, including malformed input
/// - N-gram vocabulary determinism
/// - Feature combination
/// - Training and evaluation of every family
/// - Grid search selection
/// - Dataset and model files on disk

use baitdetector::{
    config::AppConfig,
    dataset::{Dataset, JsonDatasetStore, UrlRecord},
    ml::{
        combine, create_tfidf_features, train_and_evaluate, tune_by_name, tune_with_space,
        BincodeModelStore, GradientBoostingParams, Label, LexicalExtractor, ModelFamily,
        ModelStore, Pipeline, RandomForestParams, SearchSpace, TrainingConfig, TuningConfig,
        FEATURE_NAMES,
    },
    PipelineError,
};
use ndarray::Array2;

mod common;

const SCENARIO_URLS: [&str; 4] = [
    "http://paypal-login-secure.badsite.ru/verify",
    "https://example.com/",
    "http://192.168.1.1/login",
    "https://github.com/torvalds/linux",
];

const SCENARIO_LABELS: [Label; 4] = [1, 0, 1, 0];

fn feature(values: &[f64], name: &str) -> f64 {
    let idx = FEATURE_NAMES.iter().position(|&n| n == name).unwrap();
    values[idx]
}

fn fast_training_config() -> TrainingConfig {
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
fn test_four_url_scenario() {
    let extractor = LexicalExtractor::new();
    let lexical = extractor.extract_matrix(&SCENARIO_URLS);
    assert_eq!(lexical.nrows(), 4);

    for (i, row) in lexical.rows().into_iter().enumerate() {
        let values = row.to_vec();
        let expected_ip = if i == 2 { 1.0 } else { 0.0 };
        assert_eq!(feature(&values, "has_ip_pattern"), expected_ip, "row {}", i);
    }
    assert!(feature(&lexical.row(0).to_vec(), "count_suspicious") >= 2.0);

    let (tfidf, vectorizer) = create_tfidf_features(&SCENARIO_URLS, 1000).unwrap();
    let combined = combine(
        &lexical,
        &tfidf,
        &extractor.feature_names(),
        &vectorizer.feature_names(),
    )
    .unwrap();
    assert_eq!(combined.n_samples(), 4);
    assert_eq!(
        combined.n_features(),
        FEATURE_NAMES.len() + vectorizer.vocab_size()
    );

    let (results, models) =
        train_and_evaluate(&combined.values, &SCENARIO_LABELS, &fast_training_config()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(models.len(), 3);
}

#[test]
fn test_https_and_parameters_properties() {
    let extractor = LexicalExtractor::new();
    let cases = [
        ("https://example.com/a?x=1&y=2", 1.0, 2.0),
        ("http://example.com/a", 0.0, 0.0),
        ("HTTPS://example.com/?", 1.0, 0.0),
        ("ftp://example.com/file", 0.0, 0.0),
        ("https://example.com/search?q=phish", 1.0, 1.0),
    ];

    for (url, https, params) in cases {
        let values = extractor.extract(url).to_vec();
        assert_eq!(feature(&values, "has_https"), https, "{}", url);
        assert_eq!(feature(&values, "num_parameters"), params, "{}", url);
    }
}

#[test]
fn test_malformed_urls_yield_zero_vectors() {
    let extractor = LexicalExtractor::new();
    for url in ["", "not a url", "://missing-scheme", "http://"] {
        let values = extractor.extract(url).to_vec();
        assert_eq!(values.len(), FEATURE_NAMES.len());
        assert!(values.iter().all(|&v| v == 0.0), "{} -> {:?}", url, values);
        assert!(extractor.try_extract(url).is_err());
    }
}

#[test]
fn test_vocabulary_is_deterministic() {
    let corpus = common::labeled_urls(40);
    let urls: Vec<&str> = corpus.iter().map(|(u, _)| u.as_str()).collect();

    let (first_matrix, first) = create_tfidf_features(&urls, 200).unwrap();
    let mut reversed = urls.clone();
    reversed.reverse();
    let (_, second) = create_tfidf_features(&reversed, 200).unwrap();
    let (third_matrix, third) = create_tfidf_features(&urls, 200).unwrap();

    assert_eq!(first.vocabulary_set(), second.vocabulary_set());
    assert_eq!(first.terms(), third.terms());
    assert_eq!(first_matrix, third_matrix);
}

#[test]
fn test_combine_rejects_mismatched_rows() {
    let extractor = LexicalExtractor::new();
    let lexical = extractor.extract_matrix(&SCENARIO_URLS);
    let (tfidf, _) = create_tfidf_features(&SCENARIO_URLS[..3], 100).unwrap();

    let err = combine(&lexical, &tfidf, &[], &[]).unwrap_err();
    assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
}

#[test]
fn test_training_metrics_bounded_and_repeatable() {
    let corpus = common::labeled_urls(60);
    let urls: Vec<&str> = corpus.iter().map(|(u, _)| u.as_str()).collect();
    let labels: Vec<Label> = corpus.iter().map(|&(_, l)| l).collect();

    let extractor = LexicalExtractor::new();
    let (tfidf, vectorizer) = create_tfidf_features(&urls, 100).unwrap();
    let x = combine(
        &extractor.extract_matrix(&urls),
        &tfidf,
        &extractor.feature_names(),
        &vectorizer.feature_names(),
    )
    .unwrap()
    .values;

    let config = fast_training_config();
    let (first, _) = train_and_evaluate(&x, &labels, &config).unwrap();
    let (second, _) = train_and_evaluate(&x, &labels, &config).unwrap();

    for metrics in first.values() {
        for (_, value) in metrics.as_pairs() {
            assert!((0.0..=1.0).contains(&value));
        }
    }
    assert_eq!(first, second);
}

#[test]
fn test_tuner_best_dominates_grid() {
    let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i % 2) * 3 + (i * 3 + j) % 4) as f64);
    let y: Vec<Label> = (0..40).map(|i| (i % 2) as Label).collect();

    let space = SearchSpace::GradientBoosting(baitdetector::ml::tuner::GradientBoostingGrid {
        learning_rate: vec![0.1, 0.3],
        max_depth: vec![2, 3],
        n_estimators: vec![5, 10],
    });
    let config = TuningConfig {
        folds: 3,
        ..Default::default()
    };

    let (result, _) = tune_with_space(&x, &y, space, &config).unwrap();
    assert_eq!(result.cv_results.len(), 8);
    assert!(result
        .cv_results
        .iter()
        .all(|c| result.best_score >= c.mean_score));

    let err = tune_by_name(&x, &y, "LogisticRegression", &config).unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFamily(_)));
}

#[test]
fn test_pipeline_from_dataset_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let dataset_path = dir.path().join("dataset.json");
    let model_path = dir.path().join("model.bin");

    let records = common::labeled_urls(24)
        .into_iter()
        .map(|(url, label)| UrlRecord::new(url, label))
        .collect();
    let store = JsonDatasetStore::new(&dataset_path);
    store.save(&Dataset::new(records)).unwrap();

    let mut config = AppConfig::default();
    config.dataset.path = dataset_path;
    config.dataset.size = 24;
    config.features.tfidf.max_features = 60;
    config.training = fast_training_config();
    config.tuning.folds = 2;
    config.pipeline.tune_family = ModelFamily::Svm;
    config.pipeline.model_path = model_path.clone();

    let report = Pipeline::new(config)
        .run(&store, &BincodeModelStore::new())
        .unwrap();
    assert_eq!(report.n_samples, 24);
    assert_eq!(report.search.family, ModelFamily::Svm);

    let model = BincodeModelStore::new().load(&model_path).unwrap();
    assert_eq!(model.metadata.n_features, report.n_features);
    assert_eq!(model.hyperparameters(), &report.search.best_params);
}
