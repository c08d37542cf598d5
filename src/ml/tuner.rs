use crate::error::{PipelineError, Result, Stage};
use crate::ml::classifier::TrainedModel;
use crate::ml::metrics::Metrics;
use crate::ml::models::{
    Gamma, GradientBoostingParams, Hyperparameters, Label, ModelFamily, RandomForestParams,
    SvmKernel, SvmParams, TuningConfig,
};
use crate::ml::split::{stratified_k_fold, train_test_split, validate_inputs};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Random forest search grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestGrid {
    pub max_depth: Vec<Option<u16>>,
    pub min_samples_leaf: Vec<usize>,
    pub min_samples_split: Vec<usize>,
    pub n_estimators: Vec<u16>,
}

impl Default for RandomForestGrid {
    fn default() -> Self {
        Self {
            max_depth: vec![Some(10), Some(20), Some(30), None],
            min_samples_leaf: vec![1, 2, 4],
            min_samples_split: vec![2, 5, 10],
            n_estimators: vec![100, 200, 300],
        }
    }
}

/// SVM search grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmGrid {
    pub c: Vec<f64>,
    pub gamma: Vec<Gamma>,
    pub kernel: Vec<SvmKernel>,
}

impl Default for SvmGrid {
    fn default() -> Self {
        Self {
            c: vec![0.1, 1.0, 10.0],
            gamma: vec![Gamma::Scale, Gamma::Auto, Gamma::Value(0.1), Gamma::Value(1.0)],
            kernel: vec![SvmKernel::Rbf, SvmKernel::Linear],
        }
    }
}

/// Gradient boosting search grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingGrid {
    pub learning_rate: Vec<f64>,
    pub max_depth: Vec<u16>,
    pub n_estimators: Vec<usize>,
}

impl Default for GradientBoostingGrid {
    fn default() -> Self {
        Self {
            learning_rate: vec![0.01, 0.1, 0.3],
            max_depth: vec![3, 4, 5],
            n_estimators: vec![100, 200, 300],
        }
    }
}

/// Search space of one family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSpace {
    RandomForest(RandomForestGrid),
    Svm(SvmGrid),
    GradientBoosting(GradientBoostingGrid),
}

impl SearchSpace {
    /// Default grid for a family
    pub fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::RandomForest => SearchSpace::RandomForest(RandomForestGrid::default()),
            ModelFamily::Svm => SearchSpace::Svm(SvmGrid::default()),
            ModelFamily::GradientBoosting => {
                SearchSpace::GradientBoosting(GradientBoostingGrid::default())
            }
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            SearchSpace::RandomForest(_) => ModelFamily::RandomForest,
            SearchSpace::Svm(_) => ModelFamily::Svm,
            SearchSpace::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    /// Enumerate every grid point
    ///
    /// Parameter names are walked alphabetically with the first name varying
    /// slowest. `seed` is handed to seeded estimators.
    pub fn candidates(&self, seed: u64) -> Vec<Hyperparameters> {
        let mut out = Vec::new();
        match self {
            SearchSpace::RandomForest(grid) => {
                for &max_depth in &grid.max_depth {
                    for &min_samples_leaf in &grid.min_samples_leaf {
                        for &min_samples_split in &grid.min_samples_split {
                            for &n_estimators in &grid.n_estimators {
                                out.push(Hyperparameters::RandomForest(RandomForestParams {
                                    n_estimators,
                                    max_depth,
                                    min_samples_split,
                                    min_samples_leaf,
                                    seed,
                                }));
                            }
                        }
                    }
                }
            }
            SearchSpace::Svm(grid) => {
                for &c in &grid.c {
                    for &gamma in &grid.gamma {
                        for &kernel in &grid.kernel {
                            out.push(Hyperparameters::Svm(SvmParams { c, kernel, gamma }));
                        }
                    }
                }
            }
            SearchSpace::GradientBoosting(grid) => {
                for &learning_rate in &grid.learning_rate {
                    for &max_depth in &grid.max_depth {
                        for &n_estimators in &grid.n_estimators {
                            out.push(Hyperparameters::GradientBoosting(GradientBoostingParams {
                                n_estimators,
                                max_depth,
                                learning_rate,
                            }));
                        }
                    }
                }
            }
        }
        out
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        match self {
            SearchSpace::RandomForest(g) => {
                g.max_depth.len()
                    * g.min_samples_leaf.len()
                    * g.min_samples_split.len()
                    * g.n_estimators.len()
            }
            SearchSpace::Svm(g) => g.c.len() * g.gamma.len() * g.kernel.len(),
            SearchSpace::GradientBoosting(g) => {
                g.learning_rate.len() * g.max_depth.len() * g.n_estimators.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cross-validation outcome of one grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: Hyperparameters,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Outcome of a grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub family: ModelFamily,

    /// Winning grid point
    pub best_params: Hyperparameters,

    /// Mean CV score of the winner
    pub best_score: f64,

    /// Every grid point, in enumeration order
    pub cv_results: Vec<CandidateScore>,

    /// Held-out metrics of the winner refit on the full train partition
    pub test_metrics: Metrics,
}

/// Grid search over the default space of `family`
pub fn tune(
    x: &Array2<f64>,
    y: &[Label],
    family: ModelFamily,
    config: &TuningConfig,
) -> Result<(SearchResult, TrainedModel)> {
    tune_with_space(x, y, SearchSpace::for_family(family), config)
}

/// Grid search for a family given by name
pub fn tune_by_name(
    x: &Array2<f64>,
    y: &[Label],
    family: &str,
    config: &TuningConfig,
) -> Result<(SearchResult, TrainedModel)> {
    let family = ModelFamily::parse(family)?;
    tune(x, y, family, config)
}

/// Grid search over an explicit space
pub fn tune_with_space(
    x: &Array2<f64>,
    y: &[Label],
    space: SearchSpace,
    config: &TuningConfig,
) -> Result<(SearchResult, TrainedModel)> {
    validate_inputs(x, y, Stage::Tuning)?;
    config.validate().map_err(PipelineError::Configuration)?;

    let family = space.family();
    let candidates = space.candidates(config.seed);
    if candidates.is_empty() {
        return Err(PipelineError::Tuning(format!(
            "search space for {} is empty",
            family
        )));
    }

    let split = train_test_split(x, y, &config.split).map_err(|e| e.at_stage(Stage::Tuning))?;
    if split.y_train.len() < config.folds {
        return Err(PipelineError::Tuning(format!(
            "{} training rows cannot be split into {} folds",
            split.y_train.len(),
            config.folds
        )));
    }

    let folds: Vec<Fold> = stratified_k_fold(&split.y_train, config.folds)
        .into_iter()
        .map(|(train, validation)| Fold::new(&split.x_train, &split.y_train, &train, &validation))
        .collect();

    info!(
        family = %family,
        candidates = candidates.len(),
        folds = folds.len(),
        scoring = %config.scoring,
        "Starting grid search"
    );
    let start = Instant::now();

    let jobs: Vec<(usize, usize)> = (0..candidates.len())
        .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
        .collect();

    let score_job = |&(c, f): &(usize, usize)| -> Result<f64> {
        let fold = &folds[f];
        let model = TrainedModel::fit(candidates[c], &fold.x_train, &fold.y_train)
            .map_err(|e| fold_failure(&candidates[c], f, e))?;
        let metrics = model
            .evaluate(&fold.x_validation, &fold.y_validation)
            .map_err(|e| fold_failure(&candidates[c], f, e))?;
        Ok(metrics.get(config.scoring))
    };

    // collect keeps job order, so the table and the reported failure are the
    // same in either mode
    let outcomes: Vec<Result<f64>> = if config.parallel {
        jobs.par_iter().map(score_job).collect()
    } else {
        jobs.iter().map(score_job).collect()
    };
    let scores: Vec<f64> = outcomes.into_iter().collect::<Result<_>>()?;

    let cv_results: Vec<CandidateScore> = candidates
        .iter()
        .zip(scores.chunks(folds.len()))
        .map(|(params, fold_scores)| CandidateScore {
            params: *params,
            fold_scores: fold_scores.to_vec(),
            mean_score: fold_scores.iter().sum::<f64>() / fold_scores.len() as f64,
        })
        .collect();

    for candidate in &cv_results {
        debug!(params = %candidate.params, mean = candidate.mean_score, "Candidate scored");
    }

    let best = select_candidate(&cv_results)
        .ok_or_else(|| PipelineError::Tuning("no candidate was scored".to_string()))?;

    let model = TrainedModel::fit(best.params, &split.x_train, &split.y_train)
        .map_err(|e| e.at_stage(Stage::Tuning))?;
    let test_metrics = model
        .evaluate(&split.x_test, &split.y_test)
        .map_err(|e| e.at_stage(Stage::Tuning))?;

    info!(
        family = %family,
        best_params = %best.params,
        best_score = best.mean_score,
        test_f1 = test_metrics.f1,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Grid search complete"
    );

    let result = SearchResult {
        family,
        best_params: best.params,
        best_score: best.mean_score,
        test_metrics,
        cv_results,
    };
    Ok((result, model))
}

/// Highest mean score; the earliest candidate wins ties
fn select_candidate(cv_results: &[CandidateScore]) -> Option<CandidateScore> {
    let mut best: Option<&CandidateScore> = None;
    for candidate in cv_results {
        match best {
            Some(current) if candidate.mean_score <= current.mean_score => {}
            _ => best = Some(candidate),
        }
    }
    best.cloned()
}

fn fold_failure(params: &Hyperparameters, fold: usize, cause: PipelineError) -> PipelineError {
    PipelineError::Tuning(format!("fold {} failed for {}: {}", fold, params, cause))
}

/// Materialised rows of one CV fold
struct Fold {
    x_train: Array2<f64>,
    y_train: Vec<Label>,
    x_validation: Array2<f64>,
    y_validation: Vec<Label>,
}

impl Fold {
    fn new(x: &Array2<f64>, y: &[Label], train: &[usize], validation: &[usize]) -> Self {
        Self {
            x_train: x.select(Axis(0), train),
            y_train: train.iter().map(|&i| y[i]).collect(),
            x_validation: x.select(Axis(0), validation),
            y_validation: validation.iter().map(|&i| y[i]).collect(),
        }
    }
}
