//! Model training & selection
//!
//! For each wager target a fixed roster of candidate algorithms is trained
//! on a stratified split, evaluated, and either the best candidate or a
//! voting ensemble of all survivors is persisted as an immutable artifact.
//!
//! One failing candidate is logged and skipped; one failing target never
//! aborts the others.

pub mod algorithms;
pub mod metrics;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SelectionStrategy, TrainingConfig, VotingStrategy};
use crate::error::{Error, Result};
use crate::features::select::{score_feature, FeatureScore, TargetView};
use crate::features::{PreparedDataset, TargetColumn};
use crate::store::ModelStore;
use algorithms::{
    FittedClassifier, FittedRegressor, GaussianNb, GradientHyper, KnnClassifier, KnnRegressor,
    LinearRegression, LogisticRegression, RidgeRegression, VotingEnsemble,
};
use metrics::{classification_metrics, regression_metrics, EvaluationMetrics};

/// Cooperative cancellation for long-running training runs. Checked
/// between candidate fits and between hyperparameter grid points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run controls: cancellation plus an optional wall-clock deadline.
#[derive(Debug, Clone, Default)]
pub struct TrainingRun {
    pub cancel: CancelToken,
    pub deadline: Option<DateTime<Utc>>,
}

impl TrainingRun {
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Utc::now() >= deadline {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }
}

/// Opaque fitted parameters stored inside an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Classifier(FittedClassifier),
    Regressor(FittedRegressor),
}

/// One trained candidate. Immutable once produced; retraining creates a
/// new artifact version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelArtifact {
    pub id: Uuid,
    /// Prediction family, e.g. `result_prediction`.
    pub model_type: String,
    pub target_column: String,
    pub algorithm_name: String,
    pub trained_at: DateTime<Utc>,
    /// Prepared feature columns, in the order the model expects.
    pub feature_names: Vec<String>,
    pub model: FittedModel,
    pub evaluation_metrics: EvaluationMetrics,
    /// Top features by importance, best first (at most 20).
    pub feature_importance: Vec<(String, f64)>,
}

/// A named set of trained candidates voting together. Exposes the same
/// prediction contract as a single model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleArtifact {
    pub id: Uuid,
    pub name: String,
    pub model_type: String,
    pub target_column: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub voting: VotingStrategy,
    pub members: Vec<TrainedModelArtifact>,
    pub evaluation_metrics: EvaluationMetrics,
    pub feature_importance: Vec<(String, f64)>,
}

/// What the store persists and the prediction engine loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "artifact", rename_all = "snake_case")]
pub enum Artifact {
    Single(TrainedModelArtifact),
    Ensemble(EnsembleArtifact),
}

impl Artifact {
    pub fn id(&self) -> Uuid {
        match self {
            Artifact::Single(a) => a.id,
            Artifact::Ensemble(a) => a.id,
        }
    }

    /// Algorithm slug used in storage keys, `ensemble` for ensembles.
    pub fn algorithm_name(&self) -> &str {
        match self {
            Artifact::Single(a) => &a.algorithm_name,
            Artifact::Ensemble(_) => "ensemble",
        }
    }

    pub fn target_column(&self) -> &str {
        match self {
            Artifact::Single(a) => &a.target_column,
            Artifact::Ensemble(a) => &a.target_column,
        }
    }

    pub fn model_type(&self) -> &str {
        match self {
            Artifact::Single(a) => &a.model_type,
            Artifact::Ensemble(a) => &a.model_type,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        match self {
            Artifact::Single(a) => &a.feature_names,
            Artifact::Ensemble(a) => &a.feature_names,
        }
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        match self {
            Artifact::Single(a) => a.trained_at,
            Artifact::Ensemble(a) => a.trained_at,
        }
    }

    pub fn evaluation_metrics(&self) -> &EvaluationMetrics {
        match self {
            Artifact::Single(a) => &a.evaluation_metrics,
            Artifact::Ensemble(a) => &a.evaluation_metrics,
        }
    }

    /// Concrete model class for metadata, e.g. `VotingEnsemble`.
    pub fn model_class(&self) -> &'static str {
        match self {
            Artifact::Ensemble(_) => "VotingEnsemble",
            Artifact::Single(a) => match &a.model {
                FittedModel::Classifier(FittedClassifier::LogisticRegression(_)) => "LogisticRegression",
                FittedModel::Classifier(FittedClassifier::NaiveBayes(_)) => "GaussianNb",
                FittedModel::Classifier(FittedClassifier::Knn(_)) => "KnnClassifier",
                FittedModel::Regressor(FittedRegressor::LinearRegression(_)) => "LinearRegression",
                FittedModel::Regressor(FittedRegressor::Ridge(_)) => "RidgeRegression",
                FittedModel::Regressor(FittedRegressor::Knn(_)) => "KnnRegressor",
            },
        }
    }
}

/// Result of training (or reusing) one target.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub key: String,
    pub artifact: Artifact,
    /// True when a valid existing artifact was loaded instead of retraining.
    pub reused: bool,
}

/// Trains the candidate roster per target and persists the selection.
pub struct ModelTrainer<'a> {
    config: TrainingConfig,
    store: &'a ModelStore,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(config: TrainingConfig, store: &'a ModelStore) -> Self {
        Self { config, store }
    }

    /// Train every supplied target independently. A failing target yields
    /// its own error entry; the rest proceed.
    pub fn train_all(
        &self,
        datasets: &[(String, PreparedDataset)],
        run: &TrainingRun,
    ) -> BTreeMap<String, Result<TrainOutcome>> {
        let mut outcomes = BTreeMap::new();
        for (target, dataset) in datasets {
            let outcome = self.train_target(target, dataset, run);
            if let Err(e) = &outcome {
                warn!(wager_target = %target, error = %e, "target training failed");
            }
            outcomes.insert(target.clone(), outcome);
        }
        outcomes
    }

    /// Train one wager target, or reuse a valid persisted artifact when
    /// retraining is not forced.
    pub fn train_target(
        &self,
        target_column: &str,
        dataset: &PreparedDataset,
        run: &TrainingRun,
    ) -> Result<TrainOutcome> {
        if !self.config.force_retrain {
            if let Some(key) = self.store.latest(target_column) {
                match self.store.load(&key) {
                    Ok(artifact) if artifact.target_column() == target_column => {
                        info!(wager_target = target_column, key = %key, "reusing existing artifact");
                        return Ok(TrainOutcome {
                            key,
                            artifact,
                            reused: true,
                        });
                    }
                    Ok(_) | Err(_) => {
                        warn!(wager_target = target_column, key = %key, "existing artifact unusable, retraining");
                    }
                }
            }
        }

        run.check()?;
        let x = dataset.features.to_matrix()?;
        if x.len() != dataset.target.len() {
            return Err(Error::InvalidInput(format!(
                "{} feature rows vs {} targets",
                x.len(),
                dataset.target.len()
            )));
        }
        if x.len() < 10 {
            return Err(Error::InsufficientData(format!(
                "{} samples for target '{target_column}', need at least 10",
                x.len()
            )));
        }

        let feature_names = dataset.features.names().to_vec();
        let artifact = match &dataset.target {
            TargetColumn::Classes(labels) => {
                self.train_classification(target_column, &x, labels, &feature_names, run)?
            }
            TargetColumn::Continuous(values) => {
                self.train_regression(target_column, &x, values, &feature_names, run)?
            }
        };

        let key = self.store.save(&artifact)?;
        info!(
            wager_target = target_column,
            key = %key,
            model_class = artifact.model_class(),
            score = artifact.evaluation_metrics().selection_score(),
            "artifact persisted"
        );
        Ok(TrainOutcome {
            key,
            artifact,
            reused: false,
        })
    }

    fn train_classification(
        &self,
        target_column: &str,
        x: &[Vec<f64>],
        labels: &[String],
        feature_names: &[String],
        run: &TrainingRun,
    ) -> Result<Artifact> {
        let classes = sorted_unique(labels);
        if classes.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "target '{target_column}' has a single class"
            )));
        }
        let y: Vec<usize> = labels
            .iter()
            .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
            .collect();

        let (train_idx, test_idx) = self.stratified_split(&y, classes.len());
        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(Error::InsufficientData(format!(
                "split left no data for target '{target_column}'"
            )));
        }
        let x_train = gather(x, &train_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();
        let x_test = gather(x, &test_idx);
        let y_test: Vec<usize> = test_idx.iter().map(|&i| y[i]).collect();

        // Roster, with per-candidate failure isolation.
        let mut candidates: Vec<(String, FittedClassifier, EvaluationMetrics)> = Vec::new();
        for name in ["logistic_regression", "naive_bayes", "knn"] {
            run.check()?;
            match self.fit_classifier_candidate(name, &x_train, &y_train, &classes, run) {
                Ok(model) => {
                    let eval = evaluate_classifier(&model, &x_test, &y_test, classes.len());
                    debug!(
                        wager_target = target_column,
                        algorithm = name,
                        f1 = eval.selection_score(),
                        "candidate evaluated"
                    );
                    candidates.push((name.to_string(), model, eval));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    let e = Error::TransientCompute {
                        algorithm: name.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(wager_target = target_column, error = %e, "candidate skipped");
                }
            }
        }
        if candidates.is_empty() {
            return Err(Error::InsufficientData(format!(
                "no trainable candidates for target '{target_column}'"
            )));
        }

        let trained_at = Utc::now();
        let make_member = |name: &str, model: &FittedClassifier, eval: &EvaluationMetrics| TrainedModelArtifact {
            id: Uuid::new_v4(),
            model_type: format!("{target_column}_prediction"),
            target_column: target_column.to_string(),
            algorithm_name: name.to_string(),
            trained_at,
            feature_names: feature_names.to_vec(),
            model: FittedModel::Classifier(model.clone()),
            evaluation_metrics: eval.clone(),
            feature_importance: importance_ranking(model.feature_importance(), feature_names, &x_train, &y_train, classes.len()),
        };

        let use_ensemble = self.config.selection == SelectionStrategy::Ensemble
            && candidates.len() >= self.config.min_ensemble_members.max(2);
        if use_ensemble {
            let members: Vec<(String, FittedClassifier)> = candidates
                .iter()
                .map(|(name, model, _)| (name.clone(), model.clone()))
                .collect();
            let ensemble = VotingEnsemble::new(self.config.voting, members)?;
            let eval = evaluate_ensemble(&ensemble, &x_test, &y_test, classes.len());
            let member_artifacts: Vec<TrainedModelArtifact> = candidates
                .iter()
                .map(|(name, model, member_eval)| make_member(name, model, member_eval))
                .collect();
            let importance = member_artifacts
                .iter()
                .find(|m| m.algorithm_name == "logistic_regression")
                .map(|m| m.feature_importance.clone())
                .unwrap_or_else(|| {
                    importance_ranking(None, feature_names, &x_train, &y_train, classes.len())
                });
            return Ok(Artifact::Ensemble(EnsembleArtifact {
                id: Uuid::new_v4(),
                name: format!("{target_column}_ensemble"),
                model_type: format!("{target_column}_prediction"),
                target_column: target_column.to_string(),
                trained_at,
                feature_names: feature_names.to_vec(),
                voting: self.config.voting,
                members: member_artifacts,
                evaluation_metrics: eval,
                feature_importance: importance,
            }));
        }

        if self.config.selection == SelectionStrategy::Ensemble {
            warn!(
                wager_target = target_column,
                survivors = candidates.len(),
                "too few candidates for an ensemble, keeping best single model"
            );
        }
        let (name, model, eval) = candidates
            .into_iter()
            .max_by(|a, b| {
                a.2.selection_score()
                    .partial_cmp(&b.2.selection_score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("candidates checked non-empty");
        Ok(Artifact::Single(make_member(&name, &model, &eval)))
    }

    fn train_regression(
        &self,
        target_column: &str,
        x: &[Vec<f64>],
        values: &[f64],
        feature_names: &[String],
        run: &TrainingRun,
    ) -> Result<Artifact> {
        let (train_idx, test_idx) = self.plain_split(values.len());
        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(Error::InsufficientData(format!(
                "split left no data for target '{target_column}'"
            )));
        }
        let x_train = gather(x, &train_idx);
        let y_train: Vec<f64> = train_idx.iter().map(|&i| values[i]).collect();
        let x_test = gather(x, &test_idx);
        let y_test: Vec<f64> = test_idx.iter().map(|&i| values[i]).collect();

        let mut candidates: Vec<(String, FittedRegressor, EvaluationMetrics)> = Vec::new();
        for name in ["linear_regression", "ridge", "knn"] {
            run.check()?;
            match self.fit_regressor_candidate(name, &x_train, &y_train, run) {
                Ok(model) => {
                    let predictions: Vec<f64> = x_test.iter().map(|row| model.predict(row)).collect();
                    let eval = EvaluationMetrics::Regression(regression_metrics(&y_test, &predictions));
                    debug!(
                        wager_target = target_column,
                        algorithm = name,
                        r2 = eval.selection_score(),
                        "candidate evaluated"
                    );
                    candidates.push((name.to_string(), model, eval));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    let e = Error::TransientCompute {
                        algorithm: name.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(wager_target = target_column, error = %e, "candidate skipped");
                }
            }
        }

        // Voting ensembles are a classification construct; a regression
        // target always keeps its best single candidate.
        let (name, model, eval) = candidates
            .into_iter()
            .max_by(|a, b| {
                a.2.selection_score()
                    .partial_cmp(&b.2.selection_score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| {
                Error::InsufficientData(format!("no trainable candidates for target '{target_column}'"))
            })?;

        let importance = model
            .feature_importance()
            .map(|imp| ranked_importance(feature_names, &imp))
            .unwrap_or_else(|| {
                let view_values = y_train.clone();
                univariate_importance(feature_names, &x_train, &TargetView::Continuous(&view_values))
            });

        Ok(Artifact::Single(TrainedModelArtifact {
            id: Uuid::new_v4(),
            model_type: format!("{target_column}_prediction"),
            target_column: target_column.to_string(),
            algorithm_name: name,
            trained_at: Utc::now(),
            feature_names: feature_names.to_vec(),
            model: FittedModel::Regressor(model),
            evaluation_metrics: eval,
            feature_importance: importance,
        }))
    }

    fn fit_classifier_candidate(
        &self,
        name: &str,
        x: &[Vec<f64>],
        y: &[usize],
        classes: &[String],
        run: &TrainingRun,
    ) -> Result<FittedClassifier> {
        match name {
            "logistic_regression" => {
                let grid: Vec<GradientHyper> = if self.config.hyperparameter_search {
                    vec![
                        GradientHyper { learning_rate: 0.05, ..Default::default() },
                        GradientHyper::default(),
                        GradientHyper { learning_rate: 0.2, ..Default::default() },
                    ]
                } else {
                    vec![GradientHyper::default()]
                };
                let mut best: Option<(f64, LogisticRegression)> = None;
                for hyper in grid {
                    run.check()?;
                    let model = LogisticRegression::fit(x, y, classes, &hyper)?;
                    let score = training_accuracy(&FittedClassifier::LogisticRegression(model.clone()), x, y);
                    if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                        best = Some((score, model));
                    }
                }
                Ok(FittedClassifier::LogisticRegression(best.expect("non-empty grid").1))
            }
            "naive_bayes" => Ok(FittedClassifier::NaiveBayes(GaussianNb::fit(x, y, classes)?)),
            "knn" => {
                let grid: Vec<usize> = if self.config.hyperparameter_search {
                    vec![3, 5, 7]
                } else {
                    vec![5]
                };
                let mut best: Option<(f64, KnnClassifier)> = None;
                for k in grid {
                    run.check()?;
                    let model = KnnClassifier::fit(x, y, classes, k)?;
                    let score = training_accuracy(&FittedClassifier::Knn(model.clone()), x, y);
                    if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                        best = Some((score, model));
                    }
                }
                Ok(FittedClassifier::Knn(best.expect("non-empty grid").1))
            }
            other => Err(Error::InvalidInput(format!("unknown candidate '{other}'"))),
        }
    }

    fn fit_regressor_candidate(
        &self,
        name: &str,
        x: &[Vec<f64>],
        y: &[f64],
        run: &TrainingRun,
    ) -> Result<FittedRegressor> {
        match name {
            "linear_regression" => {
                let hyper = GradientHyper {
                    learning_rate: 0.05,
                    epochs: 500,
                    l2: 0.0,
                };
                run.check()?;
                Ok(FittedRegressor::LinearRegression(LinearRegression::fit(x, y, &hyper)?))
            }
            "ridge" => {
                let grid: Vec<f64> = if self.config.hyperparameter_search {
                    vec![0.1, 1.0, 10.0]
                } else {
                    vec![1.0]
                };
                let mut best: Option<(f64, FittedRegressor)> = None;
                for alpha in grid {
                    run.check()?;
                    let model = FittedRegressor::Ridge(RidgeRegression::fit(x, y, alpha)?);
                    let predictions: Vec<f64> = x.iter().map(|row| model.predict(row)).collect();
                    let score = regression_metrics(y, &predictions).r2;
                    if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                        best = Some((score, model));
                    }
                }
                Ok(best.expect("non-empty grid").1)
            }
            "knn" => Ok(FittedRegressor::Knn(KnnRegressor::fit(x, y, 5)?)),
            other => Err(Error::InvalidInput(format!("unknown candidate '{other}'"))),
        }
    }

    /// Class-stratified shuffle split, deterministic under `random_state`.
    fn stratified_split(&self, y: &[usize], n_classes: usize) -> (Vec<usize>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let mut train = Vec::new();
        let mut test = Vec::new();
        for class in 0..n_classes {
            let mut indices: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &label)| label == class)
                .map(|(i, _)| i)
                .collect();
            indices.shuffle(&mut rng);
            let mut cut = ((indices.len() as f64) * self.config.train_split).round() as usize;
            if indices.len() >= 2 {
                cut = cut.clamp(1, indices.len() - 1);
            } else {
                cut = cut.min(indices.len());
            }
            train.extend_from_slice(&indices[..cut]);
            test.extend_from_slice(&indices[cut..]);
        }
        train.sort_unstable();
        test.sort_unstable();
        (train, test)
    }

    fn plain_split(&self, n: usize) -> (Vec<usize>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let cut = ((n as f64) * self.config.train_split).round() as usize;
        let cut = cut.clamp(1, n.saturating_sub(1).max(1));
        let mut train = indices[..cut].to_vec();
        let mut test = indices[cut..].to_vec();
        train.sort_unstable();
        test.sort_unstable();
        (train, test)
    }
}

fn gather(x: &[Vec<f64>], indices: &[usize]) -> Vec<Vec<f64>> {
    indices.iter().map(|&i| x[i].clone()).collect()
}

fn sorted_unique(values: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = values.to_vec();
    unique.sort();
    unique.dedup();
    unique
}

fn training_accuracy(model: &FittedClassifier, x: &[Vec<f64>], y: &[usize]) -> f64 {
    let correct = x
        .iter()
        .zip(y)
        .filter(|(row, &label)| model.predict(row) == label)
        .count();
    correct as f64 / x.len().max(1) as f64
}

fn evaluate_classifier(
    model: &FittedClassifier,
    x_test: &[Vec<f64>],
    y_test: &[usize],
    n_classes: usize,
) -> EvaluationMetrics {
    let predictions: Vec<usize> = x_test.iter().map(|row| model.predict(row)).collect();
    let positive: Option<Vec<f64>> = (n_classes == 2)
        .then(|| x_test.iter().map(|row| model.predict_probabilities(row)[1]).collect());
    EvaluationMetrics::Classification(classification_metrics(
        y_test,
        &predictions,
        n_classes,
        positive.as_deref(),
    ))
}

fn evaluate_ensemble(
    ensemble: &VotingEnsemble,
    x_test: &[Vec<f64>],
    y_test: &[usize],
    n_classes: usize,
) -> EvaluationMetrics {
    let predictions: Vec<usize> = x_test.iter().map(|row| ensemble.predict(row)).collect();
    let positive: Option<Vec<f64>> = (n_classes == 2)
        .then(|| {
            x_test
                .iter()
                .map(|row| ensemble.predict_probabilities(row).map(|p| p[1]))
                .collect::<Option<Vec<f64>>>()
        })
        .flatten();
    EvaluationMetrics::Classification(classification_metrics(
        y_test,
        &predictions,
        n_classes,
        positive.as_deref(),
    ))
}

/// Model-reported importance when available, univariate scores otherwise;
/// ranked best first, truncated to 20.
fn importance_ranking(
    model_importance: Option<Vec<f64>>,
    feature_names: &[String],
    x_train: &[Vec<f64>],
    y_train: &[usize],
    n_classes: usize,
) -> Vec<(String, f64)> {
    match model_importance {
        Some(importance) => ranked_importance(feature_names, &importance),
        None => univariate_importance(feature_names, x_train, &TargetView::Classes(y_train, n_classes)),
    }
}

fn ranked_importance(feature_names: &[String], importance: &[f64]) -> Vec<(String, f64)> {
    let mut ranking: Vec<(String, f64)> = feature_names
        .iter()
        .cloned()
        .zip(importance.iter().copied())
        .collect();
    ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranking.truncate(20);
    ranking
}

fn univariate_importance(
    feature_names: &[String],
    x_train: &[Vec<f64>],
    target: &TargetView<'_>,
) -> Vec<(String, f64)> {
    let scores: Vec<f64> = (0..feature_names.len())
        .map(|j| {
            let column: Vec<f64> = x_train.iter().map(|row| row[j]).collect();
            score_feature(&column, target, FeatureScore::AnovaF)
        })
        .collect();
    ranked_importance(feature_names, &scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ModelStore {
        ModelStore::new(StorageConfig {
            models_dir: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    fn classification_dataset() -> PreparedDataset {
        let mut features = crate::features::FeatureFrame::new();
        let n = 60;
        features
            .add_column(
                "form_diff",
                (0..n)
                    .map(|i| {
                        let side = if i % 2 == 0 { 1.0 } else { -1.0 };
                        crate::types::FieldValue::Number(side * (1.0 + (i % 5) as f64 * 0.1))
                    })
                    .collect(),
            )
            .unwrap();
        features
            .add_column(
                "attack_ratio",
                (0..n)
                    .map(|i| {
                        let side = if i % 2 == 0 { 0.8 } else { -0.6 };
                        crate::types::FieldValue::Number(side + (i % 3) as f64 * 0.05)
                    })
                    .collect(),
            )
            .unwrap();
        let labels: Vec<String> = (0..n)
            .map(|i| if i % 2 == 0 { "home_win" } else { "away_win" }.to_string())
            .collect();
        PreparedDataset {
            features,
            target: TargetColumn::Classes(labels),
        }
    }

    fn regression_dataset() -> PreparedDataset {
        let mut features = crate::features::FeatureFrame::new();
        let n = 60;
        features
            .add_column(
                "xg_sum",
                (0..n).map(|i| crate::types::FieldValue::Number(i as f64 / 10.0)).collect(),
            )
            .unwrap();
        features
            .add_column(
                "tempo",
                (0..n).map(|i| crate::types::FieldValue::Number((i % 7) as f64 / 7.0)).collect(),
            )
            .unwrap();
        let values: Vec<f64> = (0..n).map(|i| 1.2 + (i as f64 / 10.0) * 0.9 + (i % 7) as f64 * 0.01).collect();
        PreparedDataset {
            features,
            target: TargetColumn::Continuous(values),
        }
    }

    #[test]
    fn test_classification_ensemble_trained_and_persisted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = ModelTrainer::new(TrainingConfig::default(), &store);

        let outcome = trainer
            .train_target("result", &classification_dataset(), &TrainingRun::unbounded())
            .unwrap();
        assert!(!outcome.reused);
        match &outcome.artifact {
            Artifact::Ensemble(e) => {
                assert_eq!(e.members.len(), 3);
                assert_eq!(e.target_column, "result");
                assert!(e.evaluation_metrics.selection_score() > 0.9);
                assert!(!e.feature_importance.is_empty());
            }
            other => panic!("expected ensemble, got {other:?}"),
        }

        // Reload through the store.
        let loaded = store.load(&outcome.key).unwrap();
        assert_eq!(loaded.target_column(), "result");
    }

    #[test]
    fn test_best_single_selection() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = TrainingConfig {
            selection: SelectionStrategy::BestSingle,
            ..Default::default()
        };
        let trainer = ModelTrainer::new(config, &store);

        let outcome = trainer
            .train_target("result", &classification_dataset(), &TrainingRun::unbounded())
            .unwrap();
        assert!(matches!(outcome.artifact, Artifact::Single(_)));
    }

    #[test]
    fn test_regression_target_keeps_best_single() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = ModelTrainer::new(TrainingConfig::default(), &store);

        let outcome = trainer
            .train_target("total_goals", &regression_dataset(), &TrainingRun::unbounded())
            .unwrap();
        match &outcome.artifact {
            Artifact::Single(a) => {
                assert!(matches!(a.model, FittedModel::Regressor(_)));
                assert!(a.evaluation_metrics.selection_score() > 0.8);
            }
            other => panic!("expected single regressor, got {other:?}"),
        }
    }

    #[test]
    fn test_idempotent_reuse() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = ModelTrainer::new(TrainingConfig::default(), &store);
        let dataset = classification_dataset();

        let first = trainer
            .train_target("result", &dataset, &TrainingRun::unbounded())
            .unwrap();
        let second = trainer
            .train_target("result", &dataset, &TrainingRun::unbounded())
            .unwrap();
        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.key, second.key);
    }

    #[test]
    fn test_force_retrain_creates_new_version() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = TrainingConfig {
            force_retrain: true,
            ..Default::default()
        };
        let trainer = ModelTrainer::new(config, &store);
        let dataset = classification_dataset();

        let first = trainer
            .train_target("result", &dataset, &TrainingRun::unbounded())
            .unwrap();
        let second = trainer
            .train_target("result", &dataset, &TrainingRun::unbounded())
            .unwrap();
        assert!(!second.reused);
        assert_ne!(first.key, second.key);
    }

    #[test]
    fn test_single_class_target_fails_alone() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = ModelTrainer::new(TrainingConfig::default(), &store);

        let mut degenerate = classification_dataset();
        degenerate.target = TargetColumn::Classes(vec!["home_win".to_string(); 60]);

        let datasets = vec![
            ("result".to_string(), classification_dataset()),
            ("both_teams_score".to_string(), degenerate),
        ];
        let outcomes = trainer.train_all(&datasets, &TrainingRun::unbounded());

        assert!(outcomes["result"].is_ok());
        assert!(matches!(
            &outcomes["both_teams_score"],
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_cancellation_stops_run() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = ModelTrainer::new(TrainingConfig::default(), &store);

        let run = TrainingRun::unbounded();
        run.cancel.cancel();
        assert!(matches!(
            trainer.train_target("result", &classification_dataset(), &run),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_too_few_samples() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = ModelTrainer::new(TrainingConfig::default(), &store);

        let mut features = crate::features::FeatureFrame::new();
        features
            .add_column(
                "x",
                (0..4).map(|i| crate::types::FieldValue::Number(i as f64)).collect(),
            )
            .unwrap();
        let dataset = PreparedDataset {
            features,
            target: TargetColumn::Classes(vec![
                "a".to_string(),
                "b".to_string(),
                "a".to_string(),
                "b".to_string(),
            ]),
        };
        assert!(matches!(
            trainer.train_target("result", &dataset, &TrainingRun::unbounded()),
            Err(Error::InsufficientData(_))
        ));
    }
}
