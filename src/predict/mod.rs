//! Prediction engine
//!
//! Loads a trained artifact, validates the input schema and emits a
//! label, probability vector and confidence per input row. Inference is
//! deterministic for a fixed artifact and input; schema mismatches fail
//! fast with explicit field lists, and artifact problems are never
//! masked by a fallback prediction.

use chrono::Utc;
use std::collections::BTreeSet;
use tracing::debug;

use crate::cache::CacheManager;
use crate::error::{Error, Result};
use crate::features::FeatureFrame;
use crate::store::ModelStore;
use crate::train::algorithms::{FittedClassifier, VotingEnsemble};
use crate::train::{Artifact, FittedModel};
use crate::types::PredictionResult;

/// Runtime predictor with capability variants: probabilistic
/// classification, voting ensembles, plain regression.
enum Predictor {
    Classifier(FittedClassifier),
    Ensemble(VotingEnsemble),
    Regressor(crate::train::algorithms::FittedRegressor),
}

impl Predictor {
    fn from_artifact(artifact: &Artifact) -> Result<Self> {
        match artifact {
            Artifact::Single(single) => match &single.model {
                FittedModel::Classifier(model) => Ok(Predictor::Classifier(model.clone())),
                FittedModel::Regressor(model) => Ok(Predictor::Regressor(model.clone())),
            },
            Artifact::Ensemble(ensemble) => {
                let members: Vec<(String, FittedClassifier)> = ensemble
                    .members
                    .iter()
                    .map(|member| match &member.model {
                        FittedModel::Classifier(model) => {
                            Ok((member.algorithm_name.clone(), model.clone()))
                        }
                        FittedModel::Regressor(_) => Err(Error::ArtifactLoad(format!(
                            "ensemble '{}' member '{}' is not a classifier",
                            ensemble.name, member.algorithm_name
                        ))),
                    })
                    .collect::<Result<_>>()?;
                Ok(Predictor::Ensemble(VotingEnsemble::new(ensemble.voting, members)?))
            }
        }
    }

    fn predict_row(&self, model_key: &str, row: &[f64]) -> PredictionResult {
        let timestamp = Utc::now();
        match self {
            Predictor::Classifier(model) => {
                let probabilities = model.predict_probabilities(row);
                let best = crate::train::algorithms::argmax(&probabilities);
                PredictionResult {
                    model_key: model_key.to_string(),
                    predicted_label: model.classes()[best].clone(),
                    confidence: probabilities[best],
                    probabilities,
                    classes: model.classes().to_vec(),
                    predicted_value: None,
                    timestamp,
                }
            }
            Predictor::Ensemble(ensemble) => match ensemble.predict_probabilities(row) {
                Some(probabilities) => {
                    let best = crate::train::algorithms::argmax(&probabilities);
                    PredictionResult {
                        model_key: model_key.to_string(),
                        predicted_label: ensemble.classes()[best].clone(),
                        confidence: probabilities[best],
                        probabilities,
                        classes: ensemble.classes().to_vec(),
                        predicted_value: None,
                        timestamp,
                    }
                }
                // Hard voting exposes no probabilities: confidence is 1.0.
                None => {
                    let best = ensemble.predict(row);
                    PredictionResult {
                        model_key: model_key.to_string(),
                        predicted_label: ensemble.classes()[best].clone(),
                        confidence: 1.0,
                        probabilities: Vec::new(),
                        classes: ensemble.classes().to_vec(),
                        predicted_value: None,
                        timestamp,
                    }
                }
            },
            Predictor::Regressor(model) => {
                let value = model.predict(row);
                PredictionResult {
                    model_key: model_key.to_string(),
                    predicted_label: format!("{value:.2}"),
                    confidence: 1.0,
                    probabilities: Vec::new(),
                    classes: Vec::new(),
                    predicted_value: Some(value),
                    timestamp,
                }
            }
        }
    }
}

/// Stateless engine over a store and a cache.
pub struct PredictionEngine<'a> {
    store: &'a ModelStore,
    cache: &'a CacheManager,
}

impl<'a> PredictionEngine<'a> {
    pub fn new(store: &'a ModelStore, cache: &'a CacheManager) -> Self {
        Self { store, cache }
    }

    /// Artifact load, memoized through the cache manager.
    pub fn load_artifact(&self, model_key: &str) -> Result<Artifact> {
        let cache_key = self.cache.generate_key("predict::artifact", &[model_key], &[]);
        self.cache.get_or_compute(&cache_key, || self.store.load(model_key))
    }

    /// Predict every row of `features` with the given artifact.
    ///
    /// The input column set must exactly equal the artifact's recorded
    /// `feature_names` (order-insensitive); columns are then aligned to
    /// the recorded order. Mismatches are never repaired by reordering
    /// tricks, dropping or zero-filling.
    pub fn predict(&self, model_key: &str, features: &FeatureFrame) -> Result<Vec<PredictionResult>> {
        let artifact = self.load_artifact(model_key)?;
        validate_schema(artifact.feature_names(), features)?;

        let mut aligned = features.clone();
        aligned.select_columns(artifact.feature_names())?;
        let matrix = aligned.to_matrix()?;

        let predictor = Predictor::from_artifact(&artifact)?;
        let results: Vec<PredictionResult> = matrix
            .iter()
            .map(|row| predictor.predict_row(model_key, row))
            .collect();
        debug!(model_key, rows = results.len(), "predictions generated");
        Ok(results)
    }

    /// Predict with the newest artifact for a wager target.
    pub fn predict_latest(
        &self,
        target_column: &str,
        features: &FeatureFrame,
    ) -> Result<(String, Vec<PredictionResult>)> {
        let key = self
            .store
            .latest(target_column)
            .ok_or_else(|| Error::ArtifactLoad(format!("no artifact for target '{target_column}'")))?;
        let results = self.predict(&key, features)?;
        Ok((key, results))
    }
}

/// Set-wise schema equality with explicit reporting.
fn validate_schema(expected: &[String], features: &FeatureFrame) -> Result<()> {
    let expected_set: BTreeSet<&String> = expected.iter().collect();
    let supplied_set: BTreeSet<&String> = features.names().iter().collect();
    if expected_set != supplied_set {
        return Err(Error::SchemaMismatch {
            missing: expected_set
                .difference(&supplied_set)
                .map(|s| s.to_string())
                .collect(),
            extra: supplied_set
                .difference(&expected_set)
                .map(|s| s.to_string())
                .collect(),
        });
    }
    Ok(())
}
