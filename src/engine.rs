//! Engine context
//!
//! The explicit replacement for the original system's import-time
//! singletons: one context constructed at process start from an
//! [`EngineConfig`] and threaded through calls. Holds the cache, the
//! model store and the calculators; owns no global state.

use std::collections::BTreeMap;

use crate::cache::CacheManager;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::features::{prepare_cached, FeatureFrame, Preparation, PreparationConfig, PreparedDataset};
use crate::odds::OddsCalculator;
use crate::predict::PredictionEngine;
use crate::recommend::{MatchPredictions, RecommendationGenerator};
use crate::store::ModelStore;
use crate::train::{ModelTrainer, TrainOutcome, TrainingRun};
use crate::types::{MatchFeatureRecord, PredictionResult, Recommendation, RecommendationSummary, RiskLevel};

/// Everything the prediction core needs, wired once.
pub struct Engine {
    cache: CacheManager,
    store: ModelStore,
    config: EngineConfig,
    odds: OddsCalculator,
    recommender: RecommendationGenerator,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let cache = CacheManager::new(config.cache.clone());
        let store = ModelStore::new(config.storage.clone())?;
        let odds = OddsCalculator::new(config.odds.clone());
        let recommender = RecommendationGenerator::new(
            config.recommendation.clone(),
            OddsCalculator::new(config.odds.clone()),
        );
        Ok(Self {
            cache,
            store,
            config,
            odds,
            recommender,
        })
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn odds(&self) -> &OddsCalculator {
        &self.odds
    }

    /// Cache-wrapped feature preparation for one wager target.
    pub fn prepare(
        &self,
        preparation: &PreparationConfig,
        records: &[MatchFeatureRecord],
        target_column: &str,
    ) -> Result<Preparation> {
        prepare_cached(&self.cache, preparation, records, target_column)
    }

    /// Train one target, honoring idempotent reuse and the run controls.
    pub fn train_target(
        &self,
        target_column: &str,
        dataset: &PreparedDataset,
        run: &TrainingRun,
    ) -> Result<TrainOutcome> {
        ModelTrainer::new(self.config.training.clone(), &self.store).train_target(target_column, dataset, run)
    }

    /// Train every supplied target independently.
    pub fn train_all(
        &self,
        datasets: &[(String, PreparedDataset)],
        run: &TrainingRun,
    ) -> BTreeMap<String, Result<TrainOutcome>> {
        ModelTrainer::new(self.config.training.clone(), &self.store).train_all(datasets, run)
    }

    pub fn predict(&self, model_key: &str, features: &FeatureFrame) -> Result<Vec<PredictionResult>> {
        PredictionEngine::new(&self.store, &self.cache).predict(model_key, features)
    }

    pub fn predict_latest(
        &self,
        target_column: &str,
        features: &FeatureFrame,
    ) -> Result<(String, Vec<PredictionResult>)> {
        PredictionEngine::new(&self.store, &self.cache).predict_latest(target_column, features)
    }

    pub fn recommend(
        &self,
        predictions: &MatchPredictions,
        risk_level: RiskLevel,
        max_count: Option<usize>,
    ) -> Vec<Recommendation> {
        self.recommender.generate(predictions, risk_level, max_count)
    }

    pub fn recommendation_summary(&self, recommendations: &[Recommendation]) -> RecommendationSummary {
        self.recommender.summary(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, StorageConfig};
    use crate::recommend::MarketPrediction;
    use crate::types::BetType;
    use tempfile::TempDir;

    fn records() -> Vec<MatchFeatureRecord> {
        (0..40)
            .map(|i| {
                let home_strong = i % 2 == 0;
                MatchFeatureRecord::new(format!("m{i}"), "Alfa FC", "Beta SC")
                    .with_field("home_goals_scored", if home_strong { 2.2 } else { 0.9 } + (i % 4) as f64 * 0.05)
                    .with_field("away_goals_scored", if home_strong { 0.8 } else { 2.0 } + (i % 3) as f64 * 0.04)
                    .with_label("result", if home_strong { "home_win" } else { "away_win" })
            })
            .collect()
    }

    #[test]
    fn test_engine_end_to_end() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            cache: CacheConfig {
                enabled: true,
                dir: dir.path().join("cache"),
                ttl_hours: 24,
            },
            storage: StorageConfig {
                models_dir: dir.path().join("models"),
            },
            ..Default::default()
        };
        let engine = Engine::new(config).unwrap();

        let preparation = engine
            .prepare(&PreparationConfig::default(), &records(), "result")
            .unwrap();
        let outcome = engine
            .train_target("result", &preparation.dataset, &TrainingRun::unbounded())
            .unwrap();

        let upcoming = MatchFeatureRecord::new("next", "Alfa FC", "Beta SC")
            .with_field("home_goals_scored", 2.25)
            .with_field("away_goals_scored", 0.85);
        let raw = FeatureFrame::from_records(&[upcoming]).unwrap();
        let input = preparation.pipeline.transform(&raw).unwrap();

        let (key, results) = engine.predict_latest("result", &input).unwrap();
        assert_eq!(key, outcome.key);
        assert_eq!(results[0].predicted_label, "home_win");

        let recommendations = engine.recommend(
            &MatchPredictions {
                match_id: "next".to_string(),
                markets: vec![MarketPrediction {
                    bet_type: BetType::MatchResult,
                    result: results[0].clone(),
                }],
            },
            RiskLevel::High,
            None,
        );
        assert_eq!(recommendations.len(), 1);
        let summary = engine.recommendation_summary(&recommendations);
        assert_eq!(summary.total_recommendations, 1);
    }
}
