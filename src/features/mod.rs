//! Feature preparation pipeline
//!
//! Turns raw match records into the fixed-schema numeric frames the
//! training and prediction layers expect:
//! - column-kind classification and per-type imputation
//! - categorical encoding and optional date expansion
//! - scaling, interaction features, selection, optional reduction
//!
//! Fitted transformer state serializes as one unit so a transform can be
//! replayed on new data without refitting.

pub mod frame;
pub mod pipeline;
pub mod select;

pub use frame::{ColumnKind, FeatureFrame};
pub use pipeline::{
    FeaturePipeline, FittedPipeline, PreparationConfig, PreparedDataset, ScalingMethod, TargetColumn,
};
pub use select::{FeatureScore, PcaState};

use serde::{Deserialize, Serialize};

use crate::cache::CacheManager;
use crate::error::Result;
use crate::types::MatchFeatureRecord;

/// Fitted pipeline plus its prepared output, as cached together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preparation {
    pub pipeline: FeaturePipeline,
    pub dataset: PreparedDataset,
}

/// Cache-wrapped preparation: a second call with identical records,
/// target and config within the TTL window returns the cached result
/// without running the transform stages again.
pub fn prepare_cached(
    cache: &CacheManager,
    config: &PreparationConfig,
    records: &[MatchFeatureRecord],
    target_column: &str,
) -> Result<Preparation> {
    let records_json = serde_json::to_string(records).unwrap_or_default();
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let key = cache.generate_key(
        "features::prepare",
        &[target_column],
        &[("config", &config_json), ("records", &records_json)],
    );

    cache.get_or_compute(&key, || {
        let mut frame = FeatureFrame::from_records(records)?;
        // Other targets' labels must not leak into the feature set.
        for record in records {
            for label in record.labels.keys() {
                if label != target_column {
                    let _ = frame.take_column(label);
                }
            }
        }
        let mut pipeline = FeaturePipeline::new(config.clone());
        let dataset = pipeline.fit_transform(&frame, target_column)?;
        Ok(Preparation { pipeline, dataset })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use tempfile::TempDir;

    fn records() -> Vec<MatchFeatureRecord> {
        (0..30)
            .map(|i| {
                MatchFeatureRecord::new(format!("m{i}"), "Alfa", "Beta")
                    .with_field("home_goals_scored", 1.0 + (i % 5) as f64 * 0.3)
                    .with_field("away_goals_scored", 0.7 + (i % 4) as f64 * 0.2)
                    .with_field("home_shots", 8.0 + (i % 7) as f64)
                    .with_field("away_shots", 6.0 + (i % 6) as f64)
                    .with_label("result", if i % 3 == 0 { "home_win" } else { "away_win" })
            })
            .collect()
    }

    #[test]
    fn test_prepare_cached_runs_once() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(CacheConfig {
            enabled: true,
            dir: dir.path().to_path_buf(),
            ttl_hours: 24,
        });
        let config = PreparationConfig::default();
        let records = records();

        let first = prepare_cached(&cache, &config, &records, "result").unwrap();
        let second = prepare_cached(&cache, &config, &records, "result").unwrap();

        assert_eq!(
            first.dataset.features.names(),
            second.dataset.features.names()
        );
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_prepare_cached_distinct_targets_distinct_keys() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(CacheConfig {
            enabled: true,
            dir: dir.path().to_path_buf(),
            ttl_hours: 24,
        });
        let config = PreparationConfig::default();
        let records: Vec<MatchFeatureRecord> = records()
            .into_iter()
            .map(|r| r.with_label("both_teams_score", "yes"))
            .collect();

        prepare_cached(&cache, &config, &records, "result").unwrap();
        prepare_cached(&cache, &config, &records, "both_teams_score").unwrap();
        assert_eq!(cache.stats().misses, 2);
    }
}
