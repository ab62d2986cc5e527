//! Artifact persistence
//!
//! One JSON blob per trained model (`<key>.json`) plus a companion
//! metadata document (`<key>.meta.json`). Keys embed the target, the
//! algorithm slug and a timestamp; retraining always produces a new key,
//! never an overwrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::train::metrics::EvaluationMetrics;
use crate::train::Artifact;

/// Companion metadata document. Key set is part of the external
/// contract: `model_type, training_date, features_count, model_class,
/// metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_type: String,
    pub training_date: DateTime<Utc>,
    pub features_count: usize,
    pub model_class: String,
    pub metrics: EvaluationMetrics,
}

/// File-backed model store.
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.models_dir)
            .map_err(|e| Error::ArtifactStore(format!("models directory unavailable: {e}")))?;
        Ok(Self {
            dir: config.models_dir,
        })
    }

    /// Persist blob + metadata under a fresh timestamped key.
    pub fn save(&self, artifact: &Artifact) -> Result<String> {
        let short_id = artifact.id().simple().to_string()[..8].to_string();
        let key = format!(
            "{}_{}_{}_{}",
            artifact.target_column(),
            artifact.algorithm_name(),
            artifact.trained_at().format("%Y%m%d_%H%M%S"),
            short_id,
        );

        let blob = serde_json::to_vec_pretty(artifact)
            .map_err(|e| Error::ArtifactStore(format!("serialize '{key}': {e}")))?;
        fs::write(self.blob_path(&key), blob)
            .map_err(|e| Error::ArtifactStore(format!("write '{key}': {e}")))?;

        let metadata = ArtifactMetadata {
            model_type: artifact.model_type().to_string(),
            training_date: artifact.trained_at(),
            features_count: artifact.feature_names().len(),
            model_class: artifact.model_class().to_string(),
            metrics: artifact.evaluation_metrics().clone(),
        };
        let meta = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| Error::ArtifactStore(format!("serialize metadata '{key}': {e}")))?;
        fs::write(self.meta_path(&key), meta)
            .map_err(|e| Error::ArtifactStore(format!("write metadata '{key}': {e}")))?;

        info!(key = %key, "artifact saved");
        Ok(key)
    }

    /// Load a persisted artifact. A missing or corrupt blob is an
    /// [`Error::ArtifactLoad`]; there is no fallback.
    pub fn load(&self, key: &str) -> Result<Artifact> {
        let path = self.blob_path(key);
        let raw = fs::read(&path).map_err(|e| Error::ArtifactLoad(format!("artifact '{key}': {e}")))?;
        serde_json::from_slice(&raw).map_err(|e| Error::ArtifactLoad(format!("artifact '{key}' corrupt: {e}")))
    }

    pub fn metadata(&self, key: &str) -> Result<ArtifactMetadata> {
        let raw = fs::read(self.meta_path(key))
            .map_err(|e| Error::ArtifactLoad(format!("metadata '{key}': {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::ArtifactLoad(format!("metadata '{key}' corrupt: {e}")))
    }

    /// Every stored key, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(stem) = name.strip_suffix(".json") {
                    if !stem.ends_with(".meta") {
                        keys.push(stem.to_string());
                    }
                }
            }
        }
        keys.sort();
        keys
    }

    /// Newest valid artifact key for a target, by recorded training date.
    pub fn latest(&self, target_column: &str) -> Option<String> {
        let model_type = format!("{target_column}_prediction");
        let mut newest: Option<(DateTime<Utc>, String)> = None;
        for key in self.list() {
            if !key.starts_with(&format!("{target_column}_")) {
                continue;
            }
            let metadata = match self.metadata(&key) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping artifact with unreadable metadata");
                    continue;
                }
            };
            if metadata.model_type != model_type {
                continue;
            }
            let candidate = (metadata.training_date, key);
            if newest.as_ref().map(|n| candidate > *n).unwrap_or(true) {
                newest = Some(candidate);
            }
        }
        let result = newest.map(|(_, key)| key);
        debug!(wager_target = target_column, latest = ?result, "latest artifact lookup");
        result
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.meta.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::metrics::ClassificationMetrics;
    use crate::train::{FittedModel, TrainedModelArtifact};
    use crate::train::algorithms::{FittedClassifier, GaussianNb};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sample_artifact(target: &str, trained_at: DateTime<Utc>) -> Artifact {
        let x = vec![vec![1.0, 0.0], vec![-1.0, 0.5], vec![1.2, 0.1], vec![-0.8, 0.4]];
        let y = vec![0, 1, 0, 1];
        let classes = vec!["away_win".to_string(), "home_win".to_string()];
        let model = GaussianNb::fit(&x, &y, &classes).unwrap();

        Artifact::Single(TrainedModelArtifact {
            id: Uuid::new_v4(),
            model_type: format!("{target}_prediction"),
            target_column: target.to_string(),
            algorithm_name: "naive_bayes".to_string(),
            trained_at,
            feature_names: vec!["form_diff".to_string(), "attack_ratio".to_string()],
            model: FittedModel::Classifier(FittedClassifier::NaiveBayes(model)),
            evaluation_metrics: EvaluationMetrics::Classification(ClassificationMetrics {
                accuracy: 0.75,
                precision_macro: 0.7,
                recall_macro: 0.7,
                f1_macro: 0.72,
                roc_auc: Some(0.8),
            }),
            feature_importance: vec![("form_diff".to_string(), 1.4)],
        })
    }

    fn store(dir: &TempDir) -> ModelStore {
        ModelStore::new(StorageConfig {
            models_dir: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let artifact = sample_artifact("result", Utc::now());
        let key = store.save(&artifact).unwrap();
        assert!(key.starts_with("result_naive_bayes_"));

        let loaded = store.load(&key).unwrap();
        assert_eq!(loaded.target_column(), "result");
        assert_eq!(loaded.feature_names(), artifact.feature_names());
        assert_eq!(loaded.id(), artifact.id());
    }

    #[test]
    fn test_metadata_document_fixed_keys() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let key = store.save(&sample_artifact("result", Utc::now())).unwrap();
        let metadata = store.metadata(&key).unwrap();
        assert_eq!(metadata.model_type, "result_prediction");
        assert_eq!(metadata.features_count, 2);
        assert_eq!(metadata.model_class, "GaussianNb");

        // The on-disk document carries exactly the contract keys.
        let raw = fs::read(dir.path().join(format!("{key}.meta.json"))).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let object = value.as_object().unwrap();
        for field in ["model_type", "training_date", "features_count", "model_class", "metrics"] {
            assert!(object.contains_key(field), "missing '{field}'");
        }
        assert_eq!(object.len(), 5);
    }

    #[test]
    fn test_latest_picks_newest_per_target() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let older = Utc::now() - chrono::Duration::hours(5);
        let newer = Utc::now();
        store.save(&sample_artifact("result", older)).unwrap();
        let newest_key = store.save(&sample_artifact("result", newer)).unwrap();
        store.save(&sample_artifact("both_teams_score", Utc::now())).unwrap();

        assert_eq!(store.latest("result"), Some(newest_key));
        assert!(store.latest("total_goals").is_none());
    }

    #[test]
    fn test_load_missing_artifact_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(store.load("ghost"), Err(Error::ArtifactLoad(_))));
    }

    #[test]
    fn test_load_corrupt_artifact_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(dir.path().join("bad.json"), b"not json").unwrap();
        assert!(matches!(store.load("bad"), Err(Error::ArtifactLoad(_))));
    }

    #[test]
    fn test_list_excludes_metadata_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = store.save(&sample_artifact("result", Utc::now())).unwrap();
        assert_eq!(store.list(), vec![key]);
    }
}
