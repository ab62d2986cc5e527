//! Engine configuration
//!
//! Every section deserializes from TOML with documented defaults, so an
//! empty document yields a fully working configuration. The engine takes
//! its configuration explicitly at construction; there is no global state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

use crate::types::RiskLevel;

/// Top-level configuration threaded through the engine at construction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub odds: OddsConfig,
    #[serde(default)]
    pub recommendation: RecommendationConfig,
}

/// Cache manager settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// When disabled, every `get` is a miss and every `set` is a no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory holding one file per cache key.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Entries older than this are invalid and removed on next access.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

/// Artifact storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding model blobs and companion metadata documents.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
        }
    }
}

/// How the trainer picks the model persisted for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Keep the single candidate with the best F1 (or R²).
    BestSingle,
    /// Combine all successfully trained candidates into a voting ensemble.
    Ensemble,
}

/// Voting rule for ensembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingStrategy {
    /// Average class probabilities across members.
    Soft,
    /// Majority vote over member labels.
    Hard,
}

/// Model training & selection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of samples used for training (remainder held out).
    #[serde(default = "default_train_split")]
    pub train_split: f64,
    /// Seed for the stratified split shuffle; fixed seed → fixed split.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default)]
    pub hyperparameter_search: bool,
    /// Retrain even when a valid artifact already exists for the target.
    #[serde(default)]
    pub force_retrain: bool,
    #[serde(default = "default_selection")]
    pub selection: SelectionStrategy,
    #[serde(default = "default_voting")]
    pub voting: VotingStrategy,
    /// An ensemble below this member count is a training failure.
    #[serde(default = "default_min_ensemble_members")]
    pub min_ensemble_members: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_split: default_train_split(),
            random_state: default_random_state(),
            hyperparameter_search: false,
            force_retrain: false,
            selection: default_selection(),
            voting: default_voting(),
            min_ensemble_members: default_min_ensemble_members(),
        }
    }
}

/// Odds / value-bet settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OddsConfig {
    /// Assumed bookmaker margin applied when estimating fair odds.
    #[serde(default = "default_margin_factor")]
    pub margin_factor: f64,
    /// Model probability must exceed the market-implied probability by
    /// this much before an outcome counts as a value bet.
    #[serde(default = "default_value_margin")]
    pub value_margin: f64,
    /// Minimum market odds per outcome; suppresses noise on favorites.
    #[serde(default = "default_min_home_odds")]
    pub min_home_odds: Decimal,
    #[serde(default = "default_min_draw_odds")]
    pub min_draw_odds: Decimal,
    #[serde(default = "default_min_away_odds")]
    pub min_away_odds: Decimal,
    /// Value opportunities are capped to this many, best first.
    #[serde(default = "default_max_opportunities")]
    pub max_opportunities: usize,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            margin_factor: default_margin_factor(),
            value_margin: default_value_margin(),
            min_home_odds: default_min_home_odds(),
            min_draw_odds: default_min_draw_odds(),
            min_away_odds: default_min_away_odds(),
            max_opportunities: default_max_opportunities(),
        }
    }
}

/// One risk tier: confidence gate plus stake ceiling.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskTierConfig {
    pub confidence_threshold: f64,
    pub max_stake: Decimal,
}

/// Recommendation generator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_low_tier")]
    pub low: RiskTierConfig,
    #[serde(default = "default_medium_tier")]
    pub medium: RiskTierConfig,
    #[serde(default = "default_high_tier")]
    pub high: RiskTierConfig,
    /// Stake = tier max stake × confidence ^ exponent. The default of 2.0
    /// disproportionately rewards high-confidence predictions.
    #[serde(default = "default_stake_exponent")]
    pub stake_exponent: f64,
    /// Default cap on recommendations per match when the caller gives none.
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,
}

impl RecommendationConfig {
    pub fn tier(&self, level: RiskLevel) -> &RiskTierConfig {
        match level {
            RiskLevel::Low => &self.low,
            RiskLevel::Medium => &self.medium,
            RiskLevel::High => &self.high,
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            low: default_low_tier(),
            medium: default_medium_tier(),
            high: default_high_tier(),
            stake_exponent: default_stake_exponent(),
            max_recommendations: default_max_recommendations(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_train_split() -> f64 {
    0.8
}

fn default_random_state() -> u64 {
    42
}

fn default_selection() -> SelectionStrategy {
    SelectionStrategy::Ensemble
}

fn default_voting() -> VotingStrategy {
    VotingStrategy::Soft
}

fn default_min_ensemble_members() -> usize {
    2
}

fn default_margin_factor() -> f64 {
    0.8
}

fn default_value_margin() -> f64 {
    0.05
}

fn default_min_home_odds() -> Decimal {
    dec!(2.0)
}

fn default_min_draw_odds() -> Decimal {
    dec!(3.0)
}

fn default_min_away_odds() -> Decimal {
    dec!(2.5)
}

fn default_max_opportunities() -> usize {
    5
}

fn default_low_tier() -> RiskTierConfig {
    RiskTierConfig {
        confidence_threshold: 0.8,
        max_stake: dec!(100),
    }
}

fn default_medium_tier() -> RiskTierConfig {
    RiskTierConfig {
        confidence_threshold: 0.7,
        max_stake: dec!(200),
    }
}

fn default_high_tier() -> RiskTierConfig {
    RiskTierConfig {
        confidence_threshold: 0.6,
        max_stake: dec!(500),
    }
}

fn default_stake_exponent() -> f64 {
    2.0
}

fn default_max_recommendations() -> usize {
    5
}
