//! Core domain types shared across the engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A single named field of a match record.
///
/// Deserialization is untagged, so plain JSON scalars map directly:
/// numbers, booleans, RFC 3339 strings (timestamps), other strings, null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Text(String),
    Missing,
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// Normalized feature record for one match, supplied by external data
/// collectors. Field order is deterministic (sorted by name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFeatureRecord {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    /// Feature fields (team stats, form, market odds, timestamps).
    pub fields: BTreeMap<String, FieldValue>,
    /// Target labels, present on historical records used for training.
    pub labels: BTreeMap<String, FieldValue>,
}

impl MatchFeatureRecord {
    pub fn new(match_id: impl Into<String>, home_team: impl Into<String>, away_team: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            home_team: home_team.into(),
            away_team: away_team.into(),
            fields: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|v| v.as_f64())
    }
}

/// Supported wager categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    MatchResult,
    TotalGoals,
    BothTeamsScore,
    /// Derived from the match-result probability vector; no model of its own.
    DoubleChance,
}

impl BetType {
    /// The label column a trained model for this market predicts.
    pub fn target_column(&self) -> Option<&'static str> {
        match self {
            BetType::MatchResult => Some("result"),
            BetType::TotalGoals => Some("total_goals"),
            BetType::BothTeamsScore => Some("both_teams_score"),
            BetType::DoubleChance => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::MatchResult => "match_result",
            BetType::TotalGoals => "total_goals",
            BetType::BothTeamsScore => "both_teams_score",
            BetType::DoubleChance => "double_chance",
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tier selected by the caller; thresholds and stakes come from
/// [`crate::config::RecommendationConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative rating banded by confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ValueRating {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ValueRating::Excellent
        } else if confidence >= 0.7 {
            ValueRating::Good
        } else if confidence >= 0.6 {
            ValueRating::Fair
        } else {
            ValueRating::Poor
        }
    }
}

/// Decimal odds quoted by a bookmaker for the three match outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    pub home: Decimal,
    pub draw: Decimal,
    pub away: Decimal,
}

impl MarketOdds {
    pub fn new(home: Decimal, draw: Decimal, away: Decimal) -> Result<Self> {
        let odds = Self { home, draw, away };
        odds.validate()?;
        Ok(odds)
    }

    /// Decimal odds below 1.0 would imply probabilities above certainty.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("home", self.home), ("draw", self.draw), ("away", self.away)] {
            if value < Decimal::ONE {
                return Err(Error::InvalidInput(format!(
                    "market odds '{name}' must be >= 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Output of the prediction engine for one model and one input row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Storage key of the artifact that produced this prediction.
    pub model_key: String,
    pub predicted_label: String,
    /// Max class probability, or 1.0 when the algorithm exposes none.
    pub confidence: f64,
    /// Per-class probabilities, aligned with `classes`. Empty for
    /// regressors and hard-voting ensembles.
    pub probabilities: Vec<f64>,
    pub classes: Vec<String>,
    /// Raw output of a regression model, when applicable.
    pub predicted_value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PredictionResult {
    pub fn probability_of(&self, label: &str) -> Option<f64> {
        self.classes
            .iter()
            .position(|c| c == label)
            .and_then(|i| self.probabilities.get(i).copied())
    }
}

/// A stake-sized betting recommendation. Created once by the
/// recommendation generator, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub match_id: String,
    pub bet_type: BetType,
    pub prediction: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub fair_odds_estimate: Decimal,
    pub recommended_stake: Decimal,
    pub value_rating: ValueRating,
    pub created_at: DateTime<Utc>,
}

/// Aggregate view over a batch of recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSummary {
    pub total_recommendations: usize,
    pub by_risk_level: BTreeMap<RiskLevel, usize>,
    pub by_bet_type: BTreeMap<BetType, usize>,
    pub average_confidence: f64,
    pub total_recommended_stake: Decimal,
    pub generated_at: DateTime<Utc>,
}
