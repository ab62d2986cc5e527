//! Recommendation generator
//!
//! Filters per-market predictions through a risk tier, sizes stakes by
//! confidence, attaches fair-odds estimates and value ratings, and
//! produces an aggregate summary. Recommendations are created once and
//! never mutated.

use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RecommendationConfig;
use crate::odds::OddsCalculator;
use crate::types::{BetType, PredictionResult, Recommendation, RecommendationSummary, RiskLevel, ValueRating};

/// One market's prediction for a match, as fed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPrediction {
    pub bet_type: BetType,
    pub result: PredictionResult,
}

/// All per-market predictions for a single match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPredictions {
    pub match_id: String,
    pub markets: Vec<MarketPrediction>,
}

/// The over/under line total-goals regressions are mapped to.
const GOALS_LINE: f64 = 2.5;

pub struct RecommendationGenerator {
    config: RecommendationConfig,
    odds: OddsCalculator,
    /// Derive a double-chance market from the result probability vector.
    include_double_chance: bool,
}

impl RecommendationGenerator {
    pub fn new(config: RecommendationConfig, odds: OddsCalculator) -> Self {
        Self {
            config,
            odds,
            include_double_chance: false,
        }
    }

    /// Enable the derived double-chance market.
    pub fn with_double_chance(mut self) -> Self {
        self.include_double_chance = true;
        self
    }

    /// Generate stake-sized recommendations for one match at the given
    /// risk tier. `max_count` falls back to the configured default.
    ///
    /// The output is sorted by confidence descending and truncated to
    /// `min(max_count, eligible_count)` entries.
    pub fn generate(
        &self,
        predictions: &MatchPredictions,
        risk_level: RiskLevel,
        max_count: Option<usize>,
    ) -> Vec<Recommendation> {
        let tier = self.config.tier(risk_level);
        let max_count = max_count.unwrap_or(self.config.max_recommendations);

        let mut candidates: Vec<(BetType, String, f64)> = predictions
            .markets
            .iter()
            .map(|market| self.market_label(market))
            .collect();
        if self.include_double_chance {
            if let Some(derived) = self.derive_double_chance(predictions) {
                candidates.push(derived);
            }
        }

        let mut recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .filter(|(bet_type, _, confidence)| {
                let eligible = *confidence >= tier.confidence_threshold;
                if !eligible {
                    debug!(
                        match_id = %predictions.match_id,
                        bet_type = %bet_type,
                        confidence,
                        threshold = tier.confidence_threshold,
                        "prediction below tier threshold"
                    );
                }
                eligible
            })
            .map(|(bet_type, prediction, confidence)| Recommendation {
                id: Uuid::new_v4(),
                match_id: predictions.match_id.clone(),
                bet_type,
                prediction,
                confidence,
                risk_level,
                fair_odds_estimate: self.odds.fair_odds(confidence),
                recommended_stake: self.stake(tier.max_stake, confidence),
                value_rating: ValueRating::from_confidence(confidence),
                created_at: Utc::now(),
            })
            .collect();

        recommendations.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        recommendations.truncate(max_count);
        info!(
            match_id = %predictions.match_id,
            risk_level = %risk_level,
            count = recommendations.len(),
            "recommendations generated"
        );
        recommendations
    }

    /// Aggregate view over a batch of recommendations.
    pub fn summary(&self, recommendations: &[Recommendation]) -> RecommendationSummary {
        let mut by_risk_level = std::collections::BTreeMap::new();
        let mut by_bet_type = std::collections::BTreeMap::new();
        for recommendation in recommendations {
            *by_risk_level.entry(recommendation.risk_level).or_insert(0) += 1;
            *by_bet_type.entry(recommendation.bet_type).or_insert(0) += 1;
        }
        let average_confidence = if recommendations.is_empty() {
            0.0
        } else {
            recommendations.iter().map(|r| r.confidence).sum::<f64>() / recommendations.len() as f64
        };
        RecommendationSummary {
            total_recommendations: recommendations.len(),
            by_risk_level,
            by_bet_type,
            average_confidence,
            total_recommended_stake: recommendations.iter().map(|r| r.recommended_stake).sum(),
            generated_at: Utc::now(),
        }
    }

    /// `tier_max_stake × confidence^e`, squared by default so high
    /// confidence is disproportionately rewarded.
    fn stake(&self, max_stake: Decimal, confidence: f64) -> Decimal {
        let scaled = max_stake.to_f64().unwrap_or(0.0) * confidence.powf(self.config.stake_exponent);
        Decimal::from_f64(scaled).unwrap_or(Decimal::ZERO).round_dp(2)
    }

    /// Label and confidence for one market, mapping regression outputs
    /// onto the 2.5-goals line.
    fn market_label(&self, market: &MarketPrediction) -> (BetType, String, f64) {
        if market.bet_type == BetType::TotalGoals {
            if let Some(expected_goals) = market.result.predicted_value {
                let over_probability = (expected_goals / 5.0).clamp(0.1, 0.9);
                return if over_probability >= 0.5 {
                    (BetType::TotalGoals, format!("over_{GOALS_LINE}"), over_probability)
                } else {
                    (BetType::TotalGoals, format!("under_{GOALS_LINE}"), 1.0 - over_probability)
                };
            }
        }
        (
            market.bet_type,
            market.result.predicted_label.clone(),
            market.result.confidence,
        )
    }

    /// Best two-outcome combination from the result probability vector.
    fn derive_double_chance(&self, predictions: &MatchPredictions) -> Option<(BetType, String, f64)> {
        let result = predictions
            .markets
            .iter()
            .find(|m| m.bet_type == BetType::MatchResult)
            .map(|m| &m.result)?;
        let home = result.probability_of("home_win")?;
        let draw = result.probability_of("draw")?;
        let away = result.probability_of("away_win")?;

        let combos = [
            ("home_or_draw", home + draw),
            ("away_or_draw", away + draw),
            ("home_or_away", home + away),
        ];
        let (label, probability) = combos
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        Some((BetType::DoubleChance, label.to_string(), probability))
    }
}
