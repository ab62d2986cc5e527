//! Odds and value-bet calculator
//!
//! Converts model probabilities into fair-odds estimates and flags
//! outcomes whose model probability materially exceeds the market-implied
//! probability, with minimum-odds floors to suppress noise on heavy
//! favorites.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OddsConfig;
use crate::error::Result;
use crate::types::MarketOdds;

/// Cap applied when a probability is too small to price.
const ODDS_CAP: Decimal = dec!(999.0);

/// Model probabilities for the three match outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultProbabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl ResultProbabilities {
    /// Rescale so the three outcomes sum to 1.
    pub fn normalized(&self) -> Self {
        let total = self.home + self.draw + self.away;
        if total <= f64::EPSILON {
            return Self {
                home: 1.0 / 3.0,
                draw: 1.0 / 3.0,
                away: 1.0 / 3.0,
            };
        }
        Self {
            home: self.home / total,
            draw: self.draw / total,
            away: self.away / total,
        }
    }
}

/// Probabilities implied by market odds, reciprocal-and-normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpliedProbabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    /// Sum of the raw reciprocals; the excess over 1.0 is the bookmaker
    /// overround.
    pub overround: f64,
}

/// A match outcome as the odds layer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "home_win",
            Outcome::Draw => "draw",
            Outcome::AwayWin => "away_win",
        }
    }
}

/// One flagged value-betting opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueOpportunity {
    pub outcome: Outcome,
    pub market_odds: Decimal,
    pub model_probability: f64,
    pub implied_probability: f64,
    /// Model probability minus implied probability.
    pub value_score: f64,
}

/// Fair-odds and value-bet computations under one configuration.
pub struct OddsCalculator {
    config: OddsConfig,
}

impl OddsCalculator {
    pub fn new(config: OddsConfig) -> Self {
        Self { config }
    }

    /// Break-even payout multiplier for a probability, adjusted by the
    /// configured bookmaker margin: `1 / (probability × margin_factor)`,
    /// capped at 999.0 for vanishing probabilities.
    pub fn fair_odds(&self, probability: f64) -> Decimal {
        let adjusted = probability * self.config.margin_factor;
        if adjusted <= 0.0 {
            return ODDS_CAP;
        }
        let odds = Decimal::from_f64(1.0 / adjusted).unwrap_or(ODDS_CAP);
        odds.min(ODDS_CAP).round_dp(2)
    }

    /// Implied probabilities from a home/draw/away odds triple: take
    /// reciprocals, then rescale so the three sum to 1.
    pub fn implied_probabilities(&self, market: &MarketOdds) -> Result<ImpliedProbabilities> {
        market.validate()?;
        let home = 1.0 / market.home.to_f64().unwrap_or(f64::MAX);
        let draw = 1.0 / market.draw.to_f64().unwrap_or(f64::MAX);
        let away = 1.0 / market.away.to_f64().unwrap_or(f64::MAX);
        let total = home + draw + away;
        Ok(ImpliedProbabilities {
            home: home / total,
            draw: draw / total,
            away: away / total,
            overround: total,
        })
    }

    /// Flag outcomes where the model's normalized probability exceeds the
    /// market-implied probability by more than the configured margin,
    /// subject to per-outcome minimum-odds floors. Ranked by value score
    /// descending, capped to the configured top-N.
    pub fn find_value_bets(
        &self,
        model: &ResultProbabilities,
        market: &MarketOdds,
    ) -> Result<Vec<ValueOpportunity>> {
        let model = model.normalized();
        let implied = self.implied_probabilities(market)?;

        let candidates = [
            (Outcome::HomeWin, model.home, implied.home, market.home, self.config.min_home_odds),
            (Outcome::Draw, model.draw, implied.draw, market.draw, self.config.min_draw_odds),
            (Outcome::AwayWin, model.away, implied.away, market.away, self.config.min_away_odds),
        ];

        let mut opportunities: Vec<ValueOpportunity> = candidates
            .into_iter()
            .filter(|(_, model_p, implied_p, odds, floor)| {
                model_p - implied_p > self.config.value_margin && *odds >= *floor
            })
            .map(|(outcome, model_p, implied_p, odds, _)| ValueOpportunity {
                outcome,
                market_odds: odds,
                model_probability: model_p,
                implied_probability: implied_p,
                value_score: model_p - implied_p,
            })
            .collect();

        opportunities.sort_by(|a, b| b.value_score.partial_cmp(&a.value_score).unwrap_or(std::cmp::Ordering::Equal));
        opportunities.truncate(self.config.max_opportunities);
        debug!(count = opportunities.len(), "value opportunities found");
        Ok(opportunities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> OddsCalculator {
        OddsCalculator::new(OddsConfig::default())
    }

    fn market() -> MarketOdds {
        MarketOdds {
            home: dec!(2.10),
            draw: dec!(3.40),
            away: dec!(3.20),
        }
    }

    #[test]
    fn test_fair_odds_with_margin() {
        let calc = calculator();
        // 1 / (0.78 * 0.8) = 1.6025...
        assert_eq!(calc.fair_odds(0.78), dec!(1.60));
        assert_eq!(calc.fair_odds(0.5), dec!(2.50));
    }

    #[test]
    fn test_fair_odds_zero_probability_capped() {
        let calc = calculator();
        assert_eq!(calc.fair_odds(0.0), dec!(999.0));
        assert_eq!(calc.fair_odds(-0.1), dec!(999.0));
        assert_eq!(calc.fair_odds(1e-6), dec!(999.0));
    }

    #[test]
    fn test_implied_probabilities_sum_to_one() {
        let calc = calculator();
        let implied = calc.implied_probabilities(&market()).unwrap();
        assert!((implied.home + implied.draw + implied.away - 1.0).abs() < 1e-12);
        // Overround above 1: the book keeps a margin.
        assert!(implied.overround > 1.0);
        assert!(implied.home > implied.away);
    }

    #[test]
    fn test_invalid_odds_rejected() {
        let calc = calculator();
        let invalid = MarketOdds {
            home: dec!(0.5),
            draw: dec!(3.40),
            away: dec!(3.20),
        };
        assert!(calc.implied_probabilities(&invalid).is_err());
    }

    #[test]
    fn test_value_bet_flagged_above_margin() {
        let calc = calculator();
        let model = ResultProbabilities {
            home: 0.60,
            draw: 0.25,
            away: 0.15,
        };
        let opportunities = calc.find_value_bets(&model, &market()).unwrap();
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].outcome, Outcome::HomeWin);
        assert!(opportunities[0].value_score > 0.05);
    }

    #[test]
    fn test_value_bet_monotonicity() {
        // Increasing the model's home probability can only turn a
        // non-value classification into a value one, never the reverse.
        let calc = calculator();
        let mut was_value = false;
        for step in 0..10 {
            let home = 0.40 + step as f64 * 0.05;
            let rest = (1.0 - home) / 2.0;
            let model = ResultProbabilities {
                home,
                draw: rest,
                away: rest,
            };
            let is_value = calc
                .find_value_bets(&model, &market())
                .unwrap()
                .iter()
                .any(|o| o.outcome == Outcome::HomeWin);
            assert!(!was_value || is_value, "value flag reversed at home={home}");
            was_value = is_value;
        }
        assert!(was_value);
    }

    #[test]
    fn test_odds_floor_suppresses_favorites() {
        let calc = calculator();
        // Heavy home favorite: odds below the 2.0 floor.
        let favorite = MarketOdds {
            home: dec!(1.30),
            draw: dec!(5.00),
            away: dec!(9.00),
        };
        let model = ResultProbabilities {
            home: 0.95,
            draw: 0.03,
            away: 0.02,
        };
        let opportunities = calc.find_value_bets(&model, &favorite).unwrap();
        assert!(opportunities.iter().all(|o| o.outcome != Outcome::HomeWin));
    }

    #[test]
    fn test_opportunities_ranked_and_capped() {
        let config = OddsConfig {
            max_opportunities: 1,
            value_margin: 0.01,
            ..Default::default()
        };
        let calc = OddsCalculator::new(config);
        // Both home and draw are value; only the better one survives.
        let spread = MarketOdds {
            home: dec!(2.50),
            draw: dec!(4.00),
            away: dec!(3.00),
        };
        let model = ResultProbabilities {
            home: 0.50,
            draw: 0.32,
            away: 0.18,
        };
        let opportunities = calc.find_value_bets(&model, &spread).unwrap();
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].outcome, Outcome::HomeWin);
    }

    #[test]
    fn test_normalized_probabilities() {
        let raw = ResultProbabilities {
            home: 2.0,
            draw: 1.0,
            away: 1.0,
        };
        let normalized = raw.normalized();
        assert!((normalized.home - 0.5).abs() < 1e-12);
        assert!((normalized.home + normalized.draw + normalized.away - 1.0).abs() < 1e-12);
    }
}
