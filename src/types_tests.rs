//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_bet_type_serialization() {
        assert_eq!(
            serde_json::to_string(&BetType::MatchResult).unwrap(),
            "\"match_result\""
        );
        assert_eq!(
            serde_json::to_string(&BetType::BothTeamsScore).unwrap(),
            "\"both_teams_score\""
        );
        let parsed: BetType = serde_json::from_str("\"total_goals\"").unwrap();
        assert_eq!(parsed, BetType::TotalGoals);
    }

    #[test]
    fn test_bet_type_target_columns() {
        assert_eq!(BetType::MatchResult.target_column(), Some("result"));
        assert_eq!(BetType::TotalGoals.target_column(), Some("total_goals"));
        assert_eq!(BetType::BothTeamsScore.target_column(), Some("both_teams_score"));
        assert_eq!(BetType::DoubleChance.target_column(), None);
    }

    #[test]
    fn test_risk_level_serialization() {
        assert_eq!(serde_json::to_string(&RiskLevel::Low).unwrap(), "\"low\"");
        let parsed: RiskLevel = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, RiskLevel::Medium);
        assert_eq!(RiskLevel::High.to_string(), "high");
    }

    #[test]
    fn test_field_value_untagged_deserialization() {
        let number: FieldValue = serde_json::from_str("2.3").unwrap();
        assert_eq!(number.as_f64(), Some(2.3));

        let flag: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(flag, FieldValue::Bool(true));
        assert_eq!(flag.as_f64(), Some(1.0));

        let stamp: FieldValue = serde_json::from_str("\"2025-03-01T15:00:00Z\"").unwrap();
        assert!(stamp.as_timestamp().is_some());

        let text: FieldValue = serde_json::from_str("\"home_win\"").unwrap();
        assert_eq!(text.as_text(), Some("home_win"));

        let missing: FieldValue = serde_json::from_str("null").unwrap();
        assert!(missing.is_missing());
    }

    #[test]
    fn test_match_record_builder_and_sorted_fields() {
        let record = MatchFeatureRecord::new("m1", "Alfa", "Beta")
            .with_field("home_shots", 12.0)
            .with_field("away_shots", 10.0)
            .with_field("home_goals_scored", 2.3)
            .with_label("result", "home_win");

        assert_eq!(record.numeric("home_shots"), Some(12.0));
        assert_eq!(record.numeric("unknown"), None);
        // BTreeMap keeps field order deterministic.
        let names: Vec<&String> = record.fields.keys().collect();
        assert_eq!(names, vec!["away_shots", "home_goals_scored", "home_shots"]);
        assert_eq!(
            record.labels.get("result"),
            Some(&FieldValue::Text("home_win".to_string()))
        );
    }

    #[test]
    fn test_market_odds_validation() {
        assert!(MarketOdds::new(dec!(2.10), dec!(3.40), dec!(3.20)).is_ok());
        assert!(MarketOdds::new(dec!(0.90), dec!(3.40), dec!(3.20)).is_err());
        assert!(MarketOdds::new(dec!(2.10), dec!(3.40), dec!(0.0)).is_err());
    }

    #[test]
    fn test_prediction_result_probability_lookup() {
        let result = PredictionResult {
            model_key: "result_ensemble_x".to_string(),
            predicted_label: "home_win".to_string(),
            confidence: 0.6,
            probabilities: vec![0.6, 0.25, 0.15],
            classes: vec![
                "home_win".to_string(),
                "draw".to_string(),
                "away_win".to_string(),
            ],
            predicted_value: None,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        };
        assert_eq!(result.probability_of("draw"), Some(0.25));
        assert_eq!(result.probability_of("unknown"), None);
    }

    #[test]
    fn test_value_rating_band_edges() {
        assert_eq!(ValueRating::from_confidence(0.8), ValueRating::Excellent);
        assert_eq!(ValueRating::from_confidence(0.7999), ValueRating::Good);
        assert_eq!(ValueRating::from_confidence(0.7), ValueRating::Good);
        assert_eq!(ValueRating::from_confidence(0.6), ValueRating::Fair);
        assert_eq!(ValueRating::from_confidence(0.5999), ValueRating::Poor);
    }

    #[test]
    fn test_recommendation_serialization_roundtrip() {
        let recommendation = Recommendation {
            id: uuid::Uuid::new_v4(),
            match_id: "m1".to_string(),
            bet_type: BetType::MatchResult,
            prediction: "home_win".to_string(),
            confidence: 0.78,
            risk_level: RiskLevel::Medium,
            fair_odds_estimate: dec!(1.60),
            recommended_stake: dec!(121.68),
            value_rating: ValueRating::Good,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&recommendation).unwrap();
        let restored: Recommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, recommendation.id);
        assert_eq!(restored.bet_type, BetType::MatchResult);
        assert_eq!(restored.recommended_stake, dec!(121.68));
        assert_eq!(restored.value_rating, ValueRating::Good);
    }
}
