//! Evaluation metrics for trained candidates

use serde::{Deserialize, Serialize};

/// Classification metrics, macro-averaged over classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision_macro: f64,
    pub recall_macro: f64,
    pub f1_macro: f64,
    /// Only for binary targets with probability output.
    pub roc_auc: Option<f64>,
}

/// Regression metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Metrics stored on an artifact, tagged by task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum EvaluationMetrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

impl EvaluationMetrics {
    /// The score candidates are ranked by: F1 macro or R².
    pub fn selection_score(&self) -> f64 {
        match self {
            EvaluationMetrics::Classification(m) => m.f1_macro,
            EvaluationMetrics::Regression(m) => m.r2,
        }
    }
}

/// Evaluate class predictions against truth. `n_classes` covers every
/// class index occurring in either slice.
pub fn classification_metrics(
    y_true: &[usize],
    y_pred: &[usize],
    n_classes: usize,
    positive_probabilities: Option<&[f64]>,
) -> ClassificationMetrics {
    let n = y_true.len();
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    let accuracy = if n == 0 { 0.0 } else { correct as f64 / n as f64 };

    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;
    for class in 0..n_classes {
        let tp = y_true
            .iter()
            .zip(y_pred)
            .filter(|(&t, &p)| t == class && p == class)
            .count() as f64;
        let fp = y_true
            .iter()
            .zip(y_pred)
            .filter(|(&t, &p)| t != class && p == class)
            .count() as f64;
        let fn_ = y_true
            .iter()
            .zip(y_pred)
            .filter(|(&t, &p)| t == class && p != class)
            .count() as f64;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        precision_sum += precision;
        recall_sum += recall;
        f1_sum += f1;
    }

    let k = n_classes.max(1) as f64;
    let roc_auc = match (n_classes, positive_probabilities) {
        (2, Some(scores)) => binary_roc_auc(y_true, scores),
        _ => None,
    };

    ClassificationMetrics {
        accuracy,
        precision_macro: precision_sum / k,
        recall_macro: recall_sum / k,
        f1_macro: f1_sum / k,
        roc_auc,
    }
}

/// AUC via the rank-sum formulation: probability a random positive scores
/// above a random negative. Class index 1 is the positive class.
fn binary_roc_auc(y_true: &[usize], scores: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&t| t == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut pairs: Vec<(f64, usize)> = scores.iter().copied().zip(y_true.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // Average ranks over ties.
    let mut rank_sum_positive = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        let avg_rank = (i + j + 1) as f64 / 2.0;
        for pair in &pairs[i..j] {
            if pair.1 == 1 {
                rank_sum_positive += avg_rank;
            }
        }
        i = j;
    }

    let p = positives as f64;
    let q = negatives as f64;
    Some((rank_sum_positive - p * (p + 1.0) / 2.0) / (p * q))
}

/// Evaluate continuous predictions against truth.
pub fn regression_metrics(y_true: &[f64], y_pred: &[f64]) -> RegressionMetrics {
    let n = y_true.len();
    if n == 0 {
        return RegressionMetrics {
            rmse: 0.0,
            mae: 0.0,
            r2: 0.0,
        };
    }

    let mse = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n as f64;
    let mae = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n as f64;

    let mean = y_true.iter().sum::<f64>() / n as f64;
    let ss_total: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_residual: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let r2 = if ss_total <= f64::EPSILON {
        0.0
    } else {
        1.0 - ss_residual / ss_total
    };

    RegressionMetrics {
        rmse: mse.sqrt(),
        mae,
        r2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_classification() {
        let y = vec![0, 1, 2, 0, 1, 2];
        let m = classification_metrics(&y, &y, 3, None);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision_macro, 1.0);
        assert_eq!(m.recall_macro, 1.0);
        assert_eq!(m.f1_macro, 1.0);
        assert!(m.roc_auc.is_none());
    }

    #[test]
    fn test_partial_classification() {
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 1, 1, 1];
        let m = classification_metrics(&y_true, &y_pred, 2, None);
        assert_eq!(m.accuracy, 0.75);
        // Class 0: p=1.0 r=0.5 f1=2/3. Class 1: p=2/3 r=1.0 f1=0.8.
        assert!((m.f1_macro - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_roc_auc_ordering() {
        let y_true = vec![0, 0, 1, 1];
        let separable = vec![0.1, 0.2, 0.8, 0.9];
        let m = classification_metrics(&y_true, &[0, 0, 1, 1], 2, Some(&separable));
        assert_eq!(m.roc_auc, Some(1.0));

        let random = vec![0.5, 0.5, 0.5, 0.5];
        let m = classification_metrics(&y_true, &[0, 0, 1, 1], 2, Some(&random));
        assert_eq!(m.roc_auc, Some(0.5));
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = vec![1.0, 2.0, 3.0, 4.0];
        let m = regression_metrics(&y_true, &y_true);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);

        let y_pred = vec![1.5, 2.5, 2.5, 3.5];
        let m = regression_metrics(&y_true, &y_pred);
        assert_eq!(m.rmse, 0.5);
        assert_eq!(m.mae, 0.5);
        assert!(m.r2 > 0.7 && m.r2 < 1.0);
    }

    #[test]
    fn test_selection_score() {
        let classification = EvaluationMetrics::Classification(ClassificationMetrics {
            accuracy: 0.9,
            precision_macro: 0.8,
            recall_macro: 0.8,
            f1_macro: 0.85,
            roc_auc: None,
        });
        assert_eq!(classification.selection_score(), 0.85);

        let regression = EvaluationMetrics::Regression(RegressionMetrics {
            rmse: 0.4,
            mae: 0.3,
            r2: 0.7,
        });
        assert_eq!(regression.selection_score(), 0.7);
    }
}
