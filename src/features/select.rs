//! Feature scoring and dimensionality reduction
//!
//! Univariate scores rank features against the target (stage 8 of the
//! pipeline); the principal-components reduction (stage 9) retains a
//! target fraction of the total variance.

use serde::{Deserialize, Serialize};

/// Scoring function used to rank features for classification targets.
/// Regression targets always score by absolute correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureScore {
    MutualInfo,
    AnovaF,
}

/// Target values as the scorer sees them.
pub enum TargetView<'a> {
    /// Class index per row plus the class count.
    Classes(&'a [usize], usize),
    Continuous(&'a [f64]),
}

/// Score one feature column against the target. Higher is better; the
/// scale is only meaningful for ranking within one call.
pub fn score_feature(x: &[f64], target: &TargetView<'_>, method: FeatureScore) -> f64 {
    match target {
        TargetView::Classes(ids, n_classes) => match method {
            FeatureScore::AnovaF => anova_f_score(x, ids, *n_classes),
            FeatureScore::MutualInfo => mutual_info_score(x, ids, *n_classes),
        },
        TargetView::Continuous(y) => correlation_score(x, y),
    }
}

/// One-way ANOVA F statistic: between-group variance over within-group
/// variance. Degenerate inputs score 0.
fn anova_f_score(x: &[f64], class_ids: &[usize], n_classes: usize) -> f64 {
    let n = x.len();
    if n < 2 || n_classes < 2 || n <= n_classes {
        return 0.0;
    }

    let grand_mean = mean(x);
    let mut group_sums = vec![0.0; n_classes];
    let mut group_counts = vec![0usize; n_classes];
    for (&value, &class) in x.iter().zip(class_ids) {
        group_sums[class] += value;
        group_counts[class] += 1;
    }

    let mut between = 0.0;
    let mut within = 0.0;
    for class in 0..n_classes {
        if group_counts[class] == 0 {
            continue;
        }
        let group_mean = group_sums[class] / group_counts[class] as f64;
        between += group_counts[class] as f64 * (group_mean - grand_mean).powi(2);
        for (&value, &id) in x.iter().zip(class_ids) {
            if id == class {
                within += (value - group_mean).powi(2);
            }
        }
    }

    let populated = group_counts.iter().filter(|&&c| c > 0).count();
    if populated < 2 {
        return 0.0;
    }
    let df_between = (populated - 1) as f64;
    let df_within = (n - populated) as f64;
    if within <= f64::EPSILON || df_within <= 0.0 {
        return if between > f64::EPSILON { f64::MAX / 2.0 } else { 0.0 };
    }
    (between / df_between) / (within / df_within)
}

/// Mutual information between a binned continuous feature and a discrete
/// target, in nats.
fn mutual_info_score(x: &[f64], class_ids: &[usize], n_classes: usize) -> f64 {
    let n = x.len();
    if n < 2 || n_classes < 2 {
        return 0.0;
    }

    let n_bins = 10usize.min(n);
    let bins = assign_bins(x, n_bins);

    let mut joint = vec![vec![0usize; n_classes]; n_bins];
    let mut bin_totals = vec![0usize; n_bins];
    let mut class_totals = vec![0usize; n_classes];
    for (&bin, &class) in bins.iter().zip(class_ids) {
        joint[bin][class] += 1;
        bin_totals[bin] += 1;
        class_totals[class] += 1;
    }

    let total = n as f64;
    let mut mi = 0.0;
    for bin in 0..n_bins {
        for class in 0..n_classes {
            let joint_count = joint[bin][class];
            if joint_count == 0 {
                continue;
            }
            let p_joint = joint_count as f64 / total;
            let p_bin = bin_totals[bin] as f64 / total;
            let p_class = class_totals[class] as f64 / total;
            mi += p_joint * (p_joint / (p_bin * p_class)).ln();
        }
    }
    mi.max(0.0)
}

/// Equal-width binning over the observed range.
fn assign_bins(x: &[f64], n_bins: usize) -> Vec<usize> {
    let min = x.iter().copied().fold(f64::INFINITY, f64::min);
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if span <= f64::EPSILON {
        return vec![0; x.len()];
    }
    x.iter()
        .map(|&value| {
            let bin = ((value - min) / span * n_bins as f64) as usize;
            bin.min(n_bins - 1)
        })
        .collect()
}

/// Absolute Pearson correlation, used for regression targets.
fn correlation_score(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 || n != y.len() {
        return 0.0;
    }
    let mean_x = mean(x);
    let mean_y = mean(y);
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).abs()
}

fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Fitted principal-components reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaState {
    pub means: Vec<f64>,
    /// Orthonormal components, strongest first.
    pub components: Vec<Vec<f64>>,
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaState {
    /// Fit components until `variance_retain` of the total variance is
    /// explained. Returns `None` for degenerate inputs (no variance, or
    /// fewer than two rows or columns).
    pub fn fit(matrix: &[Vec<f64>], variance_retain: f64) -> Option<Self> {
        let n = matrix.len();
        let d = matrix.first().map(|r| r.len()).unwrap_or(0);
        if n < 2 || d < 2 {
            return None;
        }

        let means: Vec<f64> = (0..d)
            .map(|j| matrix.iter().map(|row| row[j]).sum::<f64>() / n as f64)
            .collect();

        // Covariance matrix of the centered data.
        let mut cov = vec![vec![0.0; d]; d];
        for row in matrix {
            for j in 0..d {
                let cj = row[j] - means[j];
                for k in j..d {
                    cov[j][k] += cj * (row[k] - means[k]);
                }
            }
        }
        let denom = (n - 1) as f64;
        for j in 0..d {
            for k in j..d {
                cov[j][k] /= denom;
                cov[k][j] = cov[j][k];
            }
        }

        let total_variance: f64 = (0..d).map(|j| cov[j][j]).sum();
        if total_variance <= f64::EPSILON {
            return None;
        }

        let mut components = Vec::new();
        let mut ratios = Vec::new();
        let mut explained = 0.0;
        while explained < variance_retain && components.len() < d {
            let (eigenvalue, vector) = dominant_eigenpair(&cov)?;
            if eigenvalue <= f64::EPSILON {
                break;
            }
            // Deflate before the next iteration.
            for j in 0..d {
                for k in 0..d {
                    cov[j][k] -= eigenvalue * vector[j] * vector[k];
                }
            }
            explained += eigenvalue / total_variance;
            ratios.push(eigenvalue / total_variance);
            components.push(vector);
        }

        if components.is_empty() {
            return None;
        }
        Some(Self {
            means,
            components,
            explained_variance_ratio: ratios,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Project one row onto the fitted components.
    pub fn apply(&self, row: &[f64]) -> Vec<f64> {
        let centered: Vec<f64> = row.iter().zip(&self.means).map(|(x, m)| x - m).collect();
        self.components
            .iter()
            .map(|component| component.iter().zip(&centered).map(|(c, x)| c * x).sum())
            .collect()
    }
}

/// Power iteration on a symmetric matrix. Deterministic start vector so
/// refits reproduce byte-identical components.
fn dominant_eigenpair(matrix: &[Vec<f64>]) -> Option<(f64, Vec<f64>)> {
    let d = matrix.len();
    let mut v = vec![1.0 / (d as f64).sqrt(); d];

    for _ in 0..200 {
        let mut next = vec![0.0; d];
        for j in 0..d {
            for k in 0..d {
                next[j] += matrix[j][k] * v[k];
            }
        }
        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm <= f64::EPSILON {
            return Some((0.0, v));
        }
        for x in &mut next {
            *x /= norm;
        }
        let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
        v = next;
        if delta < 1e-10 {
            break;
        }
    }

    // Rayleigh quotient.
    let mut mv = vec![0.0; d];
    for j in 0..d {
        for k in 0..d {
            mv[j] += matrix[j][k] * v[k];
        }
    }
    let eigenvalue: f64 = mv.iter().zip(&v).map(|(a, b)| a * b).sum();
    Some((eigenvalue, v))
}
