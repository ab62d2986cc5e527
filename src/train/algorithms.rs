//! Candidate learning algorithms
//!
//! Deterministic, dependency-free learners over dense `f64` matrices.
//! Inputs are assumed scaled by the feature pipeline. Fits start from
//! zeroed parameters, so identical data yields identical models.

use serde::{Deserialize, Serialize};

use crate::config::VotingStrategy;
use crate::error::{Error, Result};

/// Hyperparameters for gradient-descent learners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GradientHyper {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
}

impl Default for GradientHyper {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 200,
            l2: 0.001,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

fn check_training_set(x: &[Vec<f64>], targets: usize) -> Result<usize> {
    if x.is_empty() || x.len() != targets {
        return Err(Error::InsufficientData(format!(
            "{} feature rows vs {} targets",
            x.len(),
            targets
        )));
    }
    let d = x[0].len();
    if d == 0 {
        return Err(Error::InsufficientData("zero-width feature matrix".to_string()));
    }
    Ok(d)
}

/// One-vs-rest logistic regression, full-batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    classes: Vec<String>,
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl LogisticRegression {
    pub fn fit(x: &[Vec<f64>], y: &[usize], classes: &[String], hyper: &GradientHyper) -> Result<Self> {
        let d = check_training_set(x, y.len())?;
        if classes.len() < 2 {
            return Err(Error::InsufficientData("need at least two classes".to_string()));
        }

        let n = x.len() as f64;
        let mut weights = vec![vec![0.0; d]; classes.len()];
        let mut biases = vec![0.0; classes.len()];

        for (class, (w, b)) in weights.iter_mut().zip(&mut biases).enumerate() {
            for _ in 0..hyper.epochs {
                let mut grad_w = vec![0.0; d];
                let mut grad_b = 0.0;
                for (row, &label) in x.iter().zip(y) {
                    let target = if label == class { 1.0 } else { 0.0 };
                    let err = sigmoid(dot(w, row) + *b) - target;
                    for (g, &feature) in grad_w.iter_mut().zip(row) {
                        *g += err * feature;
                    }
                    grad_b += err;
                }
                for (wi, gi) in w.iter_mut().zip(&grad_w) {
                    *wi -= hyper.learning_rate * (gi / n + hyper.l2 * *wi);
                }
                *b -= hyper.learning_rate * grad_b / n;
            }
        }

        Ok(Self {
            classes: classes.to_vec(),
            weights,
            biases,
        })
    }

    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let scores: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.biases)
            .map(|(w, b)| sigmoid(dot(w, row) + b))
            .collect();
        let total: f64 = scores.iter().sum();
        if total <= f64::EPSILON {
            vec![1.0 / scores.len() as f64; scores.len()]
        } else {
            scores.iter().map(|s| s / total).collect()
        }
    }

    fn importance(&self) -> Vec<f64> {
        let d = self.weights.first().map(|w| w.len()).unwrap_or(0);
        (0..d)
            .map(|j| self.weights.iter().map(|w| w[j].abs()).sum::<f64>() / self.weights.len() as f64)
            .collect()
    }
}

/// Gaussian naive Bayes with per-class feature means and variances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNb {
    classes: Vec<String>,
    priors: Vec<f64>,
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
}

impl GaussianNb {
    const VAR_FLOOR: f64 = 1e-9;

    pub fn fit(x: &[Vec<f64>], y: &[usize], classes: &[String]) -> Result<Self> {
        let d = check_training_set(x, y.len())?;
        if classes.len() < 2 {
            return Err(Error::InsufficientData("need at least two classes".to_string()));
        }

        let k = classes.len();
        let mut counts = vec![0usize; k];
        let mut means = vec![vec![0.0; d]; k];
        for (row, &label) in x.iter().zip(y) {
            counts[label] += 1;
            for (m, &v) in means[label].iter_mut().zip(row) {
                *m += v;
            }
        }
        for (mean, &count) in means.iter_mut().zip(&counts) {
            if count == 0 {
                continue;
            }
            for m in mean.iter_mut() {
                *m /= count as f64;
            }
        }

        let mut variances = vec![vec![0.0; d]; k];
        for (row, &label) in x.iter().zip(y) {
            for j in 0..d {
                variances[label][j] += (row[j] - means[label][j]).powi(2);
            }
        }
        for (variance, &count) in variances.iter_mut().zip(&counts) {
            for v in variance.iter_mut() {
                *v = if count > 0 { *v / count as f64 } else { 0.0 };
                *v = v.max(Self::VAR_FLOOR);
            }
        }

        let n = x.len() as f64;
        let priors: Vec<f64> = counts.iter().map(|&c| (c as f64).max(1.0) / n).collect();

        Ok(Self {
            classes: classes.to_vec(),
            priors,
            means,
            variances,
        })
    }

    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let log_likelihoods: Vec<f64> = (0..self.classes.len())
            .map(|class| {
                let mut ll = self.priors[class].ln();
                for (j, &value) in row.iter().enumerate() {
                    let var = self.variances[class][j];
                    let diff = value - self.means[class][j];
                    ll += -0.5 * ((2.0 * std::f64::consts::PI * var).ln() + diff * diff / var);
                }
                ll
            })
            .collect();

        // Exp-normalize for numerical stability.
        let max = log_likelihoods.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = log_likelihoods.iter().map(|ll| (ll - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.iter().map(|e| e / total).collect()
    }
}

/// k-nearest-neighbours classifier; probabilities are neighbour vote
/// fractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    k: usize,
    classes: Vec<String>,
    points: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl KnnClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[usize], classes: &[String], k: usize) -> Result<Self> {
        check_training_set(x, y.len())?;
        if classes.len() < 2 {
            return Err(Error::InsufficientData("need at least two classes".to_string()));
        }
        Ok(Self {
            k: k.clamp(1, x.len()),
            classes: classes.to_vec(),
            points: x.to_vec(),
            labels: y.to_vec(),
        })
    }

    fn neighbours(&self, row: &[f64]) -> Vec<usize> {
        let mut distances: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, euclidean(p, row)))
            .collect();
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        distances.into_iter().take(self.k).map(|(i, _)| i).collect()
    }

    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let neighbours = self.neighbours(row);
        let mut votes = vec![0usize; self.classes.len()];
        for i in &neighbours {
            votes[self.labels[*i]] += 1;
        }
        let total = neighbours.len() as f64;
        votes.iter().map(|&v| v as f64 / total).collect()
    }
}

/// Dispatch wrapper for fitted classification models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum FittedClassifier {
    LogisticRegression(LogisticRegression),
    NaiveBayes(GaussianNb),
    Knn(KnnClassifier),
}

impl FittedClassifier {
    pub fn classes(&self) -> &[String] {
        match self {
            FittedClassifier::LogisticRegression(m) => &m.classes,
            FittedClassifier::NaiveBayes(m) => &m.classes,
            FittedClassifier::Knn(m) => &m.classes,
        }
    }

    pub fn predict_probabilities(&self, row: &[f64]) -> Vec<f64> {
        match self {
            FittedClassifier::LogisticRegression(m) => m.predict_proba_row(row),
            FittedClassifier::NaiveBayes(m) => m.predict_proba_row(row),
            FittedClassifier::Knn(m) => m.predict_proba_row(row),
        }
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_probabilities(row))
    }

    /// Per-feature importance when the model form exposes one.
    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        match self {
            FittedClassifier::LogisticRegression(m) => Some(m.importance()),
            _ => None,
        }
    }
}

/// Linear regression, full-batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearRegression {
    pub fn fit(x: &[Vec<f64>], y: &[f64], hyper: &GradientHyper) -> Result<Self> {
        let d = check_training_set(x, y.len())?;
        let n = x.len() as f64;
        let mut weights = vec![0.0; d];
        let mut bias = 0.0;

        for _ in 0..hyper.epochs {
            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;
            for (row, &target) in x.iter().zip(y) {
                let err = dot(&weights, row) + bias - target;
                for (g, &feature) in grad_w.iter_mut().zip(row) {
                    *g += err * feature;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= hyper.learning_rate * (g / n + hyper.l2 * *w);
            }
            bias -= hyper.learning_rate * grad_b / n;
        }

        Ok(Self { weights, bias })
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        dot(&self.weights, row) + self.bias
    }
}

/// Ridge regression solved in closed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    weights: Vec<f64>,
    bias: f64,
    pub alpha: f64,
}

impl RidgeRegression {
    pub fn fit(x: &[Vec<f64>], y: &[f64], alpha: f64) -> Result<Self> {
        let d = check_training_set(x, y.len())?;

        // Augment with a bias column; the bias weight is not penalized.
        let dim = d + 1;
        let mut normal = vec![vec![0.0; dim]; dim];
        let mut rhs = vec![0.0; dim];
        for (row, &target) in x.iter().zip(y) {
            let mut augmented = row.clone();
            augmented.push(1.0);
            for j in 0..dim {
                rhs[j] += augmented[j] * target;
                for k in 0..dim {
                    normal[j][k] += augmented[j] * augmented[k];
                }
            }
        }
        for (j, row) in normal.iter_mut().enumerate().take(d) {
            row[j] += alpha;
        }

        let solution = solve_linear_system(normal, rhs)
            .ok_or_else(|| Error::InsufficientData("singular normal equations".to_string()))?;
        let bias = solution[d];
        let weights = solution[..d].to_vec();
        Ok(Self { weights, bias, alpha })
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        dot(&self.weights, row) + self.bias
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = a.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in (row + 1)..n {
            sum -= a[row][col] * x[col];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// k-nearest-neighbours regressor; prediction is the neighbour mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnRegressor {
    k: usize,
    points: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], k: usize) -> Result<Self> {
        check_training_set(x, y.len())?;
        Ok(Self {
            k: k.clamp(1, x.len()),
            points: x.to_vec(),
            targets: y.to_vec(),
        })
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut distances: Vec<(f64, f64)> = self
            .points
            .iter()
            .zip(&self.targets)
            .map(|(p, &t)| (euclidean(p, row), t))
            .collect();
        distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let taken: Vec<f64> = distances.into_iter().take(self.k).map(|(_, t)| t).collect();
        taken.iter().sum::<f64>() / taken.len() as f64
    }
}

/// Dispatch wrapper for fitted regression models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum FittedRegressor {
    LinearRegression(LinearRegression),
    Ridge(RidgeRegression),
    Knn(KnnRegressor),
}

impl FittedRegressor {
    pub fn predict(&self, row: &[f64]) -> f64 {
        match self {
            FittedRegressor::LinearRegression(m) => m.predict_row(row),
            FittedRegressor::Ridge(m) => m.predict_row(row),
            FittedRegressor::Knn(m) => m.predict_row(row),
        }
    }

    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        match self {
            FittedRegressor::LinearRegression(m) => Some(m.weights.iter().map(|w| w.abs()).collect()),
            FittedRegressor::Ridge(m) => Some(m.weights.iter().map(|w| w.abs()).collect()),
            FittedRegressor::Knn(_) => None,
        }
    }
}

/// Voting ensemble over independently trained classifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingEnsemble {
    pub voting: VotingStrategy,
    /// (algorithm name, fitted model), in training order.
    pub members: Vec<(String, FittedClassifier)>,
}

impl VotingEnsemble {
    pub fn new(voting: VotingStrategy, members: Vec<(String, FittedClassifier)>) -> Result<Self> {
        if members.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "ensemble needs at least 2 members, got {}",
                members.len()
            )));
        }
        let classes = members[0].1.classes();
        if members.iter().any(|(_, m)| m.classes() != classes) {
            return Err(Error::InvalidInput("ensemble members disagree on classes".to_string()));
        }
        Ok(Self { voting, members })
    }

    pub fn classes(&self) -> &[String] {
        self.members[0].1.classes()
    }

    /// Soft voting averages member probabilities; hard voting exposes no
    /// probability vector.
    pub fn predict_probabilities(&self, row: &[f64]) -> Option<Vec<f64>> {
        match self.voting {
            VotingStrategy::Soft => {
                let k = self.classes().len();
                let mut sum = vec![0.0; k];
                for (_, member) in &self.members {
                    for (s, p) in sum.iter_mut().zip(member.predict_probabilities(row)) {
                        *s += p;
                    }
                }
                let n = self.members.len() as f64;
                Some(sum.into_iter().map(|s| s / n).collect())
            }
            VotingStrategy::Hard => None,
        }
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        match self.voting {
            VotingStrategy::Soft => argmax(&self.predict_probabilities(row).unwrap_or_default()),
            VotingStrategy::Hard => {
                let mut votes = vec![0usize; self.classes().len()];
                for (_, member) in &self.members {
                    votes[member.predict(row)] += 1;
                }
                argmax(&votes.iter().map(|&v| v as f64).collect::<Vec<f64>>())
            }
        }
    }
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
