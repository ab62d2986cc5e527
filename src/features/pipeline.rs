//! Preparation pipeline: impute, expand, encode, scale, select
//!
//! `fit_transform` learns every transformer from training data and applies
//! it; `transform` replays the exact same transform on new data without
//! refitting. All fitted state lives in one serializable [`FittedPipeline`].
//!
//! Output invariant: zero missing values, fixed column order, numeric only.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::features::frame::{stringify_cell, ColumnKind, FeatureFrame};
use crate::features::select::{score_feature, FeatureScore, PcaState, TargetView};
use crate::types::FieldValue;

/// Scaling strategy for numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    Standard,
    MinMax,
    Robust,
}

/// Caller-tunable pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationConfig {
    #[serde(default = "default_scaling")]
    pub scaling: ScalingMethod,
    /// Expand datetime columns into calendar features, dropping the source.
    #[serde(default = "default_true")]
    pub expand_dates: bool,
    /// Feature groups to combine into product (and, for pairs, ratio)
    /// columns.
    #[serde(default)]
    pub interaction_groups: Vec<Vec<String>>,
    /// Keep at most this many features, ranked by score.
    #[serde(default = "default_select_k")]
    pub select_k: usize,
    #[serde(default = "default_score")]
    pub score: FeatureScore,
    /// When set, project onto principal components retaining this variance
    /// fraction.
    #[serde(default)]
    pub variance_retain: Option<f64>,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            scaling: default_scaling(),
            expand_dates: true,
            interaction_groups: Vec::new(),
            select_k: default_select_k(),
            score: default_score(),
            variance_retain: None,
        }
    }
}

fn default_scaling() -> ScalingMethod {
    ScalingMethod::Standard
}

fn default_true() -> bool {
    true
}

fn default_select_k() -> usize {
    20
}

fn default_score() -> FeatureScore {
    FeatureScore::MutualInfo
}

/// Per-column imputation learned at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Imputer {
    Median(f64),
    Mode(FieldValue),
    /// Forward fill; leading gaps on new data fall back to this value.
    ForwardFill { fallback: DateTime<Utc> },
    EmptyText,
}

/// Per-column categorical encoding learned at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Encoder {
    /// Category position becomes the value; unseen categories map past the
    /// end.
    Ordinal { categories: Vec<String> },
    /// One indicator column per category except the first; unseen
    /// categories encode as all zeros.
    OneHot { categories: Vec<String> },
}

/// Per-column scaling parameters learned at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Scaler {
    Standard { mean: f64, std: f64 },
    MinMax { min: f64, max: f64 },
    Robust { median: f64, iqr: f64 },
}

impl Scaler {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Scaler::Standard { mean, std } => {
                if *std <= f64::EPSILON {
                    0.0
                } else {
                    (x - mean) / std
                }
            }
            Scaler::MinMax { min, max } => {
                let span = max - min;
                if span <= f64::EPSILON {
                    0.0
                } else {
                    (x - min) / span
                }
            }
            Scaler::Robust { median, iqr } => {
                if *iqr <= f64::EPSILON {
                    0.0
                } else {
                    (x - median) / iqr
                }
            }
        }
    }
}

/// The target column as extracted during preparation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TargetColumn {
    /// Categorical target: one label per row.
    Classes(Vec<String>),
    /// Continuous target.
    Continuous(Vec<f64>),
}

impl TargetColumn {
    pub fn len(&self) -> usize {
        match self {
            TargetColumn::Classes(labels) => labels.len(),
            TargetColumn::Continuous(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `fit_transform` output: prepared features plus the extracted target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedDataset {
    pub features: FeatureFrame,
    pub target: TargetColumn,
}

/// Everything learned at fit time, serialized together so the exact same
/// transform replays on new data without refitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub target_column: String,
    /// Raw input columns expected by `transform` (target excluded).
    pub input_columns: Vec<String>,
    imputers: BTreeMap<String, Imputer>,
    date_columns: Vec<String>,
    encoders: BTreeMap<String, Encoder>,
    boolean_columns: Vec<String>,
    dropped_text: Vec<String>,
    interaction_groups: Vec<Vec<String>>,
    scalers: BTreeMap<String, Scaler>,
    /// Feature scores against the target, best first.
    pub scores: Vec<(String, f64)>,
    selected: Option<Vec<String>>,
    pca: Option<PcaState>,
    pca_input_columns: Vec<String>,
    /// Final column order of prepared output.
    pub output_columns: Vec<String>,
}

/// The preparation pipeline. Construct once per target, fit on training
/// data, then reuse for every transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePipeline {
    config: PreparationConfig,
    fitted: Option<FittedPipeline>,
}

impl FeaturePipeline {
    pub fn new(config: PreparationConfig) -> Self {
        Self { config, fitted: None }
    }

    pub fn from_fitted(config: PreparationConfig, fitted: FittedPipeline) -> Self {
        Self {
            config,
            fitted: Some(fitted),
        }
    }

    pub fn fitted(&self) -> Option<&FittedPipeline> {
        self.fitted.as_ref()
    }

    /// Learn all transformers from `frame` and return the prepared
    /// dataset. Rows with a missing target are dropped.
    pub fn fit_transform(&mut self, frame: &FeatureFrame, target_column: &str) -> Result<PreparedDataset> {
        if frame.is_empty() {
            return Err(Error::InsufficientData("empty input frame".to_string()));
        }
        let mut work = frame.clone();
        let target_values = work
            .take_column(target_column)
            .ok_or_else(|| Error::InvalidInput(format!("target column '{target_column}' not found")))?;

        // Drop rows without a target before fitting anything.
        let keep: Vec<bool> = target_values.iter().map(|v| !v.is_missing()).collect();
        let dropped = keep.iter().filter(|&&k| !k).count();
        if dropped > 0 {
            warn!(dropped, wager_target = target_column, "dropping rows with missing target");
            work = work.filter_rows(&keep);
        }
        let target_values: Vec<FieldValue> = target_values
            .into_iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(v, _)| v)
            .collect();
        if work.n_rows() == 0 {
            return Err(Error::InsufficientData(format!(
                "no rows with a '{target_column}' label"
            )));
        }

        let target = build_target(&target_values);
        let input_columns: Vec<String> = work.names().to_vec();

        let mut fitted = FittedPipeline {
            target_column: target_column.to_string(),
            input_columns,
            imputers: BTreeMap::new(),
            date_columns: Vec::new(),
            encoders: BTreeMap::new(),
            boolean_columns: Vec::new(),
            dropped_text: Vec::new(),
            interaction_groups: self.config.interaction_groups.clone(),
            scalers: BTreeMap::new(),
            scores: Vec::new(),
            selected: None,
            pca: None,
            pca_input_columns: Vec::new(),
            output_columns: Vec::new(),
        };

        self.fit_imputers(&mut work, &mut fitted)?;
        if self.config.expand_dates {
            self.fit_date_expansion(&mut work, &mut fitted)?;
        }
        self.fit_encoders(&mut work, &mut fitted)?;
        apply_interactions(&mut work, &fitted.interaction_groups)?;
        self.fit_scalers(&mut work, &mut fitted)?;
        self.drop_text_columns(&mut work, &mut fitted);
        self.fit_selection(&mut work, &mut fitted, &target)?;
        self.fit_pca(&mut work, &mut fitted)?;

        fitted.output_columns = work.names().to_vec();
        check_output_invariant(&work)?;
        info!(
            wager_target = target_column,
            rows = work.n_rows(),
            features = work.n_cols(),
            "feature pipeline fitted"
        );
        self.fitted = Some(fitted);

        Ok(PreparedDataset {
            features: work,
            target,
        })
    }

    /// Replay the fitted transform on new data. The input column set must
    /// equal the fit-time set (the target column, if present, is ignored).
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("pipeline has not been fitted".to_string()))?;

        let mut work = frame.clone();
        let _ = work.take_column(&fitted.target_column);

        let supplied: BTreeSet<&String> = work.names().iter().collect();
        let expected: BTreeSet<&String> = fitted.input_columns.iter().collect();
        if supplied != expected {
            let missing = expected.difference(&supplied).map(|s| s.to_string()).collect();
            let extra = supplied.difference(&expected).map(|s| s.to_string()).collect();
            return Err(Error::SchemaMismatch { missing, extra });
        }
        work.select_columns(&fitted.input_columns)?;

        self.apply_imputers(&mut work, fitted)?;
        apply_date_expansion(&mut work, &fitted.date_columns)?;
        apply_encoders(&mut work, fitted)?;
        apply_interactions(&mut work, &fitted.interaction_groups)?;
        for (name, scaler) in &fitted.scalers {
            if work.column(name).is_none() {
                continue;
            }
            let scaled: Vec<FieldValue> = work
                .numeric_column(name)?
                .into_iter()
                .map(|x| FieldValue::Number(scaler.apply(x)))
                .collect();
            work.replace_column(name, scaled)?;
        }
        for name in &fitted.dropped_text {
            let _ = work.take_column(name);
        }
        if let Some(selected) = &fitted.selected {
            work.select_columns(selected)?;
        }
        if let Some(pca) = &fitted.pca {
            work.select_columns(&fitted.pca_input_columns)?;
            project_onto_components(&mut work, pca)?;
        }

        work.select_columns(&fitted.output_columns)?;
        check_output_invariant(&work)?;
        Ok(work)
    }

    fn fit_imputers(&self, work: &mut FeatureFrame, fitted: &mut FittedPipeline) -> Result<()> {
        for name in work.names().to_vec() {
            let kind = work.classify(&name).unwrap_or(ColumnKind::Text);
            let values = work.column(&name).unwrap_or(&[]).to_vec();
            let has_missing = values.iter().any(|v| v.is_missing());

            let imputer = match kind {
                ColumnKind::Numeric => Imputer::Median(median(
                    &values.iter().filter_map(|v| v.as_f64()).collect::<Vec<f64>>(),
                )),
                ColumnKind::Categorical | ColumnKind::Boolean => Imputer::Mode(mode(&values)),
                ColumnKind::DateTime => {
                    let fallback = values
                        .iter()
                        .filter_map(|v| v.as_timestamp())
                        .next_back()
                        .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);
                    Imputer::ForwardFill { fallback }
                }
                ColumnKind::Text => Imputer::EmptyText,
            };

            if has_missing {
                let filled = impute_column(&values, &imputer);
                work.replace_column(&name, filled)?;
                debug!(column = %name, "imputed missing values");
            }
            fitted.imputers.insert(name, imputer);
        }
        Ok(())
    }

    fn apply_imputers(&self, work: &mut FeatureFrame, fitted: &FittedPipeline) -> Result<()> {
        for (name, imputer) in &fitted.imputers {
            let values = work.column(name).unwrap_or(&[]).to_vec();
            if values.iter().any(|v| v.is_missing()) {
                work.replace_column(name, impute_column(&values, imputer))?;
            }
        }
        Ok(())
    }

    fn fit_date_expansion(&self, work: &mut FeatureFrame, fitted: &mut FittedPipeline) -> Result<()> {
        let date_columns: Vec<String> = work
            .names()
            .iter()
            .filter(|name| work.classify(name) == Some(ColumnKind::DateTime))
            .cloned()
            .collect();
        fitted.date_columns = date_columns.clone();
        apply_date_expansion(work, &date_columns)
    }

    fn fit_encoders(&self, work: &mut FeatureFrame, fitted: &mut FittedPipeline) -> Result<()> {
        for name in work.names().to_vec() {
            match work.classify(&name) {
                Some(ColumnKind::Boolean) => {
                    let numeric: Vec<FieldValue> = work
                        .column(&name)
                        .unwrap_or(&[])
                        .iter()
                        .map(|v| FieldValue::Number(v.as_f64().unwrap_or(0.0)))
                        .collect();
                    work.replace_column(&name, numeric)?;
                    fitted.boolean_columns.push(name);
                }
                Some(ColumnKind::Categorical) => {
                    let values = work.column(&name).unwrap_or(&[]).to_vec();
                    let categories = sorted_categories(&values);
                    let encoder = if categories.len() <= 2 || categories.len() > 10 {
                        Encoder::Ordinal { categories }
                    } else {
                        Encoder::OneHot { categories }
                    };
                    encode_column(work, &name, &encoder)?;
                    fitted.encoders.insert(name, encoder);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn fit_scalers(&self, work: &mut FeatureFrame, fitted: &mut FittedPipeline) -> Result<()> {
        for name in work.names().to_vec() {
            if work.classify(&name) != Some(ColumnKind::Numeric) {
                continue;
            }
            let values = work.numeric_column(&name)?;
            let scaler = match self.config.scaling {
                ScalingMethod::Standard => Scaler::Standard {
                    mean: mean(&values),
                    std: std_dev(&values),
                },
                ScalingMethod::MinMax => Scaler::MinMax {
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                },
                ScalingMethod::Robust => Scaler::Robust {
                    median: median(&values),
                    iqr: interquartile_range(&values),
                },
            };
            let scaled: Vec<FieldValue> = values.into_iter().map(|x| FieldValue::Number(scaler.apply(x))).collect();
            work.replace_column(&name, scaled)?;
            fitted.scalers.insert(name, scaler);
        }
        Ok(())
    }

    fn drop_text_columns(&self, work: &mut FeatureFrame, fitted: &mut FittedPipeline) {
        let text: Vec<String> = work
            .names()
            .iter()
            .filter(|name| {
                !matches!(
                    work.classify(name),
                    Some(ColumnKind::Numeric) | Some(ColumnKind::Boolean)
                )
            })
            .cloned()
            .collect();
        for name in &text {
            warn!(column = %name, "dropping non-encodable text column");
            let _ = work.take_column(name);
        }
        fitted.dropped_text = text;
    }

    fn fit_selection(
        &self,
        work: &mut FeatureFrame,
        fitted: &mut FittedPipeline,
        target: &TargetColumn,
    ) -> Result<()> {
        if work.n_rows() < 10 {
            debug!("too few rows for feature selection, keeping all columns");
            return Ok(());
        }

        let (class_ids, n_classes, continuous);
        let view = match target {
            TargetColumn::Classes(labels) => {
                let classes = sorted_unique(labels);
                class_ids = labels
                    .iter()
                    .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
                    .collect::<Vec<usize>>();
                n_classes = classes.len();
                TargetView::Classes(&class_ids, n_classes)
            }
            TargetColumn::Continuous(values) => {
                continuous = values.clone();
                TargetView::Continuous(&continuous)
            }
        };

        let mut scores: Vec<(String, f64)> = work
            .names()
            .iter()
            .map(|name| {
                let x = work.numeric_column(name)?;
                Ok((name.clone(), score_feature(&x, &view, self.config.score)))
            })
            .collect::<Result<_>>()?;
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        fitted.scores = scores.clone();

        if work.n_cols() > self.config.select_k {
            let chosen: BTreeSet<&String> = scores.iter().take(self.config.select_k).map(|(n, _)| n).collect();
            // Preserve the existing column order among the chosen.
            let selected: Vec<String> = work
                .names()
                .iter()
                .filter(|n| chosen.contains(n))
                .cloned()
                .collect();
            work.select_columns(&selected)?;
            info!(kept = selected.len(), "feature selection applied");
            fitted.selected = Some(selected);
        }
        Ok(())
    }

    fn fit_pca(&self, work: &mut FeatureFrame, fitted: &mut FittedPipeline) -> Result<()> {
        let Some(retain) = self.config.variance_retain else {
            return Ok(());
        };
        let matrix = work.to_matrix()?;
        let Some(pca) = PcaState::fit(&matrix, retain) else {
            debug!("principal-components reduction skipped (degenerate input)");
            return Ok(());
        };
        if pca.n_components() >= work.n_cols() {
            return Ok(());
        }
        fitted.pca_input_columns = work.names().to_vec();
        project_onto_components(work, &pca)?;
        info!(components = pca.n_components(), "principal-components reduction applied");
        fitted.pca = Some(pca);
        Ok(())
    }
}

fn build_target(values: &[FieldValue]) -> TargetColumn {
    let all_numeric = values.iter().all(|v| matches!(v, FieldValue::Number(_)));
    if all_numeric {
        let unique: BTreeSet<String> = values.iter().map(stringify_cell).collect();
        if unique.len() > 10 {
            return TargetColumn::Continuous(values.iter().filter_map(|v| v.as_f64()).collect());
        }
    }
    TargetColumn::Classes(values.iter().map(stringify_cell).collect())
}

fn impute_column(values: &[FieldValue], imputer: &Imputer) -> Vec<FieldValue> {
    match imputer {
        Imputer::Median(m) => values
            .iter()
            .map(|v| {
                if v.is_missing() {
                    FieldValue::Number(*m)
                } else {
                    v.clone()
                }
            })
            .collect(),
        Imputer::Mode(mode) => values
            .iter()
            .map(|v| if v.is_missing() { mode.clone() } else { v.clone() })
            .collect(),
        Imputer::ForwardFill { fallback } => {
            let mut last: Option<FieldValue> = None;
            values
                .iter()
                .map(|v| {
                    if v.is_missing() {
                        last.clone().unwrap_or(FieldValue::Timestamp(*fallback))
                    } else {
                        last = Some(v.clone());
                        v.clone()
                    }
                })
                .collect()
        }
        Imputer::EmptyText => values
            .iter()
            .map(|v| {
                if v.is_missing() {
                    FieldValue::Text(String::new())
                } else {
                    v.clone()
                }
            })
            .collect(),
    }
}

fn apply_date_expansion(work: &mut FeatureFrame, date_columns: &[String]) -> Result<()> {
    for name in date_columns {
        let Some(values) = work.column(name).map(|v| v.to_vec()) else {
            continue;
        };
        let timestamps: Vec<DateTime<Utc>> = values
            .iter()
            .map(|v| v.as_timestamp().unwrap_or(DateTime::<Utc>::MIN_UTC))
            .collect();

        let feature =
            |f: &dyn Fn(&DateTime<Utc>) -> f64| -> Vec<FieldValue> { timestamps.iter().map(|t| FieldValue::Number(f(t))).collect() };

        work.add_column(format!("{name}_year"), feature(&|t| t.year() as f64))?;
        work.add_column(format!("{name}_month"), feature(&|t| t.month() as f64))?;
        work.add_column(format!("{name}_day"), feature(&|t| t.day() as f64))?;
        work.add_column(
            format!("{name}_dayofweek"),
            feature(&|t| t.weekday().num_days_from_monday() as f64),
        )?;
        work.add_column(format!("{name}_quarter"), feature(&|t| ((t.month() - 1) / 3 + 1) as f64))?;
        work.add_column(
            format!("{name}_is_weekend"),
            feature(&|t| {
                if t.weekday().num_days_from_monday() >= 5 {
                    1.0
                } else {
                    0.0
                }
            }),
        )?;
        work.add_column(
            format!("{name}_is_month_start"),
            feature(&|t| if t.day() == 1 { 1.0 } else { 0.0 }),
        )?;
        work.add_column(
            format!("{name}_is_month_end"),
            feature(&|t| if (*t + Duration::days(1)).month() != t.month() { 1.0 } else { 0.0 }),
        )?;
        let _ = work.take_column(name);
    }
    Ok(())
}

fn encode_column(work: &mut FeatureFrame, name: &str, encoder: &Encoder) -> Result<()> {
    let values = work.column(name).unwrap_or(&[]).to_vec();
    match encoder {
        Encoder::Ordinal { categories } => {
            let encoded: Vec<FieldValue> = values
                .iter()
                .map(|v| {
                    let cell = stringify_cell(v);
                    let idx = categories.iter().position(|c| *c == cell).unwrap_or(categories.len());
                    FieldValue::Number(idx as f64)
                })
                .collect();
            work.replace_column(name, encoded)?;
        }
        Encoder::OneHot { categories } => {
            for category in categories.iter().skip(1) {
                let indicator: Vec<FieldValue> = values
                    .iter()
                    .map(|v| FieldValue::Number(if stringify_cell(v) == *category { 1.0 } else { 0.0 }))
                    .collect();
                work.add_column(format!("{name}_{category}"), indicator)?;
            }
            let _ = work.take_column(name);
        }
    }
    Ok(())
}

fn apply_encoders(work: &mut FeatureFrame, fitted: &FittedPipeline) -> Result<()> {
    for name in &fitted.boolean_columns {
        if let Some(values) = work.column(name).map(|v| v.to_vec()) {
            let numeric: Vec<FieldValue> = values
                .iter()
                .map(|v| FieldValue::Number(v.as_f64().unwrap_or(0.0)))
                .collect();
            work.replace_column(name, numeric)?;
        }
    }
    for (name, encoder) in &fitted.encoders {
        if work.column(name).is_some() {
            encode_column(work, name, encoder)?;
        }
    }
    Ok(())
}

fn apply_interactions(work: &mut FeatureFrame, groups: &[Vec<String>]) -> Result<()> {
    for group in groups {
        if group.len() < 2 {
            continue;
        }
        if group.iter().any(|name| work.column(name).is_none()) {
            continue;
        }
        let columns: Vec<Vec<f64>> = group
            .iter()
            .map(|name| work.numeric_column(name))
            .collect::<Result<_>>()?;

        let product_name = group.join("_x_");
        let product: Vec<FieldValue> = (0..work.n_rows())
            .map(|i| FieldValue::Number(columns.iter().map(|c| c[i]).product()))
            .collect();
        work.add_column(product_name, product)?;

        if group.len() == 2 {
            let ratio_name = format!("{}_div_{}", group[0], group[1]);
            let ratio: Vec<FieldValue> = (0..work.n_rows())
                .map(|i| {
                    let denom = columns[1][i];
                    FieldValue::Number(if denom.abs() <= f64::EPSILON {
                        0.0
                    } else {
                        columns[0][i] / denom
                    })
                })
                .collect();
            work.add_column(ratio_name, ratio)?;
        }
    }
    Ok(())
}

fn project_onto_components(work: &mut FeatureFrame, pca: &PcaState) -> Result<()> {
    let matrix = work.to_matrix()?;
    let projected: Vec<Vec<f64>> = matrix.iter().map(|row| pca.apply(row)).collect();

    let mut out = FeatureFrame::new();
    for j in 0..pca.n_components() {
        let column: Vec<FieldValue> = projected.iter().map(|row| FieldValue::Number(row[j])).collect();
        out.add_column(format!("pca_component_{}", j + 1), column)?;
    }
    *work = out;
    Ok(())
}

fn check_output_invariant(work: &FeatureFrame) -> Result<()> {
    if work.is_empty() {
        return Err(Error::InsufficientData("preparation produced an empty frame".to_string()));
    }
    if work.has_missing() {
        return Err(Error::InvalidInput("prepared output still contains missing values".to_string()));
    }
    work.to_matrix().map(|_| ())
}

fn sorted_categories(values: &[FieldValue]) -> Vec<String> {
    sorted_unique(&values.iter().map(stringify_cell).collect::<Vec<String>>())
}

fn sorted_unique(values: &[String]) -> Vec<String> {
    let set: BTreeSet<String> = values.iter().cloned().collect();
    set.into_iter().collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn interquartile_range(values: &[f64]) -> f64 {
    if values.len() < 4 {
        return std_dev(values);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q1 = sorted[sorted.len() / 4];
    let q3 = sorted[(sorted.len() * 3) / 4];
    q3 - q1
}

fn mode(values: &[FieldValue]) -> FieldValue {
    let mut counts: BTreeMap<String, (usize, FieldValue)> = BTreeMap::new();
    for value in values.iter().filter(|v| !v.is_missing()) {
        let entry = counts.entry(stringify_cell(value)).or_insert((0, value.clone()));
        entry.0 += 1;
    }
    counts
        .into_values()
        .max_by_key(|(count, _)| *count)
        .map(|(_, value)| value)
        .unwrap_or(FieldValue::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_frame() -> FeatureFrame {
        let mut frame = FeatureFrame::new();
        let n = 40;
        frame
            .add_column(
                "home_goals_scored",
                (0..n)
                    .map(|i| {
                        if i == 3 {
                            FieldValue::Missing
                        } else {
                            FieldValue::Number(1.0 + (i % 5) as f64 * 0.4)
                        }
                    })
                    .collect(),
            )
            .unwrap();
        frame
            .add_column(
                "away_goals_scored",
                (0..n).map(|i| FieldValue::Number(0.6 + (i % 4) as f64 * 0.3)).collect(),
            )
            .unwrap();
        frame
            .add_column(
                "competition",
                (0..n)
                    .map(|i| FieldValue::Text(if i % 2 == 0 { "league" } else { "cup" }.to_string()))
                    .collect(),
            )
            .unwrap();
        frame
            .add_column(
                "match_date",
                (0..n)
                    .map(|i| FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 3, 1 + (i % 28) as u32, 15, 0, 0).unwrap()))
                    .collect(),
            )
            .unwrap();
        frame
            .add_column(
                "result",
                (0..n)
                    .map(|i| FieldValue::Text(if i % 5 < 2 { "home_win" } else if i % 5 < 4 { "away_win" } else { "draw" }.to_string()))
                    .collect(),
            )
            .unwrap();
        frame
    }

    #[test]
    fn test_fit_transform_output_invariant() {
        let mut pipeline = FeaturePipeline::new(PreparationConfig::default());
        let prepared = pipeline.fit_transform(&sample_frame(), "result").unwrap();

        assert!(!prepared.features.has_missing());
        assert!(prepared.features.to_matrix().is_ok());
        assert_eq!(prepared.target.len(), 40);
        assert!(matches!(prepared.target, TargetColumn::Classes(_)));

        // Date column expanded and removed.
        assert!(prepared.features.column("match_date").is_none());
        assert!(prepared.features.column("match_date_dayofweek").is_some());
    }

    #[test]
    fn test_transform_replays_fixed_schema() {
        let mut pipeline = FeaturePipeline::new(PreparationConfig::default());
        let frame = sample_frame();
        let prepared = pipeline.fit_transform(&frame, "result").unwrap();

        let transformed = pipeline.transform(&frame).unwrap();
        assert_eq!(transformed.names(), prepared.features.names());
        assert_eq!(transformed.n_rows(), 40);

        // Round-trip the fitted state and replay again.
        let json = serde_json::to_string(&pipeline).unwrap();
        let restored: FeaturePipeline = serde_json::from_str(&json).unwrap();
        let replayed = restored.transform(&frame).unwrap();
        assert_eq!(replayed.names(), transformed.names());
        assert_eq!(replayed.to_matrix().unwrap(), transformed.to_matrix().unwrap());
    }

    #[test]
    fn test_transform_rejects_schema_drift() {
        let mut pipeline = FeaturePipeline::new(PreparationConfig::default());
        let frame = sample_frame();
        pipeline.fit_transform(&frame, "result").unwrap();

        let mut drifted = frame.clone();
        let _ = drifted.take_column("home_goals_scored");
        drifted
            .add_column("unexpected", (0..40).map(|_| FieldValue::Number(0.0)).collect())
            .unwrap();

        match pipeline.transform(&drifted) {
            Err(Error::SchemaMismatch { missing, extra }) => {
                assert_eq!(missing, vec!["home_goals_scored".to_string()]);
                assert_eq!(extra, vec!["unexpected".to_string()]);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_fails() {
        let mut pipeline = FeaturePipeline::new(PreparationConfig::default());
        assert!(matches!(
            pipeline.fit_transform(&FeatureFrame::new(), "result"),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_interaction_features() {
        let config = PreparationConfig {
            interaction_groups: vec![vec!["home_goals_scored".to_string(), "away_goals_scored".to_string()]],
            expand_dates: false,
            ..Default::default()
        };
        let mut pipeline = FeaturePipeline::new(config);
        let mut frame = sample_frame();
        let _ = frame.take_column("match_date");
        let prepared = pipeline.fit_transform(&frame, "result").unwrap();

        assert!(prepared
            .features
            .column("home_goals_scored_x_away_goals_scored")
            .is_some());
        assert!(prepared
            .features
            .column("home_goals_scored_div_away_goals_scored")
            .is_some());
    }

    #[test]
    fn test_select_k_limits_columns() {
        let config = PreparationConfig {
            select_k: 3,
            score: FeatureScore::AnovaF,
            ..Default::default()
        };
        let mut pipeline = FeaturePipeline::new(config);
        let prepared = pipeline.fit_transform(&sample_frame(), "result").unwrap();
        assert!(prepared.features.n_cols() <= 3);
        assert!(!pipeline.fitted().unwrap().scores.is_empty());
    }

    #[test]
    fn test_variance_retention_projection() {
        let config = PreparationConfig {
            variance_retain: Some(0.9),
            expand_dates: false,
            ..Default::default()
        };
        let mut pipeline = FeaturePipeline::new(config);
        let mut frame = sample_frame();
        let _ = frame.take_column("match_date");
        let prepared = pipeline.fit_transform(&frame, "result").unwrap();

        if pipeline.fitted().unwrap().pca.is_some() {
            assert!(prepared.features.names()[0].starts_with("pca_component_"));
            let replay = pipeline.transform(&frame).unwrap();
            assert_eq!(replay.names(), prepared.features.names());
        }
    }

    #[test]
    fn test_scaling_methods() {
        for scaling in [ScalingMethod::Standard, ScalingMethod::MinMax, ScalingMethod::Robust] {
            let config = PreparationConfig {
                scaling,
                expand_dates: false,
                ..Default::default()
            };
            let mut pipeline = FeaturePipeline::new(config);
            let mut frame = sample_frame();
            let _ = frame.take_column("match_date");
            let prepared = pipeline.fit_transform(&frame, "result").unwrap();
            let matrix = prepared.features.to_matrix().unwrap();
            assert!(matrix.iter().flatten().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn test_rows_with_missing_target_dropped() {
        let mut frame = sample_frame();
        let mut target = frame.take_column("result").unwrap();
        target[0] = FieldValue::Missing;
        target[1] = FieldValue::Missing;
        frame.add_column("result", target).unwrap();

        let mut pipeline = FeaturePipeline::new(PreparationConfig::default());
        let prepared = pipeline.fit_transform(&frame, "result").unwrap();
        assert_eq!(prepared.target.len(), 38);
        assert_eq!(prepared.features.n_rows(), 38);
    }
}
