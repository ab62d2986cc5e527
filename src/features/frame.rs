//! Columnar feature table
//!
//! The tabular form the preparation pipeline operates on. Columns are kept
//! in a deterministic order; conversion to a dense matrix is only legal
//! once every cell is numeric and non-missing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::types::{FieldValue, MatchFeatureRecord};

/// Semantic type of a column, decided by inspecting its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    DateTime,
    Boolean,
    Text,
}

/// Named columns of equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFrame {
    names: Vec<String>,
    columns: Vec<Vec<FieldValue>>,
    n_rows: usize,
}

impl FeatureFrame {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            n_rows: 0,
        }
    }

    /// Build a frame from match records: the sorted union of field and
    /// label names becomes the column set, with `Missing` filling gaps.
    pub fn from_records(records: &[MatchFeatureRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::InsufficientData("no match records supplied".to_string()));
        }

        let mut names: BTreeSet<String> = BTreeSet::new();
        for record in records {
            names.extend(record.fields.keys().cloned());
            names.extend(record.labels.keys().cloned());
        }

        let names: Vec<String> = names.into_iter().collect();
        let mut columns = vec![Vec::with_capacity(records.len()); names.len()];
        for record in records {
            for (i, name) in names.iter().enumerate() {
                let value = record
                    .fields
                    .get(name)
                    .or_else(|| record.labels.get(name))
                    .cloned()
                    .unwrap_or(FieldValue::Missing);
                columns[i].push(value);
            }
        }

        Ok(Self {
            names,
            columns,
            n_rows: records.len(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0 || self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[FieldValue]> {
        self.column_index(name).map(|i| self.columns[i].as_slice())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<FieldValue>) -> Result<()> {
        let name = name.into();
        if !self.names.is_empty() && values.len() != self.n_rows {
            return Err(Error::InvalidInput(format!(
                "column '{}' has {} rows, frame has {}",
                name,
                values.len(),
                self.n_rows
            )));
        }
        if self.column_index(&name).is_some() {
            return Err(Error::InvalidInput(format!("duplicate column '{name}'")));
        }
        if self.names.is_empty() {
            self.n_rows = values.len();
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Remove and return a column, e.g. to split off the target.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<FieldValue>> {
        let idx = self.column_index(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    pub fn replace_column(&mut self, name: &str, values: Vec<FieldValue>) -> Result<()> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown column '{name}'")))?;
        if values.len() != self.n_rows {
            return Err(Error::InvalidInput(format!(
                "column '{}' has {} rows, frame has {}",
                name,
                values.len(),
                self.n_rows
            )));
        }
        self.columns[idx] = values;
        Ok(())
    }

    /// Restrict the frame to the given columns, in the given order.
    pub fn select_columns(&mut self, keep: &[String]) -> Result<()> {
        let mut names = Vec::with_capacity(keep.len());
        let mut columns = Vec::with_capacity(keep.len());
        for name in keep {
            let idx = self
                .column_index(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown column '{name}'")))?;
            names.push(self.names[idx].clone());
            columns.push(self.columns[idx].clone());
        }
        self.names = names;
        self.columns = columns;
        Ok(())
    }

    /// Classify a column per value inspection: uniform bool/timestamp/
    /// number columns map directly; anything else is categorical when the
    /// unique-value fraction among non-missing cells is below 0.1, free
    /// text otherwise.
    pub fn classify(&self, name: &str) -> Option<ColumnKind> {
        let values = self.column(name)?;
        let present: Vec<&FieldValue> = values.iter().filter(|v| !v.is_missing()).collect();
        if present.is_empty() {
            return Some(ColumnKind::Text);
        }

        if present.iter().all(|v| matches!(v, FieldValue::Bool(_))) {
            return Some(ColumnKind::Boolean);
        }
        if present.iter().all(|v| matches!(v, FieldValue::Timestamp(_))) {
            return Some(ColumnKind::DateTime);
        }
        if present.iter().all(|v| matches!(v, FieldValue::Number(_))) {
            return Some(ColumnKind::Numeric);
        }

        let unique: BTreeSet<String> = present.iter().map(|v| stringify_cell(v)).collect();
        if (unique.len() as f64) < values.len() as f64 * 0.1 {
            Some(ColumnKind::Categorical)
        } else {
            Some(ColumnKind::Text)
        }
    }

    pub fn has_missing(&self) -> bool {
        self.columns.iter().any(|col| col.iter().any(|v| v.is_missing()))
    }

    /// Dense row-major matrix. Fails on any non-numeric or missing cell;
    /// boolean cells coerce to 0/1.
    pub fn to_matrix(&self) -> Result<Vec<Vec<f64>>> {
        let mut rows = vec![Vec::with_capacity(self.n_cols()); self.n_rows];
        for (name, column) in self.names.iter().zip(&self.columns) {
            for (i, value) in column.iter().enumerate() {
                let x = value.as_f64().ok_or_else(|| {
                    Error::InvalidInput(format!("column '{name}' has a non-numeric cell at row {i}"))
                })?;
                rows[i].push(x);
            }
        }
        Ok(rows)
    }

    /// New frame keeping only the rows where `keep` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> FeatureFrame {
        let columns: Vec<Vec<FieldValue>> = self
            .columns
            .iter()
            .map(|col| {
                col.iter()
                    .zip(keep)
                    .filter(|(_, &k)| k)
                    .map(|(v, _)| v.clone())
                    .collect()
            })
            .collect();
        let n_rows = keep.iter().filter(|&&k| k).count();
        FeatureFrame {
            names: self.names.clone(),
            columns,
            n_rows,
        }
    }

    /// All values of a numeric column as `f64`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let values = self
            .column(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown column '{name}'")))?;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_f64()
                    .ok_or_else(|| Error::InvalidInput(format!("column '{name}' has a non-numeric cell at row {i}")))
            })
            .collect()
    }
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable textual form of a cell, used for category identity.
pub(crate) fn stringify_cell(value: &FieldValue) -> String {
    match value {
        FieldValue::Number(n) => format!("{n}"),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Timestamp(t) => t.to_rfc3339(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Missing => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<MatchFeatureRecord> {
        (0..20)
            .map(|i| {
                let mut record = MatchFeatureRecord::new(format!("m{i}"), "Alfa", "Beta")
                    .with_field("home_goals_scored", 1.0 + i as f64 * 0.1)
                    .with_field("away_goals_scored", 0.8 + i as f64 * 0.05)
                    .with_field("competition", if i % 2 == 0 { "league" } else { "cup" })
                    .with_label("result", if i % 3 == 0 { "home_win" } else { "away_win" });
                if i == 5 {
                    record.fields.insert("home_goals_scored".to_string(), FieldValue::Missing);
                }
                record
            })
            .collect()
    }

    #[test]
    fn test_from_records_sorted_union() {
        let frame = FeatureFrame::from_records(&records()).unwrap();
        assert_eq!(frame.n_rows(), 20);
        assert_eq!(
            frame.names(),
            &["away_goals_scored", "competition", "home_goals_scored", "result"]
        );
        assert!(frame.has_missing());
    }

    #[test]
    fn test_from_records_empty_fails() {
        assert!(matches!(
            FeatureFrame::from_records(&[]),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_classification_rules() {
        let frame = FeatureFrame::from_records(&records()).unwrap();
        assert_eq!(frame.classify("home_goals_scored"), Some(ColumnKind::Numeric));
        // 2 unique values over 20 rows: unique fraction 0.1 threshold not met -> text.
        assert_eq!(frame.classify("competition"), Some(ColumnKind::Text));

        let mut frame = frame;
        let bools: Vec<FieldValue> = (0..20).map(|i| FieldValue::Bool(i % 2 == 0)).collect();
        frame.add_column("is_derby", bools).unwrap();
        assert_eq!(frame.classify("is_derby"), Some(ColumnKind::Boolean));
    }

    #[test]
    fn test_categorical_below_unique_fraction() {
        let mut frame = FeatureFrame::new();
        let values: Vec<FieldValue> = (0..40)
            .map(|i| FieldValue::Text(if i % 2 == 0 { "4-4-2" } else { "4-3-3" }.to_string()))
            .collect();
        frame.add_column("formation", values).unwrap();
        assert_eq!(frame.classify("formation"), Some(ColumnKind::Categorical));
    }

    #[test]
    fn test_take_and_select_columns() {
        let mut frame = FeatureFrame::from_records(&records()).unwrap();
        let target = frame.take_column("result").unwrap();
        assert_eq!(target.len(), 20);
        assert!(frame.column("result").is_none());

        frame
            .select_columns(&["home_goals_scored".to_string(), "away_goals_scored".to_string()])
            .unwrap();
        assert_eq!(frame.n_cols(), 2);
        assert_eq!(frame.names()[0], "home_goals_scored");
    }

    #[test]
    fn test_to_matrix_rejects_non_numeric() {
        let frame = FeatureFrame::from_records(&records()).unwrap();
        assert!(frame.to_matrix().is_err());

        let mut frame = frame;
        let _ = frame.take_column("competition");
        let _ = frame.take_column("result");
        // Still has a missing cell.
        assert!(frame.to_matrix().is_err());
    }
}
