use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One scraped table row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    /// Cell lookup; an absent column reads as null.
    pub fn get(&self, column: &str) -> &Value {
        self.data.get(column).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.data.insert(column.into(), value);
    }

    /// Numeric view of a cell. Numbers pass through, strings are parsed after
    /// trimming, anything else is missing.
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.get(column) {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).as_str()
    }
}

/// A table whose schema is discovered at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renames columns in place, carrying every row's cells along.
    pub fn rename_columns<F>(&mut self, mut rename: F)
    where
        F: FnMut(&str) -> String,
    {
        let renames: Vec<(String, String)> = self
            .columns
            .iter()
            .map(|old| (old.clone(), rename(old)))
            .filter(|(old, new)| old != new)
            .collect();

        if renames.is_empty() {
            return;
        }

        for column in self.columns.iter_mut() {
            if let Some((_, new)) = renames.iter().find(|(old, _)| old == column) {
                *column = new.clone();
            }
        }

        for record in self.records.iter_mut() {
            let moved: Vec<(String, Value)> = renames
                .iter()
                .filter_map(|(old, new)| record.data.remove(old).map(|v| (new.clone(), v)))
                .collect();
            record.data.extend(moved);
        }
    }

    /// Sets `column` on every row from `derive`, registering the column if new.
    pub fn derive_column<F>(&mut self, column: &str, mut derive: F)
    where
        F: FnMut(&Record) -> Value,
    {
        for record in self.records.iter_mut() {
            let value = derive(record);
            record.set(column, value);
        }
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }
}

/// The four answers produced for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSet {
    pub count: usize,
    pub earliest_title: String,
    pub correlation: Option<f64>,
    pub chart: String,
}

impl AnswerSet {
    /// `[count, title, correlation, chart]`, the shape programmatic callers get.
    pub fn to_json_array(&self) -> Value {
        serde_json::json!([
            self.count,
            self.earliest_title,
            self.correlation,
            self.chart
        ])
    }
}

/// Ordinary least-squares line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}
