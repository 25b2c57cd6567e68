//! Tabular solution storage.
//!
//! A [`ResultTable`] holds one row per reporting time: the time value, one
//! value per state column, and optionally one value per intermediate column.
//! It doubles as the time-value history used for delayed-value lookups.

use crate::{ResultsError, ResultsResult};
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRow {
    pub time: f64,
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    intermediate_columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            intermediate_columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_intermediates(columns: Vec<String>, intermediate_columns: Vec<String>) -> Self {
        Self {
            columns,
            intermediate_columns,
            rows: Vec::new(),
        }
    }

    /// Rebuild a table from stored rows, re-checking row shapes and ordering.
    pub fn from_rows(
        columns: Vec<String>,
        intermediate_columns: Vec<String>,
        rows: Vec<ResultRow>,
    ) -> ResultsResult<Self> {
        let mut table = Self::with_intermediates(columns, intermediate_columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn intermediate_columns(&self) -> &[String] {
        &self.intermediate_columns
    }

    /// Append a row. Times must be strictly increasing.
    pub fn push_row(&mut self, row: ResultRow) -> ResultsResult<()> {
        if row.values.len() != self.columns.len() {
            return Err(ResultsError::Shape {
                what: "state values",
                expected: self.columns.len(),
                found: row.values.len(),
            });
        }
        if row.intermediates.len() != self.intermediate_columns.len() {
            return Err(ResultsError::Shape {
                what: "intermediate values",
                expected: self.intermediate_columns.len(),
                found: row.intermediates.len(),
            });
        }
        if let Some(last) = self.rows.last() {
            if !(row.time > last.time) {
                return Err(ResultsError::NonMonotonic {
                    previous: last.time,
                    time: row.time,
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn push(&mut self, time: f64, values: &[f64]) -> ResultsResult<()> {
        self.push_row(ResultRow {
            time,
            values: values.to_vec(),
            intermediates: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&ResultRow> {
        self.rows.get(index)
    }

    pub fn last_row(&self) -> Option<&ResultRow> {
        self.rows.last()
    }

    pub fn times(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.rows.first().map(|r| r.time)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.rows.last().map(|r| r.time)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.columns.len() {
            return None;
        }
        Some(self.rows.iter().map(|r| r.values[index]).collect())
    }

    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.values.get(column)).copied()
    }

    /// Value of `column` at `time`, linearly blended between the bracketing rows.
    ///
    /// Returns the stored value exactly when `time` matches a row and `None`
    /// outside `[first_time, last_time]`.
    pub fn value_at(&self, time: f64, column: usize) -> Option<f64> {
        if column >= self.columns.len() || self.rows.is_empty() || !time.is_finite() {
            return None;
        }
        let first = &self.rows[0];
        let last = &self.rows[self.rows.len() - 1];
        if time < first.time || time > last.time {
            return None;
        }

        // first row with row.time >= time
        let upper = self.rows.partition_point(|r| r.time < time);
        let hi = &self.rows[upper];
        if hi.time == time || upper == 0 {
            return Some(hi.values[column]);
        }
        let lo = &self.rows[upper - 1];
        let w = (time - lo.time) / (hi.time - lo.time);
        Some(lo.values[column] + w * (hi.values[column] - lo.values[column]))
    }

    /// Write the table as CSV with a `time` header column.
    pub fn write_csv<W: Write>(&self, mut out: W) -> ResultsResult<()> {
        let mut header = vec!["time".to_string()];
        header.extend(self.columns.iter().cloned());
        header.extend(self.intermediate_columns.iter().cloned());
        writeln!(out, "{}", header.join(","))?;

        for row in &self.rows {
            let mut line = row.time.to_string();
            for v in row.values.iter().chain(row.intermediates.iter()) {
                line.push(',');
                line.push_str(&v.to_string());
            }
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}
