//! In-memory employee table loaded from CSV

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// A single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Format a number without float noise: integers print bare, everything
/// else is rounded to two decimals.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let s = format!("{:.2}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl Value {
    /// Exact identity used for grouping; numbers are not rounded
    pub(crate) fn group_key(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Column type inferred at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Number,
    Text,
    /// Text with few distinct values (departments, positions)
    Category,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Number => "number",
            ColumnKind::Text => "text",
            ColumnKind::Category => "category",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Immutable table of employee records sharing one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Load a CSV file with a header row
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| AppError::Dataset {
            message: format!("cannot open {}: {}", path.display(), e),
        })?;
        let table = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            columns = table.columns.len(),
            "Dataset loaded"
        );
        Ok(table)
    }

    /// Parse CSV from any reader and infer column kinds
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() || headers.iter().any(|h| h.is_empty()) {
            return Err(AppError::Dataset {
                message: "header row has empty column names".to_string(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(AppError::Dataset {
                message: format!("duplicate column '{}'", dup),
            });
        }

        let mut raw: Vec<Vec<String>> = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            raw.push(record.iter().map(str::to_string).collect());
        }

        let columns: Vec<Column> = headers
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = infer_kind(raw.iter().map(|r| r[i].as_str()));
                Column { name, kind }
            })
            .collect();

        let rows = raw
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .zip(&columns)
                    .map(|(cell, column)| parse_cell(cell, column.kind))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub(crate) fn from_parts(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a column that must exist
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| AppError::ColumnNotFound {
                column: name.to_string(),
            })
    }

    /// One line per column, e.g. `- Salary (number)`
    pub fn schema_description(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("- {} ({})", c.name, c.kind))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The first `n` rows as comma separated lines under a header
    pub fn sample(&self, n: usize) -> String {
        let mut lines = vec![self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")];
        for row in self.rows.iter().take(n) {
            lines.push(
                row.iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        lines.join("\n")
    }

    /// New table with only the given columns, in the given order
    pub fn project(&self, indices: &[usize]) -> Self {
        Self {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let values: Vec<&str> = cells.filter(|c| !c.is_empty()).collect();
    if values.is_empty() {
        return ColumnKind::Text;
    }
    if values.iter().all(|v| v.parse::<f64>().is_ok()) {
        return ColumnKind::Number;
    }

    let distinct: HashSet<&str> = values.iter().copied().collect();
    if distinct.len() * 2 <= values.len() {
        ColumnKind::Category
    } else {
        ColumnKind::Text
    }
}

fn parse_cell(cell: String, kind: ColumnKind) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match kind {
        ColumnKind::Number => cell.parse().map(Value::Number).unwrap_or(Value::Text(cell)),
        ColumnKind::Text | ColumnKind::Category => Value::Text(cell),
    }
}
