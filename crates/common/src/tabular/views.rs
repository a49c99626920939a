//! Read-only views over the dataset

use super::table::{Column, ColumnKind, Table, Value};
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const SALARY_COLUMNS: [&str; 4] = ["Name", "Department", "Position", "Salary"];
const DEPARTMENT_COLUMN: &str = "Department";
const COUNT_COLUMN: &str = "Employee Count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataView {
    /// Full table
    Staff,
    /// Name, department, position and salary columns
    Salary,
    /// Head count per department
    Departments,
}

impl FromStr for DataView {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "staff" => Ok(DataView::Staff),
            "salary" => Ok(DataView::Salary),
            "departments" => Ok(DataView::Departments),
            _ => Err(AppError::UnknownView {
                view: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DataView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataView::Staff => "staff",
            DataView::Salary => "salary",
            DataView::Departments => "departments",
        };
        write!(f, "{}", s)
    }
}

/// Rows of a view, ready to serialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    pub view: DataView,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableView {
    fn from_table(view: DataView, table: &Table) -> Self {
        Self {
            view,
            columns: table.columns().iter().map(|c| c.name.clone()).collect(),
            rows: table.rows().to_vec(),
        }
    }
}

impl DataView {
    pub fn render(self, table: &Table) -> Result<TableView> {
        match self {
            DataView::Staff => Ok(TableView::from_table(self, table)),
            DataView::Salary => {
                let indices: Vec<usize> = SALARY_COLUMNS
                    .iter()
                    .filter_map(|name| table.column_index(name))
                    .collect();
                Ok(TableView::from_table(self, &table.project(&indices)))
            }
            DataView::Departments => {
                let index = table.require_column(DEPARTMENT_COLUMN)?;

                let mut counts: Vec<(Value, usize)> = Vec::new();
                let mut positions: HashMap<String, usize> = HashMap::new();
                // Blank departments are not counted
                for value in table.rows().iter().map(|row| &row[index]).filter(|v| !v.is_null()) {
                    let key = value.group_key();
                    match positions.get(&key) {
                        Some(&slot) => counts[slot].1 += 1,
                        None => {
                            positions.insert(key, counts.len());
                            counts.push((value.clone(), 1));
                        }
                    }
                }
                // Stable, so equal counts keep first-appearance order
                counts.sort_by(|a, b| b.1.cmp(&a.1));

                let columns = vec![
                    Column {
                        name: DEPARTMENT_COLUMN.to_string(),
                        kind: ColumnKind::Category,
                    },
                    Column {
                        name: COUNT_COLUMN.to_string(),
                        kind: ColumnKind::Number,
                    },
                ];
                let rows = counts
                    .into_iter()
                    .map(|(value, count)| vec![value, Value::Number(count as f64)])
                    .collect();
                Ok(TableView::from_table(self, &Table::from_parts(columns, rows)))
            }
        }
    }
}
