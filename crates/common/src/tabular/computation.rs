//! The computation language the engine may emit
//!
//! This is the whole allow-list: row filters, an optional grouping column,
//! one aggregate (or a projection), and ordering/limit on the result. It has
//! no way to name a file, a host or a process, and executing it is a pure
//! function over `&Table`.

use super::table::{format_number, ColumnKind, Table, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Computation {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Option<String>,
    pub operation: Operation,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Count,
    Sum { column: String },
    Mean { column: String },
    Median { column: String },
    Min { column: String },
    Max { column: String },
    CountDistinct { column: String },
    List { columns: Vec<String> },
}

impl Operation {
    fn numeric_column(&self) -> Option<&str> {
        match self {
            Operation::Sum { column }
            | Operation::Mean { column }
            | Operation::Median { column }
            | Operation::Min { column }
            | Operation::Max { column } => Some(column),
            _ => None,
        }
    }

    fn heading(&self) -> String {
        match self {
            Operation::Count => "Count of rows".to_string(),
            Operation::Sum { column } => format!("Sum of {}", column),
            Operation::Mean { column } => format!("Mean of {}", column),
            Operation::Median { column } => format!("Median of {}", column),
            Operation::Min { column } => format!("Minimum of {}", column),
            Operation::Max { column } => format!("Maximum of {}", column),
            Operation::CountDistinct { column } => format!("Distinct values of {}", column),
            Operation::List { .. } => "Matching rows".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One grouped result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupValue {
    pub key: String,
    pub value: Value,
}

/// Result of executing a computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputationOutput {
    Scalar { value: Value },
    Groups { groups: Vec<GroupValue> },
    Rows { columns: Vec<String>, rows: Vec<Vec<Value>> },
}

impl ComputationOutput {
    /// Value of a group by key, for grouped outputs
    pub fn group(&self, key: &str) -> Option<&Value> {
        match self {
            ComputationOutput::Groups { groups } => {
                groups.iter().find(|g| g.key == key).map(|g| &g.value)
            }
            _ => None,
        }
    }
}

const BLANK_KEY: &str = "(blank)";

impl Computation {
    /// Every column must exist and numeric aggregates need number columns.
    /// Returns a description of the first mismatch.
    pub fn validate(&self, table: &Table) -> std::result::Result<(), String> {
        let kind_of = |name: &str| {
            table
                .column(name)
                .map(|c| c.kind)
                .ok_or_else(|| format!("column '{}' does not exist", name))
        };

        for filter in &self.filters {
            let kind = kind_of(&filter.column)?;
            match filter.op {
                FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                    if kind != ColumnKind::Number || !filter.value.is_number() {
                        return Err(format!(
                            "'{:?}' filter on '{}' needs a number column and a number value",
                            filter.op, filter.column
                        ));
                    }
                }
                FilterOp::Contains => {
                    if !filter.value.is_string() {
                        return Err(format!(
                            "'contains' filter on '{}' needs a text value",
                            filter.column
                        ));
                    }
                }
                FilterOp::Eq | FilterOp::Ne => {
                    if filter.value.is_array() || filter.value.is_object() {
                        return Err(format!(
                            "filter on '{}' compares against a non-scalar value",
                            filter.column
                        ));
                    }
                }
            }
        }

        if let Some(group_by) = &self.group_by {
            kind_of(group_by)?;
        }

        if let Some(column) = self.operation.numeric_column() {
            if kind_of(column)? != ColumnKind::Number {
                return Err(format!("column '{}' is not numeric", column));
            }
        }

        match &self.operation {
            Operation::CountDistinct { column } => {
                kind_of(column)?;
            }
            Operation::List { columns } => {
                if columns.is_empty() {
                    return Err("list needs at least one column".to_string());
                }
                if self.group_by.is_some() {
                    return Err("list cannot be grouped".to_string());
                }
                for column in columns {
                    kind_of(column)?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Run against the table. Assumes `validate` passed.
    pub fn execute(&self, table: &Table, max_rows: usize) -> std::result::Result<ComputationOutput, String> {
        if table.len() > max_rows {
            return Err(format!(
                "table has {} rows, more than the {} row budget",
                table.len(),
                max_rows
            ));
        }

        let filters = self
            .filters
            .iter()
            .map(|f| Ok((index_of(table, &f.column)?, f)))
            .collect::<std::result::Result<Vec<_>, String>>()?;

        let rows: Vec<&Vec<Value>> = table
            .rows()
            .iter()
            .filter(|row| filters.iter().all(|(i, f)| matches_filter(f, &row[*i])))
            .collect();

        if let Operation::List { columns } = &self.operation {
            let indices = columns
                .iter()
                .map(|c| index_of(table, c))
                .collect::<std::result::Result<Vec<_>, String>>()?;
            let mut projected: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect();
            if let Some(limit) = self.limit {
                projected.truncate(limit);
            }
            return Ok(ComputationOutput::Rows {
                columns: columns.clone(),
                rows: projected,
            });
        }

        let Some(group_by) = &self.group_by else {
            let value = aggregate(&self.operation, &rows, table)?;
            return Ok(ComputationOutput::Scalar { value });
        };

        // Groups keep first-appearance order unless an order is requested
        let key_index = index_of(table, group_by)?;
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut buckets: Vec<(String, Vec<&Vec<Value>>)> = Vec::new();
        for row in rows {
            let key = match &row[key_index] {
                Value::Null => BLANK_KEY.to_string(),
                other => other.group_key(),
            };
            let slot = *positions.entry(key.clone()).or_insert_with(|| {
                buckets.push((key, Vec::new()));
                buckets.len() - 1
            });
            buckets[slot].1.push(row);
        }

        let mut groups = buckets
            .into_iter()
            .map(|(key, rows)| {
                Ok(GroupValue {
                    key,
                    value: aggregate(&self.operation, &rows, table)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;

        if let Some(order) = self.order {
            groups.sort_by(|a, b| {
                let ordering = compare_values(&a.value, &b.value);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            groups.truncate(limit);
        }

        Ok(ComputationOutput::Groups { groups })
    }

    /// Human readable answer, produced without any model call
    pub fn render(&self, output: &ComputationOutput) -> String {
        let mut heading = self.operation.heading();
        if let Some(group_by) = &self.group_by {
            heading.push_str(&format!(" by {}", group_by));
        }

        match output {
            ComputationOutput::Scalar { value: Value::Null } => {
                format!("{}: no matching values", heading)
            }
            ComputationOutput::Scalar { value } => format!("{}: {}", heading, value),
            ComputationOutput::Groups { groups } if groups.is_empty() => {
                format!("{}: no matching rows", heading)
            }
            ComputationOutput::Groups { groups } => {
                let lines: Vec<String> = groups
                    .iter()
                    .map(|g| format!("- {}: {}", g.key, g.value))
                    .collect();
                format!("{}:\n{}", heading, lines.join("\n"))
            }
            ComputationOutput::Rows { rows, .. } if rows.is_empty() => {
                "No matching rows.".to_string()
            }
            ComputationOutput::Rows { columns, rows } => {
                let mut lines = vec![columns.join(" | ")];
                lines.extend(rows.iter().map(|row| {
                    row.iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(" | ")
                }));
                format!("{} ({}):\n{}", heading, rows.len(), lines.join("\n"))
            }
        }
    }
}

fn index_of(table: &Table, column: &str) -> std::result::Result<usize, String> {
    table
        .column_index(column)
        .ok_or_else(|| format!("column '{}' does not exist", column))
}

fn matches_filter(filter: &Filter, cell: &Value) -> bool {
    match filter.op {
        FilterOp::Eq => equals(cell, &filter.value),
        FilterOp::Ne => !equals(cell, &filter.value),
        FilterOp::Contains => match (cell, filter.value.as_str()) {
            (Value::Null, _) | (_, None) => false,
            (cell, Some(needle)) => cell
                .to_string()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        },
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let (Some(left), Some(right)) = (cell.as_f64(), filter.value.as_f64()) else {
                return false;
            };
            match filter.op {
                FilterOp::Gt => left > right,
                FilterOp::Gte => left >= right,
                FilterOp::Lt => left < right,
                _ => left <= right,
            }
        }
    }
}

fn equals(cell: &Value, expected: &serde_json::Value) -> bool {
    match (cell, expected) {
        (Value::Null, serde_json::Value::Null) => true,
        (Value::Null, _) | (_, serde_json::Value::Null) => false,
        (Value::Number(n), serde_json::Value::Number(m)) => m.as_f64() == Some(*n),
        (cell, serde_json::Value::String(s)) => cell.to_string().trim().eq_ignore_ascii_case(s.trim()),
        (cell, other) => cell.to_string() == other.to_string(),
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

fn aggregate(
    operation: &Operation,
    rows: &[&Vec<Value>],
    table: &Table,
) -> std::result::Result<Value, String> {
    let numbers = |column: &str| -> std::result::Result<Vec<f64>, String> {
        let i = index_of(table, column)?;
        Ok(rows.iter().filter_map(|row| row[i].as_f64()).collect())
    };

    let value = match operation {
        Operation::Count => Value::Number(rows.len() as f64),
        Operation::Sum { column } => Value::Number(numbers(column)?.iter().sum()),
        Operation::Mean { column } => {
            let values = numbers(column)?;
            if values.is_empty() {
                Value::Null
            } else {
                Value::Number(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Operation::Median { column } => {
            let mut values = numbers(column)?;
            if values.is_empty() {
                Value::Null
            } else {
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    Value::Number((values[mid - 1] + values[mid]) / 2.0)
                } else {
                    Value::Number(values[mid])
                }
            }
        }
        Operation::Min { column } => numbers(column)?
            .into_iter()
            .reduce(f64::min)
            .map_or(Value::Null, Value::Number),
        Operation::Max { column } => numbers(column)?
            .into_iter()
            .reduce(f64::max)
            .map_or(Value::Null, Value::Number),
        Operation::CountDistinct { column } => {
            let i = index_of(table, column)?;
            let distinct: HashSet<String> = rows
                .iter()
                .filter(|row| !row[i].is_null())
                .map(|row| row[i].to_string())
                .collect();
            Value::Number(distinct.len() as f64)
        }
        Operation::List { .. } => {
            return Err("list is not an aggregate".to_string());
        }
    };

    // Keep NaN and infinities out of rendered answers
    if let Value::Number(n) = value {
        if !n.is_finite() {
            return Err(format!("aggregate produced a non-finite value ({})", format_number(n)));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salaries() -> Table {
        Table::from_reader(
            "Name,Department,Salary\nAda,Eng,100\nGrace,Eng,200\nLinus,HR,150\n".as_bytes(),
        )
        .unwrap()
    }

    fn parse(json: &str) -> Computation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_group_by_mean() {
        let table = salaries();
        let computation = parse(
            r#"{"group_by": "Department", "operation": {"op": "mean", "column": "Salary"}}"#,
        );
        computation.validate(&table).unwrap();
        let output = computation.execute(&table, 100).unwrap();

        assert_eq!(output.group("Eng"), Some(&Value::Number(150.0)));
        assert_eq!(output.group("HR"), Some(&Value::Number(150.0)));
        assert_eq!(
            computation.render(&output),
            "Mean of Salary by Department:\n- Eng: 150\n- HR: 150"
        );
    }

    #[test]
    fn test_numeric_groups_are_not_rounded() {
        let table = Table::from_reader("Grade,Salary\n1.001,100\n1.004,200\n1.001,300\n".as_bytes())
            .unwrap();
        let computation = parse(r#"{"group_by": "Grade", "operation": {"op": "sum", "column": "Salary"}}"#);
        computation.validate(&table).unwrap();

        match computation.execute(&table, 100).unwrap() {
            ComputationOutput::Groups { groups } => {
                let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
                assert_eq!(keys, vec!["1.001", "1.004"]);
                assert_eq!(groups[0].value, Value::Number(400.0));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn test_filters_and_count() {
        let table = salaries();
        let computation = parse(
            r#"{"filters": [{"column": "Salary", "op": "gte", "value": 150},
                            {"column": "Department", "op": "eq", "value": "eng"}],
                "operation": {"op": "count"}}"#,
        );
        computation.validate(&table).unwrap();
        let output = computation.execute(&table, 100).unwrap();
        assert_eq!(output, ComputationOutput::Scalar { value: Value::Number(1.0) });
    }

    #[test]
    fn test_order_and_limit() {
        let table = salaries();
        let computation = parse(
            r#"{"group_by": "Department", "operation": {"op": "sum", "column": "Salary"},
                "order": "desc", "limit": 1}"#,
        );
        let output = computation.execute(&table, 100).unwrap();
        assert_eq!(computation.render(&output), "Sum of Salary by Department:\n- Eng: 300");
    }

    #[test]
    fn test_median_and_list() {
        let table = salaries();
        let median = parse(r#"{"operation": {"op": "median", "column": "Salary"}}"#);
        assert_eq!(
            median.execute(&table, 100).unwrap(),
            ComputationOutput::Scalar { value: Value::Number(150.0) }
        );

        let list = parse(
            r#"{"filters": [{"column": "Name", "op": "contains", "value": "a"}],
                "operation": {"op": "list", "columns": ["Name", "Salary"]}}"#,
        );
        let rendered = list.render(&list.execute(&table, 100).unwrap());
        assert_eq!(rendered, "Matching rows (2):\nName | Salary\nAda | 100\nGrace | 200");
    }

    #[test]
    fn test_schema_mismatch() {
        let table = salaries();
        let missing = parse(r#"{"operation": {"op": "mean", "column": "Bonus"}}"#);
        assert!(missing.validate(&table).unwrap_err().contains("Bonus"));

        let not_numeric = parse(r#"{"operation": {"op": "sum", "column": "Name"}}"#);
        assert!(not_numeric.validate(&table).is_err());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: std::result::Result<Computation, _> =
            serde_json::from_str(r#"{"operation": {"op": "count"}, "script": "rm -rf /"}"#);
        assert!(result.is_err());

        let result: std::result::Result<Computation, _> =
            serde_json::from_str(r#"{"operation": {"op": "shell", "column": "Name"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_row_budget() {
        let table = salaries();
        let computation = parse(r#"{"operation": {"op": "count"}}"#);
        assert!(computation.execute(&table, 2).is_err());
    }
}
