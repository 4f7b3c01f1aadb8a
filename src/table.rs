//! Schema-validated observation tables
//!
//! An observation table holds rows keyed by `(entity, date)` with named,
//! typed columns declared up front. The key is unique within one table;
//! inserting a second row for the same entity and day is an error.

use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

/// Errors for table construction and access
#[derive(Error, Debug)]
pub enum TableError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("column '{column}' is not {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("duplicate row key: ({entity}, {date})")]
    DuplicateKey { entity: String, date: NaiveDate },

    #[error("row has {actual} values, schema declares {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("column '{0}' already exists")]
    ColumnExists(String),

    #[error("column '{column}' has {actual} values for {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, TableError>;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// How to treat a missing numeric cell during loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Drop the whole row (the source treats the column as required)
    DropRow,
    /// Substitute 0.0 (missing means "no observations recorded")
    Zero,
}

/// One declared column: short name, header name in the raw file, type
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub source: String,
    pub kind: ColumnKind,
    pub missing: MissingPolicy,
}

impl ColumnSpec {
    pub fn numeric(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            kind: ColumnKind::Numeric,
            missing: MissingPolicy::DropRow,
        }
    }

    pub fn categorical(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            kind: ColumnKind::Categorical,
            missing: MissingPolicy::DropRow,
        }
    }

    /// Treat missing cells as zero instead of dropping the row
    pub fn missing_as_zero(mut self) -> Self {
        self.missing = MissingPolicy::Zero;
        self
    }
}

/// Column declarations for one dataset
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A single cell value supplied when pushing a row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone)]
enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

/// In-memory observation table with a unique `(entity, date)` row key
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    entities: Vec<String>,
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    index: HashMap<(String, NaiveDate), usize>,
}

impl Table {
    /// Create an empty table for the given schema
    pub fn new(schema: Schema) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| match c.kind {
                ColumnKind::Numeric => Column::Numeric(Vec::new()),
                ColumnKind::Categorical => Column::Categorical(Vec::new()),
            })
            .collect();
        Self {
            schema,
            entities: Vec::new(),
            dates: Vec::new(),
            columns,
            index: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Append one row. Values must match the schema's column order.
    pub fn push_row(&mut self, entity: &str, date: NaiveDate, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(TableError::ArityMismatch {
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        let key = (entity.to_string(), date);
        if self.index.contains_key(&key) {
            return Err(TableError::DuplicateKey {
                entity: entity.to_string(),
                date,
            });
        }
        // Validate all cells before mutating any column
        for (spec, value) in self.schema.columns().iter().zip(values.iter()) {
            match (spec.kind, value) {
                (ColumnKind::Numeric, Value::Number(_)) => {}
                (ColumnKind::Categorical, Value::Text(_)) => {}
                (ColumnKind::Numeric, _) => {
                    return Err(TableError::TypeMismatch {
                        column: spec.name.clone(),
                        expected: "numeric",
                    })
                }
                (ColumnKind::Categorical, _) => {
                    return Err(TableError::TypeMismatch {
                        column: spec.name.clone(),
                        expected: "categorical",
                    })
                }
            }
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            match (column, value) {
                (Column::Numeric(col), Value::Number(v)) => col.push(v),
                (Column::Categorical(col), Value::Text(v)) => col.push(v),
                _ => unreachable!("cells validated above"),
            }
        }
        self.index.insert(key, self.entities.len());
        self.entities.push(entity.to_string());
        self.dates.push(date);
        Ok(())
    }

    /// Values of a numeric column, in row order
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        let pos = self
            .schema
            .position(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        match &self.columns[pos] {
            Column::Numeric(col) => Ok(col),
            Column::Categorical(_) => Err(TableError::TypeMismatch {
                column: name.to_string(),
                expected: "numeric",
            }),
        }
    }

    /// Values of a categorical column, in row order
    pub fn categorical(&self, name: &str) -> Result<&[String]> {
        let pos = self
            .schema
            .position(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        match &self.columns[pos] {
            Column::Categorical(col) => Ok(col),
            Column::Numeric(_) => Err(TableError::TypeMismatch {
                column: name.to_string(),
                expected: "categorical",
            }),
        }
    }

    /// New table with one extra numeric column appended
    pub fn with_numeric_column(&self, name: &str, values: Vec<f64>) -> Result<Table> {
        if self.schema.spec(name).is_some() {
            return Err(TableError::ColumnExists(name.to_string()));
        }
        if values.len() != self.len() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.len(),
                actual: values.len(),
            });
        }
        let mut table = self.clone();
        table.schema.columns.push(ColumnSpec::numeric(name, name));
        table.columns.push(Column::Numeric(values));
        Ok(table)
    }

    /// New table containing the given rows (indices into this table)
    pub fn select(&self, rows: &[usize]) -> Table {
        let mut table = Table::new(self.schema.clone());
        for &i in rows {
            table.entities.push(self.entities[i].clone());
            table.dates.push(self.dates[i]);
        }
        for (dst, src) in table.columns.iter_mut().zip(self.columns.iter()) {
            match (dst, src) {
                (Column::Numeric(dst), Column::Numeric(src)) => {
                    dst.extend(rows.iter().map(|&i| src[i]));
                }
                (Column::Categorical(dst), Column::Categorical(src)) => {
                    dst.extend(rows.iter().map(|&i| src[i].clone()));
                }
                _ => unreachable!("schema shared with source table"),
            }
        }
        for (i, (entity, date)) in table
            .entities
            .iter()
            .zip(table.dates.iter())
            .enumerate()
        {
            table.index.insert((entity.clone(), *date), i);
        }
        table
    }

    /// Rows whose date lies in `[start, end]`, inclusive
    pub fn rows_in_window(&self, start: NaiveDate, end: NaiveDate) -> Vec<usize> {
        self.dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn contains_key(&self, entity: &str, date: NaiveDate) -> bool {
        self.index.contains_key(&(entity.to_string(), date))
    }

    /// Numeric columns as row-major feature vectors, excluding `exclude`.
    /// Returns the retained column names alongside the rows.
    pub fn numeric_matrix(&self, exclude: &[&str]) -> (Vec<String>, Vec<Vec<f64>>) {
        let kept: Vec<usize> = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ColumnKind::Numeric && !exclude.contains(&c.name.as_str()))
            .map(|(i, _)| i)
            .collect();
        let names = kept
            .iter()
            .map(|&i| self.schema.columns()[i].name.clone())
            .collect();
        let mut rows = vec![Vec::with_capacity(kept.len()); self.len()];
        for &ci in &kept {
            if let Column::Numeric(col) = &self.columns[ci] {
                for (row, &v) in rows.iter_mut().zip(col.iter()) {
                    row.push(v);
                }
            }
        }
        (names, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn two_column_schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::categorical("code", "Code"),
            ColumnSpec::numeric("rate", "Rate"),
        ])
    }

    #[test]
    fn test_push_and_read_back() {
        let mut table = Table::new(two_column_schema());
        table
            .push_row(
                "United States",
                day("2021-05-01"),
                vec![Value::Text("USA".into()), Value::Number(10.43)],
            )
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.numeric("rate").unwrap(), &[10.43]);
        assert_eq!(table.categorical("code").unwrap(), &["USA".to_string()]);
        assert!(table.contains_key("United States", day("2021-05-01")));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut table = Table::new(two_column_schema());
        let row = vec![Value::Text("USA".into()), Value::Number(1.0)];
        table
            .push_row("United States", day("2021-05-01"), row.clone())
            .unwrap();

        let err = table
            .push_row("United States", day("2021-05-01"), row)
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { .. }));
    }

    #[test]
    fn test_same_date_different_entity_allowed() {
        let mut table = Table::new(two_column_schema());
        table
            .push_row(
                "United States",
                day("2021-05-01"),
                vec![Value::Text("USA".into()), Value::Number(1.0)],
            )
            .unwrap();
        table
            .push_row(
                "Argentina",
                day("2021-05-01"),
                vec![Value::Text("ARG".into()), Value::Number(2.0)],
            )
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut table = Table::new(two_column_schema());
        let err = table
            .push_row(
                "United States",
                day("2021-05-01"),
                vec![Value::Number(1.0), Value::Number(2.0)],
            )
            .unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
        // Failed insert must not leave a partial row behind
        assert_eq!(table.len(), 0);
        assert_eq!(table.categorical("code").unwrap().len(), 0);
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let mut table = Table::new(two_column_schema());
        let err = table
            .push_row("United States", day("2021-05-01"), vec![Value::Number(1.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::ArityMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_unknown_column() {
        let table = Table::new(two_column_schema());
        assert!(matches!(
            table.numeric("nope").unwrap_err(),
            TableError::UnknownColumn(_)
        ));
    }

    #[test]
    fn test_with_numeric_column() {
        let mut table = Table::new(two_column_schema());
        table
            .push_row(
                "United States",
                day("2021-05-01"),
                vec![Value::Text("USA".into()), Value::Number(12.0)],
            )
            .unwrap();

        let labeled = table.with_numeric_column("high_risk", vec![1.0]).unwrap();
        assert_eq!(labeled.numeric("high_risk").unwrap(), &[1.0]);
        // Original table is untouched
        assert!(table.schema().spec("high_risk").is_none());
    }

    #[test]
    fn test_with_numeric_column_rejects_existing_name() {
        let table = Table::new(two_column_schema());
        let err = table.with_numeric_column("rate", vec![]).unwrap_err();
        assert!(matches!(err, TableError::ColumnExists(_)));
    }

    #[test]
    fn test_with_numeric_column_rejects_length_mismatch() {
        let table = Table::new(two_column_schema());
        let err = table.with_numeric_column("x", vec![1.0]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { .. }));
    }

    #[test]
    fn test_select_subset() {
        let mut table = Table::new(two_column_schema());
        for (i, d) in ["2021-05-01", "2021-05-08", "2021-05-15"].iter().enumerate() {
            table
                .push_row(
                    "United States",
                    day(d),
                    vec![Value::Text("USA".into()), Value::Number(i as f64)],
                )
                .unwrap();
        }

        let subset = table.select(&[0, 2]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.numeric("rate").unwrap(), &[0.0, 2.0]);
        assert!(subset.contains_key("United States", day("2021-05-15")));
        assert!(!subset.contains_key("United States", day("2021-05-08")));
    }

    #[test]
    fn test_rows_in_window_inclusive() {
        let mut table = Table::new(two_column_schema());
        for d in ["2021-01-01", "2021-06-01", "2021-12-31", "2022-01-01"] {
            table
                .push_row(
                    "United States",
                    day(d),
                    vec![Value::Text("USA".into()), Value::Number(0.0)],
                )
                .unwrap();
        }
        let rows = table.rows_in_window(day("2021-01-01"), day("2021-12-31"));
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_numeric_matrix_excludes_label() {
        let schema = Schema::new(vec![
            ColumnSpec::numeric("a", "A"),
            ColumnSpec::categorical("code", "Code"),
            ColumnSpec::numeric("b", "B"),
        ]);
        let mut table = Table::new(schema);
        table
            .push_row(
                "X",
                day("2021-05-01"),
                vec![
                    Value::Number(1.0),
                    Value::Text("x".into()),
                    Value::Number(2.0),
                ],
            )
            .unwrap();

        let (names, rows) = table.numeric_matrix(&["b"]);
        assert_eq!(names, vec!["a".to_string()]);
        assert_eq!(rows, vec![vec![1.0]]);
    }
}
