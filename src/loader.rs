//! Delimited-file loading into observation tables
//!
//! Reads an OWID-style CSV export (`Entity, Code, Day, <series...>`) into a
//! [`Table`](crate::table::Table) against a declared schema. A path that does
//! not resolve is fatal and surfaces as [`LoaderError::FileNotFound`]; there
//! is no retry. Rows with an unparseable day, or with a missing value in a
//! required column, are dropped and counted.

use crate::table::{MissingPolicy, Schema, Table, Value};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Header name of the entity key column
pub const ENTITY_COLUMN: &str = "Entity";
/// Header name of the date key column (`YYYY-MM-DD`)
pub const DATE_COLUMN: &str = "Day";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}: file is empty")]
    Empty { path: PathBuf },

    #[error(transparent)]
    Table(#[from] crate::table::TableError),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Load a CSV file into a table, keeping only the schema's columns
pub fn load_table(path: &Path, schema: &Schema) -> Result<Table> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoaderError::FileNotFound(path.to_path_buf())
        } else {
            LoaderError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let mut lines = raw.lines();
    let header_line = lines.next().ok_or_else(|| LoaderError::Empty {
        path: path.to_path_buf(),
    })?;
    let header = split_fields(header_line);

    let missing = |column: &str| LoaderError::MissingColumn {
        path: path.to_path_buf(),
        column: column.to_string(),
    };
    let find = |name: &str| header.iter().position(|h| h == name);

    let entity_pos = find(ENTITY_COLUMN).ok_or_else(|| missing(ENTITY_COLUMN))?;
    let date_pos = find(DATE_COLUMN).ok_or_else(|| missing(DATE_COLUMN))?;
    let mut column_pos = Vec::with_capacity(schema.columns().len());
    for spec in schema.columns() {
        column_pos.push(find(&spec.source).ok_or_else(|| missing(&spec.source))?);
    }

    let mut table = Table::new(schema.clone());
    let mut dropped = 0usize;

    'rows: for line in lines {
        if line.is_empty() {
            continue;
        }
        let fields = split_fields(line);
        let cell = |pos: usize| fields.get(pos).map(String::as_str).unwrap_or("");

        let entity = cell(entity_pos);
        let date = match NaiveDate::parse_from_str(cell(date_pos), "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };

        let mut values = Vec::with_capacity(schema.columns().len());
        for (spec, &pos) in schema.columns().iter().zip(column_pos.iter()) {
            let raw = cell(pos);
            match spec.kind {
                crate::table::ColumnKind::Categorical => {
                    values.push(Value::Text(raw.to_string()));
                }
                crate::table::ColumnKind::Numeric => match raw.parse::<f64>() {
                    Ok(v) => values.push(Value::Number(v)),
                    Err(_) => match spec.missing {
                        MissingPolicy::Zero => values.push(Value::Number(0.0)),
                        MissingPolicy::DropRow => {
                            dropped += 1;
                            continue 'rows;
                        }
                    },
                },
            }
        }

        table.push_row(entity, date, values)?;
    }

    if dropped > 0 {
        warn!(
            "{}: dropped {} rows with missing or unparseable values",
            path.display(),
            dropped
        );
    }
    info!("loaded {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Split one CSV line into fields, honoring double-quote escaping
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
