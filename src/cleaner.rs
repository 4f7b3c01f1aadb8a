//! Risk-label derivation and the train/test split
//!
//! The risk label is a fixed-threshold binarization of one numeric column
//! (`value > threshold` maps to 1.0, else 0.0). It is derived once during
//! cleaning; re-deriving on an already labeled table is an error. The split
//! is stratified by label so both subsets keep the class proportions, and is
//! fully determined by the seed.

use crate::table::{Table, TableError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tracing::info;

/// Name of the derived label column
pub const RISK_LABEL: &str = "high_risk";

/// Threshold used by the reference run
pub const DEFAULT_RISK_THRESHOLD: f64 = 10.0;

/// Train fraction used by the reference run
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("label column '{0}' already present; the risk label is derived once")]
    LabelExists(String),

    #[error("train fraction {0} is outside (0, 1)")]
    BadFraction(f64),

    #[error("label column '{column}' holds {value}, expected 0 or 1")]
    NonBinaryLabel { column: String, value: f64 },

    #[error(transparent)]
    Table(#[from] TableError),
}

pub type Result<T> = std::result::Result<T, CleanerError>;

/// Derive the binary risk label from `column` at the given threshold
pub fn binarize(table: &Table, column: &str, threshold: f64) -> Result<Table> {
    if table.schema().spec(RISK_LABEL).is_some() {
        return Err(CleanerError::LabelExists(RISK_LABEL.to_string()));
    }
    let values = table.numeric(column)?;
    let labels: Vec<f64> = values
        .iter()
        .map(|&v| if v > threshold { 1.0 } else { 0.0 })
        .collect();
    let positives = labels.iter().filter(|&&l| l == 1.0).count();
    info!(
        "derived '{}' from '{}' at threshold {}: {} of {} rows labeled 1",
        RISK_LABEL,
        column,
        threshold,
        positives,
        labels.len()
    );
    Ok(table.with_numeric_column(RISK_LABEL, labels)?)
}

/// The two disjoint tables produced by the split
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Table,
    pub test: Table,
}

/// Stratified random split. Within each label class the rows are shuffled
/// with a seeded generator and the first `round(n * train_fraction)` go to
/// the train subset, so the class proportions deviate by at most one row.
pub fn stratified_split(
    table: &Table,
    label: &str,
    train_fraction: f64,
    seed: u64,
) -> Result<Split> {
    if !(0.0..1.0).contains(&train_fraction) || train_fraction == 0.0 {
        return Err(CleanerError::BadFraction(train_fraction));
    }
    let labels = table.numeric(label)?;

    let mut positives = Vec::new();
    let mut negatives = Vec::new();
    for (i, &l) in labels.iter().enumerate() {
        if l == 1.0 {
            positives.push(i);
        } else if l == 0.0 {
            negatives.push(i);
        } else {
            return Err(CleanerError::NonBinaryLabel {
                column: label.to_string(),
                value: l,
            });
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    for class in [&mut negatives, &mut positives] {
        class.shuffle(&mut rng);
        let n_train = (class.len() as f64 * train_fraction).round() as usize;
        train_rows.extend_from_slice(&class[..n_train]);
        test_rows.extend_from_slice(&class[n_train..]);
    }
    // Row order inside each subset follows the original table, not the shuffle
    train_rows.sort_unstable();
    test_rows.sort_unstable();

    info!(
        "stratified split (seed {}): {} train rows, {} test rows",
        seed,
        train_rows.len(),
        test_rows.len()
    );
    Ok(Split {
        train: table.select(&train_rows),
        test: table.select(&test_rows),
    })
}
