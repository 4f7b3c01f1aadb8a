//! CLI argument parsing

use crate::cleaner::{DEFAULT_RISK_THRESHOLD, DEFAULT_TRAIN_FRACTION};
use crate::forest::{DEFAULT_MAX_DEPTH, DEFAULT_TREE_COUNT};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "covistat")]
#[command(version)]
#[command(about = "COVID-19 vaccination and mortality analysis pipeline", long_about = None)]
pub struct Cli {
    /// Directory holding the raw OWID CSV exports
    #[arg(long, default_value = "data/raw")]
    pub data_dir: PathBuf,

    /// Directory receiving model, ROC, and report artifacts
    #[arg(long, default_value = "data/processed")]
    pub out_dir: PathBuf,

    /// Weekly death rate (per 100k) above which a period counts as high-risk
    #[arg(long, default_value_t = DEFAULT_RISK_THRESHOLD)]
    pub risk_threshold: f64,

    /// RNG seed shared by the train/test split and the forest
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of each class assigned to training
    #[arg(long, default_value_t = DEFAULT_TRAIN_FRACTION)]
    pub train_fraction: f64,

    /// Lags in days evaluated by the temporal correlator
    #[arg(long, value_delimiter = ',', default_value = "7,14,21")]
    pub lags: Vec<i64>,

    /// Start of the analysis window (inclusive, YYYY-MM-DD)
    #[arg(long, default_value = "2021-01-01")]
    pub window_start: NaiveDate,

    /// End of the analysis window (inclusive, YYYY-MM-DD)
    #[arg(long, default_value = "2022-03-31")]
    pub window_end: NaiveDate,

    /// Entity analyzed by the temporal correlator
    #[arg(long, default_value = "United States")]
    pub entity: String,

    /// Number of trees in the forest
    #[arg(long, default_value_t = DEFAULT_TREE_COUNT)]
    pub trees: usize,

    /// Per-tree depth limit
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug-level logging
    #[arg(short, long)]
    pub debug: bool,
}
