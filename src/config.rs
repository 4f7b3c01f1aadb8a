//! Pipeline and store configuration
//!
//! `PipelineConfig` is assembled from the CLI; `StoreConfig` reads the
//! MongoDB connection settings from the environment. The pipeline itself
//! never opens a database connection (the dashboard collaborator does), but
//! validating the variables up front surfaces a misconfigured deployment
//! before a long analysis run rather than after.

use crate::lagcorr::DateWindow;
use std::path::PathBuf;
use thiserror::Error;

pub const ENV_MONGO_URI: &str = "MONGO_URI";
pub const ENV_DATABASE_NAME: &str = "DATABASE_NAME";

/// Largest lag magnitude, in days, the correlator accepts. Ten years is far
/// beyond any plausible epidemiological lag and keeps the day arithmetic well
/// clear of `chrono::Duration` overflow.
pub const MAX_LAG_DAYS: i64 = 3650;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {0} is not valid UTF-8")]
    InvalidEnv(&'static str),

    #[error("lag of {0} days is outside the supported range of +/-3650 days")]
    LagOutOfRange(i64),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Connection settings for the downstream document store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub mongo_uri: String,
    pub database_name: String,
}

impl StoreConfig {
    /// Read `MONGO_URI` and `DATABASE_NAME` from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            mongo_uri: read_env(ENV_MONGO_URI)?,
            database_name: read_env(ENV_DATABASE_NAME)?,
        })
    }
}

fn read_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        Ok(_) | Err(std::env::VarError::NotPresent) => Err(ConfigError::MissingEnv(name)),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnv(name)),
    }
}

/// Everything one pipeline run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the raw CSV exports
    pub data_dir: PathBuf,
    /// Directory receiving the model, ROC curve, and report artifacts
    pub out_dir: PathBuf,
    /// Death-rate threshold separating high-risk from low-risk periods
    pub risk_threshold: f64,
    /// RNG seed shared by the split and the forest
    pub seed: u64,
    /// Fraction of each class assigned to the training split
    pub train_fraction: f64,
    /// Lags (in days) evaluated by the temporal correlator
    pub lags: Vec<i64>,
    /// Inclusive analysis window
    pub window: DateWindow,
    /// Entity analyzed by the temporal correlator
    pub entity: String,
    /// Forest size
    pub n_trees: usize,
    /// Per-tree depth limit
    pub max_depth: usize,
}

impl PipelineConfig {
    /// Reject parameter combinations the pipeline cannot evaluate safely
    pub fn validate(&self) -> Result<()> {
        for &lag in &self.lags {
            // Range check rather than abs(): abs() itself overflows on i64::MIN
            if !(-MAX_LAG_DAYS..=MAX_LAG_DAYS).contains(&lag) {
                return Err(ConfigError::LagOutOfRange(lag));
            }
        }
        Ok(())
    }
}
