//! Persistence for trained classifier artifacts
//!
//! The trained forest is written as a JSON artifact carrying metadata
//! (crate version, training timestamp, sample count, hyperparameters) so a
//! later session can reload it without retraining. The ROC curve is written
//! as plain CSV for the dashboard collaborator to render.

use crate::forest::RandomForest;
use crate::metrics::RocCurve;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("model file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to serialize model: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid model artifact {path}: {source}")]
    InvalidArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelStoreError>;

/// Metadata for a persisted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// covistat version that trained this model
    pub version: String,
    /// Training timestamp (RFC 3339)
    pub trained_at: String,
    /// Number of training rows
    pub training_samples: usize,
    /// Model hyperparameters
    pub hyperparameters: HashMap<String, String>,
    /// Optional description
    pub description: Option<String>,
}

impl ModelMetadata {
    pub fn new(training_samples: usize) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now().to_rfc3339(),
            training_samples,
            hyperparameters: HashMap::new(),
            description: None,
        }
    }

    pub fn with_hyperparameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hyperparameters.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// A trained forest together with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub model: RandomForest,
}

/// Save a trained model as a JSON artifact
pub fn save_model(artifact: &ModelArtifact, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact).map_err(ModelStoreError::Serialize)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}

/// Load a model artifact saved by [`save_model`]
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelArtifact> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ModelStoreError::FileNotFound(path.to_path_buf()));
    }
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|source| ModelStoreError::InvalidArtifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Write ROC curve points as CSV (`threshold,false_positive_rate,true_positive_rate`)
pub fn write_roc_csv(curve: &RocCurve, path: impl AsRef<Path>) -> Result<()> {
    let mut output = String::from("threshold,false_positive_rate,true_positive_rate\n");
    for point in &curve.points {
        output.push_str(&format!(
            "{},{},{}\n",
            point.threshold, point.false_positive_rate, point.true_positive_rate
        ));
    }
    std::fs::write(path.as_ref(), output)?;
    Ok(())
}
