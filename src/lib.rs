//! Covistat - COVID-19 vaccination and mortality analysis pipeline
//!
//! This library loads the OWID vaccination-status and dosing exports,
//! compares death rates across vaccination status, correlates dosing
//! against mortality at configurable lags, and trains a random-forest
//! classifier for high-risk periods.

pub mod cleaner;
pub mod cli;
pub mod compare;
pub mod config;
pub mod forest;
pub mod lagcorr;
pub mod loader;
pub mod metrics;
pub mod model_store;
pub mod pipeline;
pub mod table;
