//! End-to-end analysis pipeline
//!
//! One `run` wires the stages together: load the two OWID exports, restrict
//! them to the analysis window, compare death rates across vaccination
//! status (Welch, ANOVA, Tukey), correlate dosing against mortality at the
//! configured lags, then train and evaluate the high-risk classifier. The
//! trained model, ROC curve, and a JSON report land in the output directory.

use crate::cleaner::{self, RISK_LABEL};
use crate::compare::{self, AnovaResult, Group, PairwiseComparison, TTestResult};
use crate::config::PipelineConfig;
use crate::forest::RandomForest;
use crate::lagcorr::{self, LagCorrelation, Series};
use crate::loader;
use crate::metrics::{self, ConfusionMatrix};
use crate::model_store::{self, ModelArtifact, ModelMetadata};
use crate::table::{ColumnSpec, Schema, Table};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// OWID export: weekly US death rates by vaccination status
pub const US_RATES_FILE: &str =
    "united-states-rates-of-covid-19-deaths-by-vaccination-status.csv";

/// OWID export: daily deaths and cumulative doses, all countries
pub const VACC_DEATHS_FILE: &str = "covid-vaccinations-vs-covid-death-rate.csv";

pub const COL_RATE_UNVACCINATED: &str = "death_rate_unvaccinated";
pub const COL_RATE_VACCINATED: &str = "death_rate_fully_vaccinated";
pub const COL_RATE_BIVALENT: &str = "death_rate_bivalent";
pub const COL_DAILY_DEATHS: &str = "daily_deaths_per_million";
pub const COL_DOSES: &str = "doses_per_hundred";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Loader(#[from] loader::LoaderError),

    #[error(transparent)]
    Table(#[from] crate::table::TableError),

    #[error(transparent)]
    Cleaner(#[from] cleaner::CleanerError),

    #[error(transparent)]
    Compare(#[from] compare::CompareError),

    #[error(transparent)]
    Forest(#[from] crate::forest::ForestError),

    #[error(transparent)]
    Metrics(#[from] metrics::MetricsError),

    #[error(transparent)]
    ModelStore(#[from] model_store::ModelStoreError),

    #[error("no rows from '{0}' inside the analysis window")]
    EmptyWindow(String),

    #[error("no rows for entity '{0}' inside the analysis window")]
    EmptyEntity(String),

    #[error("failed to write report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Schema for the US-by-vaccination-status export. The bivalent column is
/// blank before the booster rollout; those weeks count as zero deaths in
/// that group rather than being dropped.
pub fn us_rates_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::numeric(
            COL_RATE_UNVACCINATED,
            "Death rate (weekly) of unvaccinated people - United States, by age",
        )
        .missing_as_zero(),
        ColumnSpec::numeric(
            COL_RATE_VACCINATED,
            "Death rate (weekly) of fully vaccinated people (without bivalent booster) - United States, by age",
        )
        .missing_as_zero(),
        ColumnSpec::numeric(
            COL_RATE_BIVALENT,
            "Death rate (weekly) of people with a bivalent booster - United States, by age",
        )
        .missing_as_zero(),
    ])
}

/// Schema for the vaccinations-vs-death-rate export. Rows missing either
/// measurement carry no signal for the correlator and are dropped.
pub fn vacc_deaths_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::numeric(
            COL_DAILY_DEATHS,
            "Daily new confirmed deaths due to COVID-19 per million people (rolling 7-day average, right-aligned)",
        ),
        ColumnSpec::numeric(COL_DOSES, "COVID-19 doses (cumulative, per hundred)"),
    ])
}

/// Everything one run produced, serialized as the JSON report
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub generated_at: String,
    pub entity: String,
    pub window_start: String,
    pub window_end: String,
    pub risk_threshold: f64,
    pub seed: u64,
    pub welch: TTestResult,
    pub anova: AnovaResult,
    pub tukey: Vec<PairwiseComparison>,
    pub lag_correlations: Vec<LagCorrelation>,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub auc: f64,
    pub feature_importance: Vec<FeatureImportance>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub model_path: PathBuf,
    pub roc_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Run the full analysis and write artifacts to `cfg.out_dir`
pub fn run(cfg: &PipelineConfig) -> Result<PipelineReport> {
    cfg.validate()?;
    std::fs::create_dir_all(&cfg.out_dir)?;

    info!("loading {}", US_RATES_FILE);
    let us_rates = load_windowed(&cfg.data_dir.join(US_RATES_FILE), &us_rates_schema(), cfg)?;
    info!("loading {}", VACC_DEATHS_FILE);
    let vacc_deaths = load_windowed(
        &cfg.data_dir.join(VACC_DEATHS_FILE),
        &vacc_deaths_schema(),
        cfg,
    )?;

    // Stage 1: death rates across vaccination status
    let groups = status_groups(&us_rates)?;
    let welch = compare::welch_t_test(&groups[0].values, &groups[2].values)?;
    info!(
        "welch t-test unvaccinated vs bivalent: t = {:.3}, p = {:.2e}",
        welch.t, welch.p
    );
    let anova = compare::one_way_anova(&groups)?;
    info!("anova: F = {:.3}, p = {:.2e}", anova.f, anova.p);
    // Post-hoc comparisons are only meaningful when the omnibus test rejects
    let tukey = if anova.significant {
        compare::tukey_hsd(&groups, &anova)?
    } else {
        info!("omnibus test not significant; skipping post-hoc comparisons");
        Vec::new()
    };

    // Stage 2: dosing vs mortality at each lag
    let deaths = Series::from_table(&vacc_deaths, &cfg.entity, COL_DAILY_DEATHS)?;
    let doses = Series::from_table(&vacc_deaths, &cfg.entity, COL_DOSES)?;
    if deaths.is_empty() {
        return Err(PipelineError::EmptyEntity(cfg.entity.clone()));
    }
    let lag_correlations = lagcorr::lag_correlations(&deaths, &doses, &cfg.lags, &cfg.window);
    for lag in &lag_correlations {
        info!(
            "lag {:>2} days: r = {}, {} overlapping points",
            lag.lag_days,
            lag.r.map_or_else(|| "undefined".to_string(), |r| format!("{r:.4}")),
            lag.overlap
        );
    }

    // Stage 3: high-risk classifier
    let labeled = cleaner::binarize(&us_rates, COL_RATE_UNVACCINATED, cfg.risk_threshold)?;
    let split = cleaner::stratified_split(&labeled, RISK_LABEL, cfg.train_fraction, cfg.seed)?;

    let (feature_names, train_samples) = split.train.numeric_matrix(&[RISK_LABEL]);
    let train_labels = label_vector(&split.train)?;
    let (_, test_samples) = split.test.numeric_matrix(&[RISK_LABEL]);
    let test_labels = label_vector(&split.test)?;

    let mut forest = RandomForest::new(cfg.n_trees, cfg.max_depth, cfg.seed);
    forest.fit(&train_samples, &train_labels)?;
    info!(
        "trained forest: {} trees, depth limit {}, {} training rows",
        cfg.n_trees,
        cfg.max_depth,
        train_samples.len()
    );

    let predictions: Vec<bool> = test_samples
        .iter()
        .map(|s| forest.predict(s))
        .collect::<crate::forest::Result<_>>()?;
    let scores: Vec<f64> = test_samples
        .iter()
        .map(|s| forest.predict_proba(s))
        .collect::<crate::forest::Result<_>>()?;

    let confusion = ConfusionMatrix::from_predictions(&test_labels, &predictions)?;
    let roc = metrics::roc_curve(&test_labels, &scores)?;
    info!(
        "evaluation: accuracy = {:.3}, auc = {:.3} over {} test rows",
        confusion.accuracy(),
        roc.auc,
        test_labels.len()
    );

    let feature_importance = feature_names
        .iter()
        .zip(forest.feature_importance())
        .map(|(feature, &importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();

    // Artifacts
    let model_path = cfg.out_dir.join("risk_model.json");
    let metadata = ModelMetadata::new(train_samples.len())
        .with_hyperparameter("n_trees", cfg.n_trees.to_string())
        .with_hyperparameter("max_depth", cfg.max_depth.to_string())
        .with_hyperparameter("seed", cfg.seed.to_string())
        .with_hyperparameter("risk_threshold", cfg.risk_threshold.to_string())
        .with_description(format!(
            "high-risk classifier, {} to {}",
            cfg.window.start, cfg.window.end
        ));
    model_store::save_model(
        &ModelArtifact {
            metadata,
            model: forest,
        },
        &model_path,
    )?;

    let roc_path = cfg.out_dir.join("roc_curve.csv");
    model_store::write_roc_csv(&roc, &roc_path)?;

    let report = PipelineReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        entity: cfg.entity.clone(),
        window_start: cfg.window.start.to_string(),
        window_end: cfg.window.end.to_string(),
        risk_threshold: cfg.risk_threshold,
        seed: cfg.seed,
        welch,
        anova,
        tukey,
        lag_correlations,
        confusion,
        accuracy: confusion.accuracy(),
        auc: roc.auc,
        feature_importance,
        train_rows: train_samples.len(),
        test_rows: test_samples.len(),
        model_path,
        roc_path,
    };
    write_report(&report, &cfg.out_dir.join("analysis_report.json"))?;
    Ok(report)
}

fn load_windowed(path: &Path, schema: &Schema, cfg: &PipelineConfig) -> Result<Table> {
    let table = loader::load_table(path, schema)?;
    let rows = table.rows_in_window(cfg.window.start, cfg.window.end);
    if rows.is_empty() {
        return Err(PipelineError::EmptyWindow(
            path.file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
        ));
    }
    Ok(table.select(&rows))
}

/// The three vaccination-status groups of the US export, in fixed order:
/// unvaccinated, fully vaccinated, bivalent booster
fn status_groups(us_rates: &Table) -> Result<Vec<Group>> {
    Ok(vec![
        Group::new("unvaccinated", us_rates.numeric(COL_RATE_UNVACCINATED)?.to_vec()),
        Group::new("fully_vaccinated", us_rates.numeric(COL_RATE_VACCINATED)?.to_vec()),
        Group::new("bivalent_booster", us_rates.numeric(COL_RATE_BIVALENT)?.to_vec()),
    ])
}

fn label_vector(table: &Table) -> Result<Vec<u8>> {
    Ok(table
        .numeric(RISK_LABEL)?
        .iter()
        .map(|&l| u8::from(l == 1.0))
        .collect())
}

fn write_report(report: &PipelineReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    info!("report written to {}", path.display());
    Ok(())
}
