//! End-to-end pipeline tests
//!
//! Builds small OWID-shaped CSV fixtures in a temp directory, runs the full
//! pipeline, and checks the statistical conclusions and artifacts.

use chrono::{Duration, NaiveDate};
use covistat::config::PipelineConfig;
use covistat::lagcorr::DateWindow;
use covistat::pipeline::{self, US_RATES_FILE, VACC_DEATHS_FILE};
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

const US_RATES_HEADER: &str = concat!(
    "Entity,Day,",
    "\"Death rate (weekly) of unvaccinated people - United States, by age\",",
    "\"Death rate (weekly) of fully vaccinated people (without bivalent booster) - United States, by age\",",
    "\"Death rate (weekly) of people with a bivalent booster - United States, by age\"",
);

const VACC_DEATHS_HEADER: &str = concat!(
    "Entity,Day,",
    "\"Daily new confirmed deaths due to COVID-19 per million people (rolling 7-day average, right-aligned)\",",
    "\"COVID-19 doses (cumulative, per hundred)\"",
);

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Weekly US rates: unvaccinated alternates above and below the risk
/// threshold, vaccinated sits in between, bivalent stays near zero. Means
/// land close to the observed 10.43 vs 0.21 contrast.
fn write_us_rates(data_dir: &Path, weeks: usize) {
    let mut csv = String::from(US_RATES_HEADER);
    csv.push('\n');
    let start = day("2021-01-02");
    for i in 0..weeks {
        let date = start + Duration::days(7 * i as i64);
        let unvax = if i % 2 == 0 {
            16.0 + 0.3 * (i as f64)
        } else {
            4.0 + 0.1 * (i as f64)
        };
        let vax = 1.2 + 0.05 * (i as f64);
        let bivalent = 0.15 + 0.01 * (i as f64);
        writeln!(csv, "United States,{date},{unvax},{vax},{bivalent}").unwrap();
    }
    std::fs::write(data_dir.join(US_RATES_FILE), csv).unwrap();
}

/// Daily dosing and deaths for two entities: deaths echo the dosing curve
/// seven days later, so the correlator should peak at lag 7. The second
/// entity is noise the pipeline must filter out.
fn write_vacc_deaths(data_dir: &Path, days: usize) {
    let mut csv = String::from(VACC_DEATHS_HEADER);
    csv.push('\n');
    let start = day("2021-01-01");
    for i in 0..days {
        let date = start + Duration::days(i as i64);
        let doses = (i as f64) * 0.7;
        let deaths = if i >= 7 {
            ((i - 7) as f64) * 0.7 * 2.0 + 1.0
        } else {
            1.0
        };
        writeln!(csv, "United States,{date},{deaths},{doses}").unwrap();
        writeln!(csv, "Argentina,{date},{},{}", 50.0 - i as f64, 3.0).unwrap();
    }
    std::fs::write(data_dir.join(VACC_DEATHS_FILE), csv).unwrap();
}

fn test_config(data_dir: &Path, out_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: data_dir.to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        risk_threshold: 10.0,
        seed: 42,
        train_fraction: 0.8,
        lags: vec![7, 14, 21],
        window: DateWindow::new(day("2021-01-01"), day("2022-03-31")),
        entity: "United States".to_string(),
        n_trees: 50,
        max_depth: 8,
    }
}

fn run_fixture() -> (TempDir, pipeline::PipelineReport) {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("raw");
    let out_dir = dir.path().join("processed");
    std::fs::create_dir_all(&data_dir).unwrap();

    write_us_rates(&data_dir, 60);
    write_vacc_deaths(&data_dir, 120);

    let report = pipeline::run(&test_config(&data_dir, &out_dir)).unwrap();
    (dir, report)
}

#[test]
fn test_group_comparison_detects_status_contrast() {
    let (_dir, report) = run_fixture();

    assert!(report.welch.significant, "welch p = {}", report.welch.p);
    assert!(report.welch.p < 0.05);
    assert!(report.welch.mean_a > report.welch.mean_b);

    assert!(report.anova.significant, "anova p = {}", report.anova.p);
    assert_eq!(report.anova.groups.len(), 3);

    // Unvaccinated vs bivalent is the widest contrast and must survive the
    // Tukey adjustment
    let pair = report
        .tukey
        .iter()
        .find(|p| {
            (p.group_a == "unvaccinated" && p.group_b == "bivalent_booster")
                || (p.group_a == "bivalent_booster" && p.group_b == "unvaccinated")
        })
        .expect("missing unvaccinated/bivalent pair");
    assert!(pair.significant, "tukey p = {}", pair.p_adjusted);
}

#[test]
fn test_correlator_peaks_at_the_built_in_lag() {
    let (_dir, report) = run_fixture();

    assert_eq!(
        report
            .lag_correlations
            .iter()
            .map(|l| l.lag_days)
            .collect::<Vec<_>>(),
        vec![7, 14, 21]
    );
    let at_7 = &report.lag_correlations[0];
    let r = at_7.r.expect("lag 7 should be defined");
    assert!(r > 0.99, "r at lag 7 = {r}");
    assert!(at_7.overlap > 50);
    // Deaths were built as an exact echo at 7 days, so 14 and 21 correlate
    // strongly too (the dosing curve is monotone) but not better
    for other in &report.lag_correlations[1..] {
        assert!(other.r.expect("defined") <= r + 1e-9);
    }
}

#[test]
fn test_classifier_separates_risk_classes() {
    let (_dir, report) = run_fixture();

    assert!(report.accuracy > 0.9, "accuracy = {}", report.accuracy);
    assert!(report.auc > 0.9, "auc = {}", report.auc);
    assert_eq!(
        report.confusion.true_pos
            + report.confusion.false_pos
            + report.confusion.true_neg
            + report.confusion.false_neg,
        report.test_rows
    );
    assert_eq!(report.train_rows + report.test_rows, 60);

    // The label was derived from the unvaccinated rate, so that feature
    // should dominate the importance ranking
    let top = report
        .feature_importance
        .iter()
        .max_by(|a, b| a.importance.partial_cmp(&b.importance).unwrap())
        .unwrap();
    assert_eq!(top.feature, "death_rate_unvaccinated");
}

#[test]
fn test_artifacts_written() {
    let (_dir, report) = run_fixture();

    assert!(report.model_path.exists());
    assert!(report.roc_path.exists());

    let roc = std::fs::read_to_string(&report.roc_path).unwrap();
    assert!(roc.starts_with("threshold,false_positive_rate,true_positive_rate"));

    let loaded = covistat::model_store::load_model(&report.model_path).unwrap();
    assert!(loaded.model.is_fitted());
    assert_eq!(loaded.metadata.training_samples, report.train_rows);

    let report_path = report.model_path.parent().unwrap().join("analysis_report.json");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(json["entity"], "United States");
    assert!(json["auc"].is_number());
}

#[test]
fn test_runs_are_deterministic_for_a_seed() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("raw");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_us_rates(&data_dir, 60);
    write_vacc_deaths(&data_dir, 120);

    let a = pipeline::run(&test_config(&data_dir, &dir.path().join("out_a"))).unwrap();
    let b = pipeline::run(&test_config(&data_dir, &dir.path().join("out_b"))).unwrap();

    assert_eq!(a.accuracy, b.accuracy);
    assert_eq!(a.auc, b.auc);
    assert_eq!(a.confusion, b.confusion);
    assert_eq!(a.welch.p, b.welch.p);
}

/// Like `write_us_rates`, but all three status groups share one series, so
/// the omnibus test has nothing to reject
fn write_us_rates_uniform(data_dir: &Path, weeks: usize) {
    let mut csv = String::from(US_RATES_HEADER);
    csv.push('\n');
    let start = day("2021-01-02");
    for i in 0..weeks {
        let date = start + Duration::days(7 * i as i64);
        let rate = if i % 2 == 0 { 16.0 } else { 4.0 };
        writeln!(csv, "United States,{date},{rate},{rate},{rate}").unwrap();
    }
    std::fs::write(data_dir.join(US_RATES_FILE), csv).unwrap();
}

#[test]
fn test_posthoc_skipped_when_omnibus_not_significant() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("raw");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_us_rates_uniform(&data_dir, 60);
    write_vacc_deaths(&data_dir, 120);

    let report = pipeline::run(&test_config(&data_dir, &dir.path().join("out"))).unwrap();
    assert!(!report.anova.significant, "anova p = {}", report.anova.p);
    assert!(report.tukey.is_empty());
}

#[test]
fn test_extreme_lag_rejected_before_any_work() {
    let dir = TempDir::new().unwrap();
    // No input files: the lag check must fire before anything is read
    let mut config = test_config(&dir.path().join("raw"), &dir.path().join("out"));
    config.lags = vec![7, i64::MAX];

    let err = pipeline::run(&config).unwrap_err();
    assert!(matches!(err, pipeline::PipelineError::Config(_)));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_missing_input_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("raw");
    std::fs::create_dir_all(&data_dir).unwrap();
    // Only one of the two exports present
    write_us_rates(&data_dir, 20);

    let err = pipeline::run(&test_config(&data_dir, &dir.path().join("out"))).unwrap_err();
    assert!(matches!(err, pipeline::PipelineError::Loader(_)));
}
