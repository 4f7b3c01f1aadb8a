use anyhow::Result;
use clap::Parser;
use covistat::{
    cli::Cli,
    config::{PipelineConfig, StoreConfig},
    lagcorr::DateWindow,
    pipeline,
};
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing: stderr always, plus an optional plain-text log file
fn init_tracing(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .with_writer(std::sync::Arc::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn print_report(report: &pipeline::PipelineReport) {
    println!("=== Covistat Analysis Report ===");
    println!(
        "Entity: {} ({} to {})",
        report.entity, report.window_start, report.window_end
    );
    println!();

    println!("Welch t-test (unvaccinated vs bivalent booster):");
    println!(
        "  t = {:.4}, df = {:.1}, p = {:.3e}, means {:.2} vs {:.2}{}",
        report.welch.t,
        report.welch.df,
        report.welch.p,
        report.welch.mean_a,
        report.welch.mean_b,
        if report.welch.significant {
            " [significant]"
        } else {
            ""
        }
    );

    println!("One-way ANOVA across vaccination status:");
    println!(
        "  F = {:.4}, df = ({:.0}, {:.0}), p = {:.3e}{}",
        report.anova.f,
        report.anova.df_between,
        report.anova.df_within,
        report.anova.p,
        if report.anova.significant {
            " [significant]"
        } else {
            ""
        }
    );

    println!("Tukey HSD pairwise comparisons:");
    for pair in &report.tukey {
        println!(
            "  {} vs {}: diff = {:.3}, q = {:.3}, p = {:.4}{}",
            pair.group_a,
            pair.group_b,
            pair.mean_diff,
            pair.q,
            pair.p_adjusted,
            if pair.significant { " [significant]" } else { "" }
        );
    }

    println!("Lag correlations (doses vs daily deaths):");
    for lag in &report.lag_correlations {
        match lag.r {
            Some(r) => println!(
                "  lag {:>2} days: r = {:+.4} ({} points)",
                lag.lag_days, r, lag.overlap
            ),
            None => println!(
                "  lag {:>2} days: undefined ({} points)",
                lag.lag_days, lag.overlap
            ),
        }
    }

    println!("High-risk classifier:");
    println!(
        "  accuracy = {:.3}, auc = {:.3} ({} train / {} test rows)",
        report.accuracy, report.auc, report.train_rows, report.test_rows
    );
    println!(
        "  confusion: tp = {}, fp = {}, tn = {}, fn = {}",
        report.confusion.true_pos,
        report.confusion.false_pos,
        report.confusion.true_neg,
        report.confusion.false_neg
    );
    for fi in &report.feature_importance {
        println!("  importance {}: {:.4}", fi.feature, fi.importance);
    }

    println!();
    println!("Model:  {}", report.model_path.display());
    println!("ROC:    {}", report.roc_path.display());
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_file.as_deref())?;

    // The dashboard reads these artifacts out of MongoDB; a missing
    // connection config means the downstream publish step will fail, so
    // flag it up front without blocking the analysis itself.
    if let Err(e) = StoreConfig::from_env() {
        tracing::warn!("document store not configured: {}", e);
    }

    let config = PipelineConfig {
        data_dir: cli.data_dir,
        out_dir: cli.out_dir,
        risk_threshold: cli.risk_threshold,
        seed: cli.seed,
        train_fraction: cli.train_fraction,
        lags: cli.lags,
        window: DateWindow::new(cli.window_start, cli.window_end),
        entity: cli.entity,
        n_trees: cli.trees,
        max_depth: cli.max_depth,
    };

    let report = pipeline::run(&config)?;
    print_report(&report);
    Ok(())
}
