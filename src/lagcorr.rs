//! Lag correlation between date-indexed series
//!
//! For each requested lag L (in days), the second series is shifted forward
//! by L days and the Pearson coefficient is computed against the unshifted
//! first series over the overlapping dates inside an inclusive window. A lag
//! whose overlap holds fewer than two paired points, or where either side
//! has zero variance, is reported as undefined rather than failing the run.

use crate::table::Table;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Inclusive date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// A numeric time series indexed by date
#[derive(Debug, Clone, Default)]
pub struct Series {
    points: BTreeMap<NaiveDate, f64>,
}

impl Series {
    pub fn from_points(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }

    /// Extract one entity's column from an observation table
    pub fn from_table(
        table: &Table,
        entity: &str,
        column: &str,
    ) -> crate::table::Result<Self> {
        let values = table.numeric(column)?;
        let points = table
            .entities()
            .iter()
            .zip(table.dates().iter())
            .zip(values.iter())
            .filter(|((e, _), _)| e.as_str() == entity)
            .map(|((_, d), &v)| (*d, v))
            .collect();
        Ok(Self { points })
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The subset of points inside the window
    pub fn restrict(&self, window: &DateWindow) -> Series {
        Series {
            points: self
                .points
                .range(window.start..=window.end)
                .map(|(d, v)| (*d, *v))
                .collect(),
        }
    }
}

/// Correlation at one lag; `r` is `None` when undefined
#[derive(Debug, Clone, Serialize)]
pub struct LagCorrelation {
    pub lag_days: i64,
    pub r: Option<f64>,
    pub overlap: usize,
}

/// Pearson correlation of `x(d)` against `y(d - lag)` for each lag, over the
/// overlapping dates of both windowed series
pub fn lag_correlations(
    x: &Series,
    y: &Series,
    lags: &[i64],
    window: &DateWindow,
) -> Vec<LagCorrelation> {
    let x = x.restrict(window);
    let y = y.restrict(window);

    lags.iter()
        .map(|&lag| {
            let mut xs = Vec::new();
            let mut ys = Vec::new();
            for (&date, &xv) in &x.points {
                if let Some(yv) = y.get(date - Duration::days(lag)) {
                    xs.push(xv);
                    ys.push(yv);
                }
            }
            let overlap = xs.len();
            let r = pearson(&xs, &ys);
            if r.is_none() {
                warn!(
                    "correlation undefined at lag {} days ({} overlapping points)",
                    lag, overlap
                );
            }
            LagCorrelation {
                lag_days: lag,
                r,
                overlap,
            }
        })
        .collect()
}

/// Pearson correlation coefficient; `None` when fewer than two pairs or when
/// either side is constant
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mx = xs.iter().sum::<f64>() / nf;
    let my = ys.iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    // sqrt(vx * vy) keeps the self-correlation case exact: when vx == vy == cov
    // the quotient is cov / |cov| = 1.0 with no rounding drift
    Some(cov / (vx * vy).sqrt())
}
