//! Group mean comparisons
//!
//! Two operations over numeric samples:
//!
//! - [`welch_t_test`]: two-sample mean-difference test with unequal variances
//!   (Welch). Reports "statistically significant" when p < 0.05.
//! - [`one_way_anova`] + [`tukey_hsd`]: omnibus F-test over three or more
//!   groups, with Tukey's post-hoc pairwise comparisons under family-wise
//!   error control when the omnibus test is significant.
//!
//! Groups with fewer than two observations cannot contribute a variance and
//! are excluded from the omnibus test with a warning rather than failing the
//! whole comparison.
//!
//! The Tukey adjustment needs the studentized range distribution, which
//! statrs does not ship; [`studentized_range_cdf`] evaluates it by numerical
//! integration over the standard normal CDF, with the scale integrated
//! against a scaled-chi density for finite degrees of freedom.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};
use statrs::function::gamma::ln_gamma;
use thiserror::Error;
use tracing::warn;

/// Family-wise significance level for every decision in this module
pub const ALPHA: f64 = 0.05;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("sample needs at least {required} observations, got {actual}")]
    InsufficientObservations { required: usize, actual: usize },

    #[error("omnibus test needs at least {required} usable groups, got {actual}")]
    TooFewGroups { required: usize, actual: usize },

    #[error("invalid distribution parameters: {0}")]
    Distribution(String),
}

pub type Result<T> = std::result::Result<T, CompareError>;

/// One named sample for the omnibus test
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub values: Vec<f64>,
}

impl Group {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Result of a Welch two-sample test
#[derive(Debug, Clone, Serialize)]
pub struct TTestResult {
    pub t: f64,
    pub df: f64,
    pub p: f64,
    pub mean_a: f64,
    pub mean_b: f64,
    pub significant: bool,
}

/// Per-group summary carried in the omnibus result
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub n: usize,
    pub mean: f64,
}

/// Result of the one-way ANOVA omnibus test
#[derive(Debug, Clone, Serialize)]
pub struct AnovaResult {
    pub f: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub p: f64,
    pub significant: bool,
    pub groups: Vec<GroupSummary>,
    /// Groups dropped for having fewer than two observations
    pub excluded: Vec<String>,
    #[serde(skip)]
    pub(crate) mean_square_within: f64,
}

/// One Tukey HSD pairwise comparison
#[derive(Debug, Clone, Serialize)]
pub struct PairwiseComparison {
    pub group_a: String,
    pub group_b: String,
    pub mean_diff: f64,
    pub q: f64,
    pub p_adjusted: f64,
    pub significant: bool,
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator)
fn variance(xs: &[f64], m: f64) -> f64 {
    xs.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64
}

fn std_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| CompareError::Distribution(e.to_string()))
}

/// Welch's two-sample t-test for a difference in means
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TTestResult> {
    for sample in [a, b] {
        if sample.len() < 2 {
            return Err(CompareError::InsufficientObservations {
                required: 2,
                actual: sample.len(),
            });
        }
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (variance(a, ma), variance(b, mb));
    let se2 = va / na + vb / nb;

    if se2 == 0.0 {
        // Both samples are constant: the observed difference is exact
        let differ = ma != mb;
        return Ok(TTestResult {
            t: if differ { f64::INFINITY } else { 0.0 },
            df: na + nb - 2.0,
            p: if differ { 0.0 } else { 1.0 },
            mean_a: ma,
            mean_b: mb,
            significant: differ,
        });
    }

    let t = (ma - mb) / se2.sqrt();
    // Welch-Satterthwaite degrees of freedom
    let df = se2 * se2
        / ((va / na) * (va / na) / (na - 1.0) + (vb / nb) * (vb / nb) / (nb - 1.0));
    let dist =
        StudentsT::new(0.0, 1.0, df).map_err(|e| CompareError::Distribution(e.to_string()))?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));

    Ok(TTestResult {
        t,
        df,
        p,
        mean_a: ma,
        mean_b: mb,
        significant: p < ALPHA,
    })
}

/// One-way ANOVA over named groups, excluding groups with fewer than two
/// observations
pub fn one_way_anova(groups: &[Group]) -> Result<AnovaResult> {
    let mut excluded = Vec::new();
    let usable: Vec<&Group> = groups
        .iter()
        .filter(|g| {
            if g.values.len() < 2 {
                warn!(
                    "excluding group '{}' from omnibus test: only {} observation(s)",
                    g.name,
                    g.values.len()
                );
                excluded.push(g.name.clone());
                false
            } else {
                true
            }
        })
        .collect();

    if usable.len() < 2 {
        return Err(CompareError::TooFewGroups {
            required: 2,
            actual: usable.len(),
        });
    }

    let k = usable.len() as f64;
    let n_total: usize = usable.iter().map(|g| g.values.len()).sum();
    let grand_mean =
        usable.iter().flat_map(|g| g.values.iter()).sum::<f64>() / n_total as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    let mut summaries = Vec::with_capacity(usable.len());
    for group in &usable {
        let m = mean(&group.values);
        let n = group.values.len();
        ss_between += n as f64 * (m - grand_mean) * (m - grand_mean);
        ss_within += group.values.iter().map(|&x| (x - m) * (x - m)).sum::<f64>();
        summaries.push(GroupSummary {
            name: group.name.clone(),
            n,
            mean: m,
        });
    }

    let df_between = k - 1.0;
    let df_within = n_total as f64 - k;
    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;

    let (f, p) = if ms_within == 0.0 {
        if ss_between > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (0.0, 1.0)
        }
    } else {
        let f = ms_between / ms_within;
        let dist = FisherSnedecor::new(df_between, df_within)
            .map_err(|e| CompareError::Distribution(e.to_string()))?;
        (f, 1.0 - dist.cdf(f))
    };

    Ok(AnovaResult {
        f,
        df_between,
        df_within,
        p,
        significant: p < ALPHA,
        groups: summaries,
        excluded,
        mean_square_within: ms_within,
    })
}

/// Tukey HSD post-hoc comparisons for the groups retained by an omnibus test
pub fn tukey_hsd(groups: &[Group], anova: &AnovaResult) -> Result<Vec<PairwiseComparison>> {
    let usable: Vec<&Group> = groups
        .iter()
        .filter(|g| !anova.excluded.contains(&g.name))
        .collect();
    let k = usable.len();
    let msw = anova.mean_square_within;

    let mut comparisons = Vec::new();
    for i in 0..k {
        for j in (i + 1)..k {
            let (a, b) = (usable[i], usable[j]);
            let (ma, mb) = (mean(&a.values), mean(&b.values));
            let diff = ma - mb;
            let se = (msw / 2.0
                * (1.0 / a.values.len() as f64 + 1.0 / b.values.len() as f64))
                .sqrt();
            let (q, p_adjusted) = if se == 0.0 {
                if diff != 0.0 {
                    (f64::INFINITY, 0.0)
                } else {
                    (0.0, 1.0)
                }
            } else {
                let q = diff.abs() / se;
                let p = 1.0 - studentized_range_cdf(q, k, anova.df_within)?;
                (q, p)
            };
            comparisons.push(PairwiseComparison {
                group_a: a.name.clone(),
                group_b: b.name.clone(),
                mean_diff: diff,
                q,
                p_adjusted,
                significant: p_adjusted < ALPHA,
            });
        }
    }
    Ok(comparisons)
}

/// CDF of the studentized range distribution with `k` groups and `df`
/// error degrees of freedom.
///
/// Uses the standard representation
/// `P(Q < q) = ∫ f_df(u) · k ∫ φ(z) [Φ(z) − Φ(z − q·u)]^(k−1) dz du`
/// where `f_df` is the density of `sqrt(χ²_df / df)`. Both integrals are
/// evaluated with composite Simpson rules; above 200 degrees of freedom the
/// scale density is close enough to a point mass at 1 that only the inner
/// integral is used.
pub fn studentized_range_cdf(q: f64, k: usize, df: f64) -> Result<f64> {
    if q <= 0.0 {
        return Ok(0.0);
    }
    let normal = std_normal()?;
    if df > 200.0 {
        return Ok(range_cdf_unit_scale(&normal, q, k));
    }

    let hi = 1.0 + 10.0 / df.sqrt();
    let n = 120usize; // Simpson intervals, even
    let h = hi / n as f64;
    let mut sum = 0.0;
    for i in 0..=n {
        let u = i as f64 * h;
        let weight = if i == 0 || i == n {
            1.0
        } else if i % 2 == 1 {
            4.0
        } else {
            2.0
        };
        sum += weight * scaled_chi_pdf(u, df) * range_cdf_unit_scale(&normal, q * u, k);
    }
    Ok((sum * h / 3.0).clamp(0.0, 1.0))
}

/// CDF of the range of `k` iid standard normals at `r`
fn range_cdf_unit_scale(normal: &Normal, r: f64, k: usize) -> f64 {
    if r <= 0.0 {
        return 0.0;
    }
    let (lo, hi) = (-8.0f64, 8.0f64);
    let n = 240usize;
    let h = (hi - lo) / n as f64;
    let mut sum = 0.0;
    for i in 0..=n {
        let z = lo + i as f64 * h;
        let weight = if i == 0 || i == n {
            1.0
        } else if i % 2 == 1 {
            4.0
        } else {
            2.0
        };
        let phi = (-z * z / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
        let bracket = (normal.cdf(z) - normal.cdf(z - r)).max(0.0);
        sum += weight * phi * bracket.powi(k as i32 - 1);
    }
    (k as f64 * sum * h / 3.0).clamp(0.0, 1.0)
}

/// Density of `sqrt(χ²_df / df)` at `u`
fn scaled_chi_pdf(u: f64, df: f64) -> f64 {
    if u <= 0.0 {
        return 0.0;
    }
    let half = df / 2.0;
    let ln_f = std::f64::consts::LN_2 + half * half.ln() + (df - 1.0) * u.ln()
        - df * u * u / 2.0
        - ln_gamma(half);
    ln_f.exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_samples_not_significant() {
        let sample = vec![4.2, 5.1, 3.9, 4.8, 5.0, 4.4];
        let result = welch_t_test(&sample, &sample).unwrap();
        assert_eq!(result.t, 0.0);
        assert!((result.p - 1.0).abs() < 1e-12);
        assert!(!result.significant);
    }

    #[test]
    fn test_separated_means_significant() {
        // Weekly death rates around the reference run's group means
        let unvaccinated = vec![10.1, 10.6, 10.2, 10.9, 10.4, 10.4];
        let bivalent = vec![0.18, 0.25, 0.20, 0.19, 0.24, 0.20];
        let result = welch_t_test(&unvaccinated, &bivalent).unwrap();
        assert!(result.p < 0.05, "p = {}", result.p);
        assert!(result.significant);
        assert!((result.mean_a - 10.43).abs() < 0.1);
        assert!((result.mean_b - 0.21).abs() < 0.05);
    }

    #[test]
    fn test_welch_rejects_tiny_sample() {
        let err = welch_t_test(&[1.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            CompareError::InsufficientObservations { actual: 1, .. }
        ));
    }

    #[test]
    fn test_welch_constant_samples() {
        let equal = welch_t_test(&[3.0, 3.0, 3.0], &[3.0, 3.0]).unwrap();
        assert_eq!(equal.p, 1.0);
        assert!(!equal.significant);

        let differ = welch_t_test(&[3.0, 3.0, 3.0], &[5.0, 5.0]).unwrap();
        assert_eq!(differ.p, 0.0);
        assert!(differ.significant);
    }

    #[test]
    fn test_welch_symmetric() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![2.5, 3.5, 4.5, 5.5];
        let ab = welch_t_test(&a, &b).unwrap();
        let ba = welch_t_test(&b, &a).unwrap();
        assert!((ab.p - ba.p).abs() < 1e-12);
        assert!((ab.t + ba.t).abs() < 1e-12);
    }

    fn separated_groups() -> Vec<Group> {
        vec![
            Group::new("unvaccinated", vec![10.2, 10.6, 10.3, 10.7, 10.4]),
            Group::new("fully_vaccinated", vec![2.1, 2.4, 2.0, 2.3, 2.2]),
            Group::new("bivalent", vec![0.19, 0.22, 0.20, 0.24, 0.21]),
        ]
    }

    #[test]
    fn test_anova_separated_groups_significant() {
        let result = one_way_anova(&separated_groups()).unwrap();
        assert!(result.p < 0.05, "p = {}", result.p);
        assert!(result.significant);
        assert_eq!(result.groups.len(), 3);
        assert!(result.excluded.is_empty());
        assert_eq!(result.df_between, 2.0);
        assert_eq!(result.df_within, 12.0);
    }

    #[test]
    fn test_anova_similar_groups_not_significant() {
        let groups = vec![
            Group::new("a", vec![5.0, 5.2, 4.9, 5.1, 4.8]),
            Group::new("b", vec![5.1, 4.9, 5.0, 5.2, 5.0]),
            Group::new("c", vec![4.9, 5.1, 5.0, 4.8, 5.2]),
        ];
        let result = one_way_anova(&groups).unwrap();
        assert!(result.p > 0.05, "p = {}", result.p);
        assert!(!result.significant);
    }

    #[test]
    fn test_anova_excludes_small_group() {
        let mut groups = separated_groups();
        groups.push(Group::new("partial", vec![7.0]));
        let result = one_way_anova(&groups).unwrap();
        assert_eq!(result.excluded, vec!["partial".to_string()]);
        assert_eq!(result.groups.len(), 3);
    }

    #[test]
    fn test_anova_too_few_groups() {
        let groups = vec![
            Group::new("a", vec![1.0]),
            Group::new("b", vec![2.0]),
            Group::new("c", vec![1.0, 2.0]),
        ];
        let err = one_way_anova(&groups).unwrap_err();
        assert!(matches!(err, CompareError::TooFewGroups { actual: 1, .. }));
    }

    #[test]
    fn test_tukey_flags_all_separated_pairs() {
        let groups = separated_groups();
        let anova = one_way_anova(&groups).unwrap();
        let comparisons = tukey_hsd(&groups, &anova).unwrap();
        assert_eq!(comparisons.len(), 3);
        for c in &comparisons {
            assert!(
                c.significant,
                "{} vs {}: p_adj = {}",
                c.group_a, c.group_b, c.p_adjusted
            );
        }
    }

    #[test]
    fn test_tukey_identical_groups_not_significant() {
        let groups = vec![
            Group::new("a", vec![5.0, 5.2, 4.9, 5.1]),
            Group::new("b", vec![5.0, 5.2, 4.9, 5.1]),
            Group::new("c", vec![5.0, 5.2, 4.9, 5.1]),
        ];
        let anova = one_way_anova(&groups).unwrap();
        let comparisons = tukey_hsd(&groups, &anova).unwrap();
        for c in &comparisons {
            assert!(!c.significant);
            assert!(c.p_adjusted > 0.9, "p_adj = {}", c.p_adjusted);
            assert_eq!(c.mean_diff, 0.0);
        }
    }

    #[test]
    fn test_tukey_skips_excluded_groups() {
        let mut groups = separated_groups();
        groups.push(Group::new("partial", vec![7.0]));
        let anova = one_way_anova(&groups).unwrap();
        let comparisons = tukey_hsd(&groups, &anova).unwrap();
        assert_eq!(comparisons.len(), 3);
        assert!(comparisons
            .iter()
            .all(|c| c.group_a != "partial" && c.group_b != "partial"));
    }

    #[test]
    fn test_range_cdf_matches_closed_form_for_two_groups() {
        // Range of two standard normals: P(Q < q) = 2*Phi(q/sqrt(2)) - 1
        let normal = std_normal().unwrap();
        for q in [0.5, 1.0, 2.0, 3.0, 4.0] {
            let numeric = range_cdf_unit_scale(&normal, q, 2);
            let exact = 2.0 * normal.cdf(q / 2.0f64.sqrt()) - 1.0;
            assert!(
                (numeric - exact).abs() < 1e-6,
                "q = {q}: {numeric} vs {exact}"
            );
        }
    }

    #[test]
    fn test_studentized_range_known_critical_values() {
        // q_0.05 for k=3, df=10 is 3.877; for k=3, df=inf it is 3.314
        let p_finite = studentized_range_cdf(3.877, 3, 10.0).unwrap();
        assert!((p_finite - 0.95).abs() < 0.01, "got {p_finite}");

        let p_asymptotic = studentized_range_cdf(3.314, 3, 10_000.0).unwrap();
        assert!((p_asymptotic - 0.95).abs() < 0.01, "got {p_asymptotic}");
    }

    #[test]
    fn test_studentized_range_cdf_monotonic() {
        let mut last = 0.0;
        for i in 1..20 {
            let q = i as f64 * 0.5;
            let p = studentized_range_cdf(q, 4, 20.0).unwrap();
            assert!(p >= last, "cdf not monotonic at q = {q}");
            assert!((0.0..=1.0).contains(&p));
            last = p;
        }
        assert!(last > 0.999);
    }

    #[test]
    fn test_studentized_range_cdf_at_zero() {
        assert_eq!(studentized_range_cdf(0.0, 3, 10.0).unwrap(), 0.0);
        assert_eq!(studentized_range_cdf(-1.0, 3, 10.0).unwrap(), 0.0);
    }

    #[test]
    fn test_scaled_chi_pdf_integrates_to_one() {
        let df = 8.0;
        let n = 2000;
        let hi = 4.0;
        let h = hi / n as f64;
        let total: f64 = (0..=n)
            .map(|i| {
                let u = i as f64 * h;
                let w = if i == 0 || i == n { 0.5 } else { 1.0 };
                w * scaled_chi_pdf(u, df)
            })
            .sum::<f64>()
            * h;
        assert!((total - 1.0).abs() < 1e-3, "integral = {total}");
    }
}
