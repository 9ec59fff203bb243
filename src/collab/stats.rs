//! Statistics collaborator — pure analysis routines over a loaded dataset.
//!
//! Every method returns `Result<AnalysisOutcome, StatsError>`; nothing
//! panics across this boundary. Outcomes are tagged variants under one
//! envelope so the history log and report generator treat all analyses
//! uniformly.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::collab::dataset::Dataset;
use crate::error::StatsError;

/// Per-column descriptive summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveRow {
    pub column: String,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub min: f64,
    pub max: f64,
}

/// One regression coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub p: f64,
}

/// One frequency-table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: u64,
    pub percent: f64,
}

/// Typed result of a single analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Descriptive {
        rows: Vec<DescriptiveRow>,
    },
    TwoGroup {
        groups: Vec<String>,
        t: f64,
        p: f64,
        cohen_d: f64,
        means: Vec<f64>,
    },
    RankSum {
        groups: Vec<String>,
        u: f64,
        p: f64,
    },
    Anova {
        levels: Vec<String>,
        f: f64,
        p: f64,
        df_between: usize,
        df_within: usize,
    },
    Correlation {
        columns: Vec<String>,
        r: Vec<Vec<f64>>,
    },
    Regression {
        outcome: String,
        predictors: Vec<String>,
        r_squared: f64,
        f_p: f64,
        n: usize,
        coefficients: Vec<Coefficient>,
    },
    Reliability {
        items: Vec<String>,
        alpha: f64,
        n: usize,
    },
    CrossTab {
        row_var: String,
        col_var: String,
        row_labels: Vec<String>,
        col_labels: Vec<String>,
        counts: Vec<Vec<u64>>,
        chi2: f64,
        p: f64,
    },
    Frequencies {
        column: String,
        entries: Vec<FrequencyEntry>,
    },
}

/// Which two-group comparison to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoGroupMethod {
    /// Welch's independent-samples t-test.
    Welch,
    /// Mann-Whitney U with normal approximation.
    MannWhitney,
}

/// The statistics engine consumed by the wizards.
pub trait StatsEngine: Send + Sync {
    fn descriptives(&self, ds: &Dataset, columns: &[String]) -> Result<AnalysisOutcome, StatsError>;
    fn two_group(
        &self,
        ds: &Dataset,
        group_col: &str,
        value_col: &str,
        method: TwoGroupMethod,
    ) -> Result<AnalysisOutcome, StatsError>;
    fn anova(&self, ds: &Dataset, factor: &str, value_col: &str)
        -> Result<AnalysisOutcome, StatsError>;
    fn correlation(&self, ds: &Dataset, columns: &[String]) -> Result<AnalysisOutcome, StatsError>;
    fn regression(
        &self,
        ds: &Dataset,
        outcome: &str,
        predictors: &[String],
    ) -> Result<AnalysisOutcome, StatsError>;
    fn reliability(&self, ds: &Dataset, items: &[String]) -> Result<AnalysisOutcome, StatsError>;
    fn crosstab(&self, ds: &Dataset, row_var: &str, col_var: &str)
        -> Result<AnalysisOutcome, StatsError>;
    fn frequencies(&self, ds: &Dataset, column: &str) -> Result<AnalysisOutcome, StatsError>;
}

/// Closed-form implementation of [`StatsEngine`].
pub struct BuiltinStatsEngine;

impl BuiltinStatsEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BuiltinStatsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator).
fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0)
}

impl StatsEngine for BuiltinStatsEngine {
    fn descriptives(&self, ds: &Dataset, columns: &[String]) -> Result<AnalysisOutcome, StatsError> {
        let mut rows = Vec::new();
        for name in columns {
            let values = ds.numeric(name)?;
            if values.is_empty() {
                continue;
            }
            let sd = if values.len() > 1 {
                variance(&values).sqrt()
            } else {
                0.0
            };
            rows.push(DescriptiveRow {
                column: name.clone(),
                n: values.len(),
                mean: mean(&values),
                sd,
                min: values.iter().cloned().fold(f64::INFINITY, f64::min),
                max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            });
        }
        if rows.is_empty() {
            return Err(StatsError::Degenerate {
                analysis: "descriptives".into(),
                reason: "no numeric values in the selected columns".into(),
            });
        }
        Ok(AnalysisOutcome::Descriptive { rows })
    }

    fn two_group(
        &self,
        ds: &Dataset,
        group_col: &str,
        value_col: &str,
        method: TwoGroupMethod,
    ) -> Result<AnalysisOutcome, StatsError> {
        let groups = ds.grouped_numeric(group_col, value_col)?;
        if groups.len() != 2 {
            return Err(StatsError::GroupCount {
                column: group_col.to_string(),
                found: groups.len(),
                required: "exactly 2".into(),
            });
        }
        let (name_a, a) = &groups[0];
        let (name_b, b) = &groups[1];
        if a.len() < 2 || b.len() < 2 {
            return Err(StatsError::TooFewObservations {
                analysis: "two-group test".into(),
                found: a.len().min(b.len()),
                required: 2,
            });
        }
        let names = vec![name_a.clone(), name_b.clone()];

        match method {
            TwoGroupMethod::Welch => {
                let (ma, mb) = (mean(a), mean(b));
                let (va, vb) = (variance(a), variance(b));
                let (na, nb) = (a.len() as f64, b.len() as f64);
                let se2 = va / na + vb / nb;
                if se2 == 0.0 {
                    return Err(StatsError::Degenerate {
                        analysis: "t-test".into(),
                        reason: "zero variance in both groups".into(),
                    });
                }
                let t = (ma - mb) / se2.sqrt();
                // Welch-Satterthwaite degrees of freedom.
                let df = se2.powi(2)
                    / ((va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0));
                let p = student_t_two_sided(t, df);
                // Pooled-SD Cohen's d.
                let pooled =
                    (((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0)).sqrt();
                let cohen_d = if pooled > 0.0 { (ma - mb) / pooled } else { 0.0 };
                Ok(AnalysisOutcome::TwoGroup {
                    groups: names,
                    t,
                    p,
                    cohen_d,
                    means: vec![ma, mb],
                })
            }
            TwoGroupMethod::MannWhitney => {
                let (u, p) = mann_whitney(a, b);
                Ok(AnalysisOutcome::RankSum { groups: names, u, p })
            }
        }
    }

    fn anova(
        &self,
        ds: &Dataset,
        factor: &str,
        value_col: &str,
    ) -> Result<AnalysisOutcome, StatsError> {
        let groups = ds.grouped_numeric(factor, value_col)?;
        if groups.len() < 3 {
            return Err(StatsError::GroupCount {
                column: factor.to_string(),
                found: groups.len(),
                required: "3 or more".into(),
            });
        }
        let all: Vec<f64> = groups.iter().flat_map(|(_, v)| v.iter().copied()).collect();
        let n = all.len() as f64;
        let k = groups.len() as f64;
        if (n - k) < 1.0 {
            return Err(StatsError::TooFewObservations {
                analysis: "ANOVA".into(),
                found: all.len(),
                required: groups.len() + 1,
            });
        }
        let grand = mean(&all);
        let ss_between: f64 = groups
            .iter()
            .map(|(_, v)| v.len() as f64 * (mean(v) - grand).powi(2))
            .sum();
        let ss_within: f64 = groups
            .iter()
            .map(|(_, v)| {
                let m = mean(v);
                v.iter().map(|x| (x - m).powi(2)).sum::<f64>()
            })
            .sum();
        let df_between = groups.len() - 1;
        let df_within = all.len() - groups.len();
        if ss_within == 0.0 {
            return Err(StatsError::Degenerate {
                analysis: "ANOVA".into(),
                reason: "zero within-group variance".into(),
            });
        }
        let f = (ss_between / df_between as f64) / (ss_within / df_within as f64);
        let p = f_upper_tail(f, df_between as f64, df_within as f64);
        Ok(AnalysisOutcome::Anova {
            levels: groups.into_iter().map(|(g, _)| g).collect(),
            f,
            p,
            df_between,
            df_within,
        })
    }

    fn correlation(&self, ds: &Dataset, columns: &[String]) -> Result<AnalysisOutcome, StatsError> {
        if columns.len() < 2 {
            return Err(StatsError::TooFewObservations {
                analysis: "correlation".into(),
                found: columns.len(),
                required: 2,
            });
        }
        let k = columns.len();
        let mut r = vec![vec![1.0; k]; k];
        for i in 0..k {
            for j in (i + 1)..k {
                let pairs = ds.paired_numeric(&columns[i], &columns[j])?;
                if pairs.len() < 3 {
                    return Err(StatsError::TooFewObservations {
                        analysis: "correlation".into(),
                        found: pairs.len(),
                        required: 3,
                    });
                }
                let value = pearson(&pairs);
                r[i][j] = value;
                r[j][i] = value;
            }
        }
        Ok(AnalysisOutcome::Correlation {
            columns: columns.to_vec(),
            r,
        })
    }

    fn regression(
        &self,
        ds: &Dataset,
        outcome: &str,
        predictors: &[String],
    ) -> Result<AnalysisOutcome, StatsError> {
        if predictors.is_empty() {
            return Err(StatsError::TooFewObservations {
                analysis: "regression".into(),
                found: 0,
                required: 1,
            });
        }
        let mut names = vec![outcome.to_string()];
        names.extend(predictors.iter().cloned());
        let rows = ds.complete_rows(&names)?;
        let n = rows.len();
        let k = predictors.len();
        if n < k + 2 {
            return Err(StatsError::TooFewObservations {
                analysis: "regression".into(),
                found: n,
                required: k + 2,
            });
        }

        let y = DVector::from_iterator(n, rows.iter().map(|r| r[0]));
        let x = DMatrix::from_fn(n, k + 1, |r, c| if c == 0 { 1.0 } else { rows[r][c] });

        let xtx = x.transpose() * &x;
        let xty = x.transpose() * &y;
        let xtx_inv = xtx.try_inverse().ok_or_else(|| StatsError::Degenerate {
            analysis: "regression".into(),
            reason: "collinear predictors (singular design matrix)".into(),
        })?;
        let beta = &xtx_inv * xty;

        let fitted = &x * &beta;
        let residuals = &y - &fitted;
        let ss_res: f64 = residuals.iter().map(|e| e * e).sum();
        let y_mean = y.mean();
        let ss_tot: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        if ss_tot == 0.0 {
            return Err(StatsError::Degenerate {
                analysis: "regression".into(),
                reason: "outcome has zero variance".into(),
            });
        }
        let r_squared = 1.0 - ss_res / ss_tot;
        let df_res = (n - k - 1) as f64;
        let sigma2 = ss_res / df_res;

        let mut coefficients = Vec::with_capacity(k + 1);
        for (i, name) in std::iter::once("(Intercept)".to_string())
            .chain(predictors.iter().cloned())
            .enumerate()
        {
            let se = (sigma2 * xtx_inv[(i, i)]).sqrt();
            let p = if se > 0.0 {
                student_t_two_sided(beta[i] / se, df_res)
            } else {
                f64::NAN
            };
            coefficients.push(Coefficient {
                name,
                estimate: beta[i],
                p,
            });
        }

        let f_stat = (r_squared / k as f64) / ((1.0 - r_squared) / df_res);
        let f_p = f_upper_tail(f_stat, k as f64, df_res);

        Ok(AnalysisOutcome::Regression {
            outcome: outcome.to_string(),
            predictors: predictors.to_vec(),
            r_squared,
            f_p,
            n,
            coefficients,
        })
    }

    fn reliability(&self, ds: &Dataset, items: &[String]) -> Result<AnalysisOutcome, StatsError> {
        if items.len() < 2 {
            return Err(StatsError::TooFewObservations {
                analysis: "reliability".into(),
                found: items.len(),
                required: 2,
            });
        }
        let rows = ds.complete_rows(&items.to_vec())?;
        if rows.len() < 3 {
            return Err(StatsError::TooFewObservations {
                analysis: "reliability".into(),
                found: rows.len(),
                required: 3,
            });
        }
        let k = items.len() as f64;
        let item_variances: f64 = (0..items.len())
            .map(|i| variance(&rows.iter().map(|r| r[i]).collect::<Vec<_>>()))
            .sum();
        let totals: Vec<f64> = rows.iter().map(|r| r.iter().sum()).collect();
        let total_variance = variance(&totals);
        if total_variance == 0.0 {
            return Err(StatsError::Degenerate {
                analysis: "reliability".into(),
                reason: "scale total has zero variance".into(),
            });
        }
        let alpha = (k / (k - 1.0)) * (1.0 - item_variances / total_variance);
        Ok(AnalysisOutcome::Reliability {
            items: items.to_vec(),
            alpha,
            n: rows.len(),
        })
    }

    fn crosstab(
        &self,
        ds: &Dataset,
        row_var: &str,
        col_var: &str,
    ) -> Result<AnalysisOutcome, StatsError> {
        let (row_labels, col_labels, counts) = ds.cross_counts(row_var, col_var)?;
        if row_labels.len() < 2 || col_labels.len() < 2 {
            return Err(StatsError::GroupCount {
                column: format!("{row_var} × {col_var}"),
                found: row_labels.len().min(col_labels.len()),
                required: "at least 2 per dimension".into(),
            });
        }
        let total: u64 = counts.iter().flatten().sum();
        let mut chi2 = 0.0;
        for row in &counts {
            let row_total: u64 = row.iter().sum();
            for (ci, &observed) in row.iter().enumerate() {
                let col_total: u64 = counts.iter().map(|r| r[ci]).sum();
                let expected = row_total as f64 * col_total as f64 / total as f64;
                if expected > 0.0 {
                    chi2 += (observed as f64 - expected).powi(2) / expected;
                }
            }
        }
        let df = (row_labels.len() - 1) * (col_labels.len() - 1);
        let p = chi_square_upper_tail(chi2, df as f64);
        Ok(AnalysisOutcome::CrossTab {
            row_var: row_var.to_string(),
            col_var: col_var.to_string(),
            row_labels,
            col_labels,
            counts,
            chi2,
            p,
        })
    }

    fn frequencies(&self, ds: &Dataset, column: &str) -> Result<AnalysisOutcome, StatsError> {
        let values = ds
            .values(column)
            .map_err(|_| StatsError::ColumnNotFound(column.to_string()))?;
        let mut entries: Vec<FrequencyEntry> = Vec::new();
        let mut total = 0u64;
        for v in values.iter().flatten() {
            total += 1;
            match entries.iter_mut().find(|e| &e.value == v) {
                Some(e) => e.count += 1,
                None => entries.push(FrequencyEntry {
                    value: v.clone(),
                    count: 1,
                    percent: 0.0,
                }),
            }
        }
        if total == 0 {
            return Err(StatsError::Degenerate {
                analysis: "frequencies".into(),
                reason: format!("column {column} has no non-missing values"),
            });
        }
        for e in &mut entries {
            e.percent = 100.0 * e.count as f64 / total as f64;
        }
        Ok(AnalysisOutcome::Frequencies {
            column: column.to_string(),
            entries,
        })
    }
}

fn pearson(pairs: &[(f64, f64)]) -> f64 {
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let my = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    sxy / (sxx * syy).sqrt()
}

/// Mann-Whitney U with mid-ranks and normal approximation (no tie
/// correction).
fn mann_whitney(a: &[f64], b: &[f64]) -> (f64, f64) {
    let mut all: Vec<(f64, usize)> = a
        .iter()
        .map(|&v| (v, 0usize))
        .chain(b.iter().map(|&v| (v, 1usize)))
        .collect();
    all.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; all.len()];
    let mut i = 0;
    while i < all.len() {
        let mut j = i;
        while j + 1 < all.len() && all[j + 1].0 == all[i].0 {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for r in ranks.iter_mut().take(j + 1).skip(i) {
            *r = rank;
        }
        i = j + 1;
    }

    let rank_a: f64 = all
        .iter()
        .zip(ranks.iter())
        .filter(|((_, g), _)| *g == 0)
        .map(|(_, r)| r)
        .sum();
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let u_a = rank_a - na * (na + 1.0) / 2.0;
    let u = u_a.min(na * nb - u_a);
    let mu = na * nb / 2.0;
    let sigma = (na * nb * (na + nb + 1.0) / 12.0).sqrt();
    if sigma == 0.0 {
        return (u, 1.0);
    }
    let z = (u - mu) / sigma;
    (u, 2.0 * normal_cdf(-z.abs()))
}

// ── Distribution tails ──────────────────────────────────────────────
//
// Regularized incomplete beta / gamma (Numerical Recipes forms), enough
// for the t, F and chi-square tails used above.

fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for c in COEF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-12;
    const FPMIN: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta I_x(a, b).
fn beta_inc(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let bt = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        bt * beta_cf(a, b, x) / a
    } else {
        1.0 - bt * beta_cf(b, a, 1.0 - x) / b
    }
}

/// Two-sided p-value of a Student t statistic.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    beta_inc(df / 2.0, 0.5, df / (df + t * t))
}

/// Upper tail of the F distribution.
pub fn f_upper_tail(f: f64, d1: f64, d2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    beta_inc(d2 / 2.0, d1 / 2.0, d2 / (d2 + d1 * f))
}

/// Upper tail of the chi-square distribution, via the regularized
/// incomplete gamma Q(k/2, x/2).
pub fn chi_square_upper_tail(x: f64, df: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(df / 2.0, x / 2.0)
}

fn gamma_q(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_cf(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-12;
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..MAX_ITER {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_q_cf(a: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-12;
    const FPMIN: f64 = 1.0e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation.
pub fn normal_cdf(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * z.abs());
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let tail = (-z * z / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt() * poly;
    if z >= 0.0 { 1.0 - tail } else { tail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::dataset::{CsvDatasetLoader, DatasetLoader};
    use std::io::Write;

    async fn load_csv(contents: &str) -> Dataset {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        CsvDatasetLoader::new().load(file.path()).await.unwrap()
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn t_tail_matches_known_values() {
        // t = 2.0, df = 10 → p ≈ 0.0734 (tables).
        assert!(close(student_t_two_sided(2.0, 10.0), 0.0734, 0.001));
        // t = 0 → p = 1.
        assert!(close(student_t_two_sided(0.0, 10.0), 1.0, 1e-9));
    }

    #[test]
    fn chi_square_tail_matches_known_values() {
        // χ² = 3.841, df = 1 → p ≈ 0.05.
        assert!(close(chi_square_upper_tail(3.841, 1.0), 0.05, 0.001));
    }

    #[test]
    fn f_tail_matches_known_values() {
        // F = 4.26, d1 = 2, d2 = 9 → p ≈ 0.05.
        assert!(close(f_upper_tail(4.26, 2.0, 9.0), 0.05, 0.002));
    }

    #[tokio::test]
    async fn welch_t_on_separated_groups_is_significant() {
        let ds = load_csv(
            "G,V\nA,1\nA,2\nA,1.5\nA,2.5\nB,9\nB,10\nB,9.5\nB,10.5\n",
        )
        .await;
        let engine = BuiltinStatsEngine::new();
        let outcome = engine.two_group(&ds, "G", "V", TwoGroupMethod::Welch).unwrap();
        let AnalysisOutcome::TwoGroup { groups, p, means, .. } = outcome else {
            panic!("wrong variant");
        };
        assert_eq!(groups, ["A", "B"]);
        assert!(p < 0.001);
        assert!(close(means[0], 1.75, 1e-9));
    }

    #[tokio::test]
    async fn three_groups_rejected_for_two_group_test() {
        let ds = load_csv("G,V\nA,1\nA,2\nB,3\nB,4\nC,5\n").await;
        let engine = BuiltinStatsEngine::new();
        let err = engine
            .two_group(&ds, "G", "V", TwoGroupMethod::Welch)
            .unwrap_err();
        assert!(matches!(err, StatsError::GroupCount { found: 3, .. }));
    }

    #[tokio::test]
    async fn regression_recovers_exact_linear_relation() {
        let ds = load_csv("Y,X\n3,1\n5,2\n7,3\n9,4\n11,5\n").await;
        let engine = BuiltinStatsEngine::new();
        let outcome = engine.regression(&ds, "Y", &["X".to_string()]).unwrap();
        let AnalysisOutcome::Regression { r_squared, coefficients, .. } = outcome else {
            panic!("wrong variant");
        };
        assert!(close(r_squared, 1.0, 1e-9));
        assert!(close(coefficients[0].estimate, 1.0, 1e-6)); // intercept
        assert!(close(coefficients[1].estimate, 2.0, 1e-6)); // slope
    }

    #[tokio::test]
    async fn cronbach_alpha_for_parallel_items_is_high() {
        let ds = load_csv("Q1,Q2,Q3\n1,1,2\n2,2,2\n3,3,4\n4,4,4\n5,5,6\n").await;
        let engine = BuiltinStatsEngine::new();
        let outcome = engine
            .reliability(&ds, &["Q1".into(), "Q2".into(), "Q3".into()])
            .unwrap();
        let AnalysisOutcome::Reliability { alpha, .. } = outcome else {
            panic!("wrong variant");
        };
        assert!(alpha > 0.9, "alpha = {alpha}");
    }

    #[tokio::test]
    async fn reliability_needs_two_items() {
        let ds = load_csv("Q1,Q2\n1,1\n2,2\n3,3\n").await;
        let engine = BuiltinStatsEngine::new();
        let err = engine.reliability(&ds, &["Q1".into()]).unwrap_err();
        assert!(matches!(err, StatsError::TooFewObservations { .. }));
    }

    #[tokio::test]
    async fn correlation_matrix_is_symmetric() {
        let ds = load_csv("A,B\n1,2\n2,4\n3,6\n4,8\n").await;
        let engine = BuiltinStatsEngine::new();
        let outcome = engine.correlation(&ds, &["A".into(), "B".into()]).unwrap();
        let AnalysisOutcome::Correlation { r, .. } = outcome else {
            panic!("wrong variant");
        };
        assert!(close(r[0][1], 1.0, 1e-9));
        assert_eq!(r[0][1], r[1][0]);
    }

    #[tokio::test]
    async fn crosstab_computes_chi_square() {
        let ds = load_csv("G,H\nM,Y\nM,Y\nM,N\nF,N\nF,N\nF,Y\n").await;
        let engine = BuiltinStatsEngine::new();
        let outcome = engine.crosstab(&ds, "G", "H").unwrap();
        let AnalysisOutcome::CrossTab { counts, chi2, p, .. } = outcome else {
            panic!("wrong variant");
        };
        assert_eq!(counts, vec![vec![2, 1], vec![1, 2]]);
        assert!(chi2 > 0.0);
        assert!(p > 0.0 && p <= 1.0);
    }

    #[tokio::test]
    async fn frequencies_sum_to_hundred_percent() {
        let ds = load_csv("C\na\nb\na\na\n").await;
        let engine = BuiltinStatsEngine::new();
        let outcome = engine.frequencies(&ds, "C").unwrap();
        let AnalysisOutcome::Frequencies { entries, .. } = outcome else {
            panic!("wrong variant");
        };
        let total: f64 = entries.iter().map(|e| e.percent).sum();
        assert!(close(total, 100.0, 1e-9));
        assert_eq!(entries[0].value, "a");
        assert_eq!(entries[0].count, 3);
    }
}
