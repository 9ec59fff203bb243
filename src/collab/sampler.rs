//! Sample-size calculator — Cochran, Yamane, and power-analysis formulas.
//!
//! Every result carries the substitution steps so the wizard can re-display
//! the arithmetic line by line for auditability.

use serde::{Deserialize, Serialize};

/// Supported confidence levels and their z-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    C90,
    C95,
    C99,
}

impl Confidence {
    pub fn z(&self) -> f64 {
        match self {
            Self::C90 => 1.645,
            Self::C95 => 1.96,
            Self::C99 => 2.576,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::C90 => "90%",
            Self::C95 => "95%",
            Self::C99 => "99%",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        if text.contains("99") {
            Some(Self::C99)
        } else if text.contains("90") {
            Some(Self::C90)
        } else if text.contains("95") {
            Some(Self::C95)
        } else {
            None
        }
    }
}

/// Result of a sample-size calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSizeResult {
    pub sample_size: u64,
    /// Total across groups, for per-group methods.
    pub total_sample: Option<u64>,
    pub method: String,
    pub formula: String,
    /// Substitution walk-through, one line per step.
    pub steps: Vec<String>,
}

/// Cochran's formula; applies the finite-population correction when a
/// population size is given.
pub fn cochran(p: f64, e: f64, confidence: Confidence, population: Option<u64>) -> SampleSizeResult {
    let z = confidence.z();
    let q = 1.0 - p;
    let n0 = ((z * z) * p * q / (e * e)).ceil();

    let mut steps = vec![
        "Baseline (infinite population): n0 = (Z^2 * p * q) / e^2".to_string(),
        format!(
            "Z = {z} ({} confidence), p = {p}, q = {q}, e = {e}",
            confidence.label()
        ),
        format!(
            "n0 = ({:.4} * {:.2}) / {:.4} = {}",
            z * z,
            p * q,
            e * e,
            n0 as u64
        ),
    ];

    match population {
        Some(n_pop) => {
            let n_pop_f = n_pop as f64;
            let denom = 1.0 + (n0 - 1.0) / n_pop_f;
            let n = (n0 / denom).ceil() as u64;
            steps.push(format!(
                "Finite correction: n = n0 / (1 + (n0 - 1) / N), N = {n_pop}"
            ));
            steps.push(format!(
                "n = {} / (1 + {} / {}) = {} / {:.4} = {}",
                n0 as u64,
                n0 as u64 - 1,
                n_pop,
                n0 as u64,
                denom,
                n
            ));
            SampleSizeResult {
                sample_size: n,
                total_sample: None,
                method: "Cochran's Formula".into(),
                formula: format!("Cochran's (Finite Correction, N={n_pop})"),
                steps,
            }
        }
        None => {
            steps.push(format!(
                "Population unknown or very large: keep the conservative n0 = {}",
                n0 as u64
            ));
            SampleSizeResult {
                sample_size: n0 as u64,
                total_sample: None,
                method: "Cochran's Formula".into(),
                formula: format!("Cochran's (Infinite): ({z}^2 * {p} * {q}) / {e}^2"),
                steps,
            }
        }
    }
}

/// Taro Yamane's simplified formula for known populations:
/// `n = N / (1 + N * e^2)`.
pub fn yamane(population: u64, e: f64) -> SampleSizeResult {
    let n_pop = population as f64;
    let e2 = e * e;
    let ne2 = n_pop * e2;
    let denom = 1.0 + ne2;
    let n = (n_pop / denom).ceil() as u64;

    SampleSizeResult {
        sample_size: n,
        total_sample: None,
        method: "Taro Yamane".into(),
        formula: format!("n = {population} / (1 + {population}*{e}^2)"),
        steps: vec![
            format!("Square the margin of error: e^2 = {e}^2 = {e2:.4}"),
            format!("Multiply by the population: {population} * {e2:.4} = {ne2:.4}"),
            format!("Add one: 1 + {ne2:.4} = {denom:.4}"),
            format!("Divide: {population} / {denom:.4} = {n}"),
        ],
    }
}

/// Per-group sample size for an independent two-sample t-test, normal
/// approximation: `n = 2 * ((z_alpha + z_power) / d)^2`.
pub fn power_ttest(effect_size: f64, alpha: f64, power: f64) -> SampleSizeResult {
    let z_alpha = normal_quantile(1.0 - alpha / 2.0);
    let z_power = normal_quantile(power);
    let n = (2.0 * ((z_alpha + z_power) / effect_size).powi(2)).ceil() as u64;

    SampleSizeResult {
        sample_size: n,
        total_sample: Some(n * 2),
        method: "Power Analysis (T-Test)".into(),
        formula: format!("n = 2*((z_a + z_b)/d)^2 (d={effect_size}, alpha={alpha}, power={power})"),
        steps: vec![
            format!("Critical value for alpha {alpha}: z_a = {z_alpha:.4}"),
            format!("Critical value for power {power}: z_b = {z_power:.4}"),
            format!(
                "n per group = 2 * (({z_alpha:.4} + {z_power:.4}) / {effect_size})^2 = {n}"
            ),
            format!("Total across both groups: {}", n * 2),
        ],
    }
}

/// Inverse standard normal CDF (Acklam's rational approximation).
fn normal_quantile(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0);
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -normal_quantile(1.0 - p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cochran_infinite_95_is_385() {
        let result = cochran(0.5, 0.05, Confidence::C95, None);
        assert_eq!(result.sample_size, 385);
        assert!(result.formula.contains("Infinite"));
    }

    #[test]
    fn cochran_finite_500_is_218() {
        let result = cochran(0.5, 0.05, Confidence::C95, Some(500));
        assert_eq!(result.sample_size, 218);
        assert!(result.steps.iter().any(|s| s.contains("N = 500")));
        // Every calculation exposes its substitution walk-through.
        assert!(result.steps.len() >= 4);
    }

    #[test]
    fn yamane_known_value() {
        // N = 400, e = 0.05 → 400 / (1 + 400*0.0025) = 200.
        let result = yamane(400, 0.05);
        assert_eq!(result.sample_size, 200);
    }

    #[test]
    fn power_medium_effect_default_alpha_power() {
        let result = power_ttest(0.5, 0.05, 0.8);
        // Normal approximation of the G*Power value (63-64 per group).
        assert!(result.sample_size >= 62 && result.sample_size <= 64);
        assert_eq!(result.total_sample, Some(result.sample_size * 2));
    }

    #[test]
    fn quantile_matches_z_table() {
        assert!((normal_quantile(0.975) - 1.95996).abs() < 1e-4);
        assert!((normal_quantile(0.8) - 0.84162).abs() < 1e-4);
        assert!((normal_quantile(0.025) + 1.95996).abs() < 1e-4);
    }

    #[test]
    fn confidence_parse_from_menu_labels() {
        assert_eq!(Confidence::parse("95% (Standard)"), Some(Confidence::C95));
        assert_eq!(Confidence::parse("99% (High Precision)"), Some(Confidence::C99));
        assert_eq!(Confidence::parse("90%"), Some(Confidence::C90));
        assert_eq!(Confidence::parse("something else"), None);
    }
}
