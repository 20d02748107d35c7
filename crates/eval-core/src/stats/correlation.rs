//! Pearson, Spearman and Kendall correlation with significance tests.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use super::descriptive::{average_ranks, is_constant, mean};
use crate::StatsError;

/// A correlation coefficient and its two-sided p-value.
///
/// Both are NaN when either input is constant: zero variance leaves the
/// coefficient undefined, and that is reported rather than coerced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    #[serde(with = "crate::sentinel")]
    pub coefficient: f64,
    #[serde(with = "crate::sentinel")]
    pub p_value: f64,
}

impl Correlation {
    pub const UNDEFINED: Correlation = Correlation {
        coefficient: f64::NAN,
        p_value: f64::NAN,
    };

    pub fn is_defined(&self) -> bool {
        !self.coefficient.is_nan()
    }
}

fn paired_len(x: &[f64], y: &[f64]) -> Result<usize, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::UnequalLengths {
            left: x.len(),
            right: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(StatsError::InsufficientData { n: x.len() });
    }
    Ok(x.len())
}

/// Pearson product-moment correlation with a Student-t significance test.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<Correlation, StatsError> {
    let n = paired_len(x, y)?;
    if is_constant(x) || is_constant(y) {
        return Ok(Correlation::UNDEFINED);
    }
    let r = pearson_coefficient(x, y);
    if r.is_nan() {
        return Ok(Correlation::UNDEFINED);
    }
    Ok(Correlation {
        coefficient: r,
        p_value: t_test_p_value(r, n),
    })
}

/// Spearman rank correlation (average ranks for ties).
pub fn spearman(x: &[f64], y: &[f64]) -> Result<Correlation, StatsError> {
    let n = paired_len(x, y)?;
    if is_constant(x) || is_constant(y) {
        return Ok(Correlation::UNDEFINED);
    }
    let rx = average_ranks(x);
    let ry = average_ranks(y);
    let rho = pearson_coefficient(&rx, &ry);
    if rho.is_nan() {
        return Ok(Correlation::UNDEFINED);
    }
    Ok(Correlation {
        coefficient: rho,
        p_value: t_test_p_value(rho, n),
    })
}

/// Kendall's tau-b with a normal-approximation p-value.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> Result<Correlation, StatsError> {
    let n = paired_len(x, y)?;
    if is_constant(x) || is_constant(y) {
        return Ok(Correlation::UNDEFINED);
    }

    let mut concordant = 0_i64;
    let mut discordant = 0_i64;
    let mut tied_x = 0_i64;
    let mut tied_y = 0_i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 {
                tied_x += 1;
            }
            if dy == 0.0 {
                tied_y += 1;
            }
            if dx == 0.0 || dy == 0.0 {
                continue;
            }
            if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let total_pairs = (n * (n - 1) / 2) as f64;
    let denom = ((total_pairs - tied_x as f64) * (total_pairs - tied_y as f64)).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return Ok(Correlation::UNDEFINED);
    }
    let tau = ((concordant - discordant) as f64 / denom).clamp(-1.0, 1.0);

    let nf = n as f64;
    let variance = 2.0 * (2.0 * nf + 5.0) / (9.0 * nf * (nf - 1.0));
    let z = tau / variance.sqrt();
    let p_value = match Normal::new(0.0, 1.0) {
        Ok(normal) => (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    };

    Ok(Correlation {
        coefficient: tau,
        p_value,
    })
}

fn pearson_coefficient(x: &[f64], y: &[f64]) -> f64 {
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mx;
        let dy = yi - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = sxx.sqrt() * syy.sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    (sxy / denom).clamp(-1.0, 1.0)
}

/// Two-sided p-value of `r` under H0: ρ = 0, t = r·sqrt((n−2)/(1−r²)).
fn t_test_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        // Two points always lie on a line.
        return 1.0;
    }
    let df = (n - 2) as f64;
    let residual = 1.0 - r * r;
    if residual <= 0.0 {
        return 0.0;
    }
    let t = r * (df / residual).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_pearson() {
        let c = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((c.coefficient - 1.0).abs() < 1e-12);
        assert!(c.p_value < 1e-6);
    }

    #[test]
    fn test_constant_input_is_nan_not_zero() {
        let x = [3.0, 3.0, 3.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        for c in [
            pearson(&x, &y).unwrap(),
            spearman(&x, &y).unwrap(),
            kendall_tau(&x, &y).unwrap(),
            pearson(&y, &x).unwrap(),
        ] {
            assert!(c.coefficient.is_nan());
            assert!(c.p_value.is_nan());
        }
    }

    #[test]
    fn test_insufficient_and_unequal_input() {
        assert_eq!(
            pearson(&[1.0], &[2.0]).unwrap_err(),
            StatsError::InsufficientData { n: 1 }
        );
        let err = spearman(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(kendall_tau(&[], &[]).is_err());
    }

    #[test]
    fn test_spearman_is_rank_based() {
        // Monotonic but non-linear
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 8.0, 27.0, 64.0, 125.0];
        let rho = spearman(&x, &y).unwrap();
        assert!((rho.coefficient - 1.0).abs() < 1e-12);
        let r = pearson(&x, &y).unwrap();
        assert!(r.coefficient < 1.0);
    }

    #[test]
    fn test_kendall_reversed_order() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        let tau = kendall_tau(&x, &y).unwrap();
        assert!((tau.coefficient + 1.0).abs() < 1e-12);
        assert!(tau.p_value < 0.05);
    }

    #[test]
    fn test_two_points_have_unit_p_value() {
        let c = pearson(&[1.0, 2.0], &[3.0, 1.0]).unwrap();
        assert!((c.coefficient + 1.0).abs() < 1e-12);
        assert_eq!(c.p_value, 1.0);
    }
}
