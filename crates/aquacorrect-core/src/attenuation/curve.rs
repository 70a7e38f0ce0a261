use nalgebra::{Matrix3, Vector3};

use crate::consts::{
    EPSILON, FALLBACK_ATTENUATION, FIT_INITIAL_DAMPING, FIT_MAX_ITERATIONS, FIT_TOLERANCE,
    SEED_HIGH_FRACTION, SEED_LOW_FRACTION,
};

/// Damping above which a step is abandoned as non-improving.
const MAX_DAMPING: f64 = 1e10;

/// Exponential attenuation model: `a * exp(b * x) + c`.
#[inline]
pub fn exp_curve(x: f64, a: f64, b: f64, c: f64) -> f64 {
    a * (b * x).exp() + c
}

/// Per-pixel attenuation coefficients of the exponential model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttenuationCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for AttenuationCoefficients {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl AttenuationCoefficients {
    pub const FALLBACK: Self = Self {
        a: FALLBACK_ATTENUATION[0],
        b: FALLBACK_ATTENUATION[1],
        c: FALLBACK_ATTENUATION[2],
    };

    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn evaluate(&self, x: f64) -> f64 {
        exp_curve(x, self.a, self.b, self.c)
    }

    /// Whether the coefficients describe a finite, non-increasing decay
    /// (`a >= 1`, `b <= 0`, `c >= 0`).
    pub fn is_admissible(&self) -> bool {
        self.a.is_finite()
            && self.b.is_finite()
            && self.c.is_finite()
            && self.a >= 1.0
            && self.b <= 0.0
            && self.c >= 0.0
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }

    fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.a, self.b, self.c)
    }

    fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Result of fitting one pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FitOutcome {
    /// The solver converged to admissible coefficients.
    Fitted(AttenuationCoefficients),
    /// The solver failed; the coefficients are the unoptimised seed (or the
    /// fixed fallback if even the solution was out of bounds).
    FallbackUnoptimized(AttenuationCoefficients),
}

impl FitOutcome {
    pub fn coefficients(&self) -> AttenuationCoefficients {
        match *self {
            Self::Fitted(p) | Self::FallbackUnoptimized(p) => p,
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, Self::Fitted(_))
    }
}

/// Algebraic starting point from the samples at 30% and 70% of the sequence,
/// assuming `c = 0`.
///
/// Falls back to [`AttenuationCoefficients::FALLBACK`] when the estimate is
/// not finite or violates `a >= 1`, `b <= 0`.
pub fn seed(distances: &[f64], intensities: &[f64]) -> AttenuationCoefficients {
    let n = distances.len().min(intensities.len());
    if n == 0 {
        return AttenuationCoefficients::FALLBACK;
    }
    let i0 = (n as f64 * SEED_LOW_FRACTION) as usize;
    let i1 = (n as f64 * SEED_HIGH_FRACTION) as usize;
    let c = 0.0;

    let mut b = 0.0;
    if intensities[i1] != 0.0 {
        b = ((intensities[i0] - c) / (intensities[i1] - c)).ln() / (distances[i0] - distances[i1]);
    }
    let a = (intensities[i1] - c) / (b * distances[i1]).exp();

    if !a.is_finite() || !b.is_finite() || a < 1.0 || b > 0.0 {
        return AttenuationCoefficients::FALLBACK;
    }
    AttenuationCoefficients::new(a, b, c)
}

/// Fit `a * exp(b * x) + c` to the samples of one pixel.
///
/// Minimises the soft-L1 robust cost `sum 2 (sqrt(1 + r^2) - 1)` with a
/// bounded Levenberg-Marquardt solver (iteratively reweighted normal
/// equations, steps projected onto `a >= 1`, `b <= 0`, `c >= 0`). Numerical
/// failure never panics or errors: it yields `FallbackUnoptimized` with the
/// seed.
pub fn fit(distances: &[f64], intensities: &[f64]) -> FitOutcome {
    let start = seed(distances, intensities);
    match solve(distances, intensities, start) {
        Some(p) if p.is_admissible() => FitOutcome::Fitted(p),
        Some(_) => FitOutcome::FallbackUnoptimized(AttenuationCoefficients::FALLBACK),
        None => FitOutcome::FallbackUnoptimized(start),
    }
}

#[inline]
fn soft_l1_weight(r: f64) -> f64 {
    1.0 / (1.0 + r * r).sqrt()
}

fn robust_cost(x: &[f64], y: &[f64], p: &Vector3<f64>) -> Option<f64> {
    let mut cost = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let r = exp_curve(xi, p[0], p[1], p[2]) - yi;
        cost += 2.0 * ((1.0 + r * r).sqrt() - 1.0);
    }
    cost.is_finite().then_some(cost)
}

fn project(p: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(p[0].max(1.0), p[1].min(0.0), p[2].max(0.0))
}

fn solve(x: &[f64], y: &[f64], start: AttenuationCoefficients) -> Option<AttenuationCoefficients> {
    let n = x.len().min(y.len());
    if n == 0 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);

    let mut p = project(start.to_vector());
    let mut cost = robust_cost(x, y, &p)?;
    let mut damping = FIT_INITIAL_DAMPING;

    'outer: for _ in 0..FIT_MAX_ITERATIONS {
        let mut h = Matrix3::<f64>::zeros();
        let mut g = Vector3::<f64>::zeros();
        for (&xi, &yi) in x.iter().zip(y) {
            let e = (p[1] * xi).exp();
            let r = p[0] * e + p[2] - yi;
            let w = soft_l1_weight(r);
            let j = Vector3::new(e, p[0] * xi * e, 1.0);
            h += w * (j * j.transpose());
            g += w * r * j;
        }
        if !h.iter().chain(g.iter()).all(|v| v.is_finite()) {
            return None;
        }

        loop {
            if damping > MAX_DAMPING {
                break 'outer;
            }
            let mut damped = h;
            for k in 0..3 {
                damped[(k, k)] += damping * h[(k, k)].max(EPSILON);
            }
            let Some(step) = damped.lu().solve(&(-g)) else {
                damping *= 10.0;
                continue;
            };
            if !step.iter().all(|v| v.is_finite()) {
                return None;
            }

            let candidate = project(p + step);
            let candidate_cost = robust_cost(x, y, &candidate)?;
            if candidate_cost < cost {
                let moved = (candidate - p).norm();
                let decrease = (cost - candidate_cost) / cost.max(EPSILON);
                p = candidate;
                cost = candidate_cost;
                damping = (damping * 0.1).max(EPSILON);
                if decrease < FIT_TOLERANCE || moved < FIT_TOLERANCE * (p.norm() + FIT_TOLERANCE) {
                    break 'outer;
                }
                break;
            }
            damping *= 10.0;
        }
    }

    let result = AttenuationCoefficients::from_vector(&p);
    (result.a.is_finite() && result.b.is_finite() && result.c.is_finite()).then_some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_uses_thirty_and_seventy_percent_samples() {
        let x: Vec<f64> = (0..10).map(|i| 1.0 + i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&d| exp_curve(d, 80.0, -0.4, 0.0)).collect();
        let s = seed(&x, &y);
        assert!((s.a - 80.0).abs() < 1e-9);
        assert!((s.b + 0.4).abs() < 1e-12);
        assert_eq!(s.c, 0.0);
    }

    #[test]
    fn seed_rejects_increasing_curve() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(seed(&x, &y), AttenuationCoefficients::FALLBACK);
    }

    #[test]
    fn projection_enforces_bounds() {
        let p = project(Vector3::new(0.5, 0.2, -3.0));
        assert_eq!(p, Vector3::new(1.0, 0.0, 0.0));
    }
}
