use approx::assert_relative_eq;

use aquacorrect_core::attenuation::{exp_curve, fit, seed, AttenuationCoefficients, FitOutcome};

fn samples(a: f64, b: f64, c: f64, count: usize) -> (Vec<f64>, Vec<f64>) {
    let x: Vec<f64> = (0..count).map(|i| 1.0 + 0.25 * i as f64).collect();
    let y = x.iter().map(|&d| exp_curve(d, a, b, c)).collect();
    (x, y)
}

#[test]
fn test_exp_curve_values() {
    assert_relative_eq!(exp_curve(0.0, 5.0, -1.0, 2.0), 7.0);
    assert_relative_eq!(exp_curve(2.0, 3.0, -0.5, 0.0), 3.0 * (-1.0f64).exp());
}

#[test]
fn test_exp_curve_is_non_increasing_for_admissible_coefficients() {
    let p = AttenuationCoefficients::new(12.0, -0.3, 1.5);
    assert!(p.is_admissible());
    let mut previous = f64::INFINITY;
    for i in 0..100 {
        let v = p.evaluate(i as f64 * 0.1);
        assert!(v <= previous);
        previous = v;
    }
}

#[test]
fn test_fit_recovers_exact_samples_without_offset() {
    let (x, y) = samples(80.0, -0.4, 0.0, 12);
    let outcome = fit(&x, &y);
    assert!(outcome.is_fitted());
    let p = outcome.coefficients();
    assert_relative_eq!(p.a, 80.0, max_relative = 1e-6);
    assert_relative_eq!(p.b, -0.4, max_relative = 1e-6);
    assert!(p.c.abs() < 1e-6);
}

#[test]
fn test_fit_recovers_samples_with_offset() {
    let (x, y) = samples(60.0, -0.5, 5.0, 20);
    let outcome = fit(&x, &y);
    assert!(outcome.is_fitted());
    let p = outcome.coefficients();
    assert_relative_eq!(p.a, 60.0, max_relative = 1e-6);
    assert_relative_eq!(p.b, -0.5, max_relative = 1e-6);
    assert_relative_eq!(p.c, 5.0, max_relative = 1e-6);
}

#[test]
fn test_fit_recovers_large_offset() {
    let (x, y) = samples(2000.0, -0.3, 100.0, 20);
    let outcome = fit(&x, &y);
    assert!(outcome.is_fitted());
    let p = outcome.coefficients();
    assert_relative_eq!(p.a, 2000.0, max_relative = 1e-5);
    assert_relative_eq!(p.b, -0.3, max_relative = 1e-5);
    assert_relative_eq!(p.c, 100.0, max_relative = 1e-5);
}

#[test]
fn test_fit_result_respects_bounds() {
    let (x, y) = samples(3.0, -0.8, 20.0, 15);
    let p = fit(&x, &y).coefficients();
    assert!(p.a >= 1.0);
    assert!(p.b <= 0.0);
    assert!(p.c >= 0.0);
}

#[test]
fn test_increasing_data_never_yields_increasing_model() {
    let x = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
    let y = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
    let p = fit(&x, &y).coefficients();
    assert!(p.b <= 0.0);
    assert!(p.a >= 1.0);
}

#[test]
fn test_seed_falls_back_on_degenerate_input() {
    assert_eq!(seed(&[], &[]), AttenuationCoefficients::FALLBACK);
    let x = [1.0, 2.0, 3.0];
    let y = [0.0, 0.0, 0.0];
    assert_eq!(seed(&x, &y), AttenuationCoefficients::FALLBACK);
}

#[test]
fn test_non_finite_samples_fall_back() {
    let x = [1.0, 2.0, 3.0, 4.0];
    let y = [f64::NAN, f64::NAN, f64::NAN, f64::NAN];
    let outcome = fit(&x, &y);
    assert!(matches!(outcome, FitOutcome::FallbackUnoptimized(_)));
}

#[test]
fn test_fallback_coefficients() {
    let p = AttenuationCoefficients::default();
    assert_eq!(p.to_array(), [1.01, -0.01, 0.0]);
    assert!(p.is_admissible());
}
