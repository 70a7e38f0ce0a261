use approx::assert_relative_eq;
use ndarray::{Array2, Array3, Array4, Axis};
use tempfile::TempDir;

use aquacorrect_core::attenuation::estimator::{
    apply_corrections, assign_bins, attenuation_correct, bin_edges, bin_samples,
    correction_gains, fit_channel, BinSamples,
};
use aquacorrect_core::attenuation::{exp_curve, AttenuationModel, ParameterSet};
use aquacorrect_core::error::CorrectError;
use aquacorrect_core::io::memmap::ArrayStack;
use aquacorrect_core::stats::SmoothingPolicy;

fn uniform_params(h: usize, w: usize, a: f64, b: f64, c: f64) -> Array3<f64> {
    Array3::from_shape_fn((h, w, 3), |(_, _, k)| [a, b, c][k])
}

#[test]
fn test_bins_group_by_mean_distance() {
    let edges = bin_edges(1.0, 1.35);
    assert_eq!(edges.len(), 4);
    let bins = assign_bins(&[1.0, 1.05, 1.12, 1.25, 1.35, 0.5], &edges);
    assert_eq!(bins.len(), 3);
    assert_eq!(bins[0], vec![0, 1]);
    assert_eq!(bins[1], vec![2]);
    // 1.35 lies at or above the last edge and 0.5 below the first.
    assert_eq!(bins[2], vec![3]);
}

#[test]
fn test_equal_distances_give_no_bins() {
    assert!(bin_edges(2.0, 2.0).is_empty());
    assert!(assign_bins(&[2.0, 2.0], &[]).is_empty());
}

#[test]
fn test_fit_channel_recovers_synthetic_attenuation() {
    let (h, w) = (3, 4);
    let distances: Vec<f64> = (0..10).map(|i| 1.0 + 0.3 * i as f64).collect();
    let samples = BinSamples {
        images: distances
            .iter()
            .map(|&d| {
                Array2::from_shape_fn((h, w), |(r, c)| {
                    exp_curve(d, 50.0 + (r * w + c) as f64, -0.35, 0.0) as f32
                })
            })
            .collect(),
        distances: distances
            .iter()
            .map(|&d| Array2::from_elem((h, w), d as f32))
            .collect(),
    };

    let fitted = fit_channel(&samples, |_| {}).unwrap();
    assert_eq!(fitted.parameters.dim(), (h, w, 3));
    assert_eq!(fitted.fallbacks, 0);
    for r in 0..h {
        for c in 0..w {
            let a = fitted.parameters[[r, c, 0]];
            let b = fitted.parameters[[r, c, 1]];
            assert_relative_eq!(a, 50.0 + (r * w + c) as f64, max_relative = 1e-3);
            assert_relative_eq!(b, -0.35, max_relative = 1e-3);
        }
    }
}

#[test]
fn test_fit_channel_keeps_bounds_on_increasing_data() {
    let samples = BinSamples {
        images: (0..4).map(|i| Array2::from_elem((1, 2), 10.0 * (i + 1) as f32)).collect(),
        distances: (0..4).map(|i| Array2::from_elem((1, 2), 1.0 + i as f32)).collect(),
    };
    let fitted = fit_channel(&samples, |_| {}).unwrap();
    for col in 0..2 {
        assert!(fitted.parameters[[0, col, 0]] >= 1.0);
        assert!(fitted.parameters[[0, col, 1]] <= 0.0);
    }
    assert!(fit_channel(&BinSamples { images: vec![], distances: vec![] }, |_| {}).is_err());
}

#[test]
fn test_gains_evaluate_model_at_target() {
    let params = uniform_params(2, 2, 10.0, -0.5, 1.0);
    let target = Array2::from_elem((2, 2), 2.0);
    let gains = correction_gains(params.view(), target.view());
    let expected = 10.0 * (-1.0f64).exp() + 1.0;
    assert!(gains.iter().all(|&g| (g - expected).abs() < 1e-12));
}

#[test]
fn test_correction_is_identity_at_target_distance() {
    let params = uniform_params(2, 3, 20.0, -0.3, 0.5);
    let target = Array2::from_elem((2, 3), 1.7);
    let gains = correction_gains(params.view(), target.view());
    let raw = Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f32 * 11.0);
    let distance = Array2::from_elem((2, 3), 1.7f32);

    let out = attenuation_correct(raw.view(), distance.view(), params.view(), gains.view());
    for (o, r) in out.iter().zip(raw.iter()) {
        assert_relative_eq!(*o, *r, max_relative = 1e-5);
    }
}

#[test]
fn test_correction_brightens_distant_images() {
    let params = uniform_params(1, 1, 20.0, -0.3, 0.0);
    let target = Array2::from_elem((1, 1), 1.0);
    let gains = correction_gains(params.view(), target.view());
    let raw = Array2::from_elem((1, 1), 10.0f32);
    let far = Array2::from_elem((1, 1), 3.0f32);
    let out = attenuation_correct(raw.view(), far.view(), params.view(), gains.view());
    assert_relative_eq!(out[[0, 0]], 10.0 * (0.6f32).exp(), max_relative = 1e-5);
}

#[test]
fn test_bin_samples_and_apply_corrections_on_stacks() {
    let tmp = TempDir::new().unwrap();
    let distances_m = [1.0f32, 1.02, 1.5, 1.52];
    let mut images = ArrayStack::create(tmp.path(), 4, (2, 2, 1)).unwrap();
    let mut distances = ArrayStack::create(tmp.path(), 4, (2, 2, 1)).unwrap();
    for (i, &d) in distances_m.iter().enumerate() {
        images
            .write_item(i, Array3::from_elem((2, 2, 1), 100.0 / d).view())
            .unwrap();
        distances
            .write_item(i, Array3::from_elem((2, 2, 1), d).view())
            .unwrap();
    }

    let bins = vec![vec![0, 1], vec![], vec![2, 3]];
    let samples = bin_samples(&images, &distances, 0, &bins, SmoothingPolicy::Mean, |_| {}).unwrap();
    assert_eq!(samples.len(), 2);
    assert_relative_eq!(samples.distances[0][[0, 0]], 1.01, max_relative = 1e-5);
    assert_relative_eq!(samples.distances[1][[1, 1]], 1.51, max_relative = 1e-5);

    let params = uniform_params(2, 2, 5.0, -0.2, 0.0);
    let target = Array2::from_elem((2, 2), 1.0);
    let gains = correction_gains(params.view(), target.view());
    apply_corrections(&mut images, &distances, 0, params.view(), gains.view(), |_| {}).unwrap();

    let corrected = images.channel(2, 0).unwrap()[[0, 0]];
    let expected = (100.0f32 / 1.5) * (0.2f32 * 0.5).exp();
    assert_relative_eq!(corrected, expected, max_relative = 1e-4);
    // Items at the target distance are unchanged.
    assert_relative_eq!(images.channel(0, 0).unwrap()[[1, 0]], 100.0, max_relative = 1e-5);
}

#[test]
fn test_parameter_set_persists_and_validates() {
    let tmp = TempDir::new().unwrap();
    let dim = (3, 2, 2);
    let set = ParameterSet {
        raw_mean: Array3::from_elem(dim, 40.0),
        raw_std: Array3::from_elem(dim, 4.0),
        attenuation: Some(AttenuationModel {
            parameters: Array4::from_shape_fn((3, 2, 2, 3), |(_, _, _, k)| [2.0, -0.1, 0.0][k]),
            gains: Array3::from_elem(dim, 1.5),
            corrected_mean: Array3::from_elem(dim, 30.0),
            corrected_std: Array3::from_elem(dim, 3.0),
        }),
    };
    set.save(tmp.path()).unwrap();

    let loaded = ParameterSet::load(tmp.path()).unwrap();
    assert_eq!(loaded.dim(), dim);
    let model = loaded.attenuation.unwrap();
    assert_eq!(model.parameters.index_axis(Axis(3), 1)[[2, 1, 1]], -0.1);
    assert_eq!(model.gains, Array3::from_elem(dim, 1.5));
}

#[test]
fn test_parameter_set_without_model() {
    let tmp = TempDir::new().unwrap();
    let set = ParameterSet {
        raw_mean: Array3::zeros((1, 2, 2)),
        raw_std: Array3::ones((1, 2, 2)),
        attenuation: None,
    };
    set.save(tmp.path()).unwrap();
    assert!(ParameterSet::load(tmp.path()).unwrap().attenuation.is_none());
}

#[test]
fn test_missing_parameters_are_reported() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(
        ParameterSet::load(tmp.path()),
        Err(CorrectError::MissingParseOutput(_))
    ));
}
