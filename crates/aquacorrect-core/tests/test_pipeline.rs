#[allow(dead_code)]
mod common;

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use aquacorrect_core::attenuation::parameters::{
    ATTENUATION_PARAMETERS_FILE, CORRECTED_MEAN_FILE, CORRECTED_STD_FILE, CORRECTION_GAINS_FILE,
    RAW_MEAN_FILE, RAW_STD_FILE,
};
use aquacorrect_core::attenuation::ParameterSet;
use aquacorrect_core::error::CorrectError;
use aquacorrect_core::io::manifest::read_manifest;
use aquacorrect_core::io::npy::{read_npy, write_npy};
use aquacorrect_core::pipeline::config::{DistanceMetric, MethodKind};
use aquacorrect_core::pipeline::{CorrectConfig, Corrector, CorrectorState, Phase};

use approx::assert_relative_eq;
use ndarray::{Array2, Ix2};

use common::{altitude_ramp, files_with_extension, image_name, Survey, CAMERA, HEIGHT, WIDTH};

const IMAGES: usize = 12;

fn survey(tmp: &TempDir) -> Survey {
    Survey::create(tmp.path(), &altitude_ramp(1.0, 0.15, IMAGES))
}

fn corrector(survey: &Survey, config: CorrectConfig, force: bool) -> Corrector {
    Corrector::new(config, CAMERA, &survey.root, &survey.output_root(), force)
}

fn run_parse(survey: &Survey, config: CorrectConfig, force: bool) -> Corrector {
    let mut c = corrector(survey, config, force);
    c.setup(Phase::Parse).unwrap();
    c.parse().unwrap();
    c
}

#[test]
fn test_parse_then_process() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);

    let mut parser = corrector(&survey, survey.config.clone(), false);
    assert_eq!(parser.state(), CorrectorState::Uninitialized);
    parser.setup(Phase::Parse).unwrap();
    assert_eq!(parser.state(), CorrectorState::Configured(Phase::Parse));

    let summary = parser.parse().unwrap();
    assert_eq!(parser.state(), CorrectorState::Parsed);
    assert_eq!(summary.images, IMAGES);
    assert_eq!(summary.admissible, IMAGES);
    assert_eq!(summary.channels, 1);
    assert!(summary.bins >= 3);

    for name in [
        RAW_MEAN_FILE,
        RAW_STD_FILE,
        ATTENUATION_PARAMETERS_FILE,
        CORRECTION_GAINS_FILE,
        CORRECTED_MEAN_FILE,
        CORRECTED_STD_FILE,
    ] {
        assert!(summary.parameters_dir.join(name).is_file(), "{name} missing");
    }
    let params = ParameterSet::load(&summary.parameters_dir).unwrap();
    assert_eq!(params.dim(), (1, HEIGHT, WIDTH));
    let model = params.attenuation.as_ref().unwrap();
    assert_eq!(model.parameters.dim(), (1, HEIGHT, WIDTH, 3));
    assert!(model.gains.iter().all(|g| g.is_finite() && *g > 0.0));

    // The intermediates are already in place, so process may follow parse.
    parser.setup(Phase::Process).unwrap();
    let processed = parser.process().unwrap();
    assert_eq!(parser.state(), CorrectorState::Processed);
    assert_eq!(processed.images, IMAGES);
    assert!(!processed.undistorted);

    let outputs = files_with_extension(&processed.output_dir, "png");
    assert_eq!(outputs.len(), IMAGES);
    let first = image::open(&outputs[0]).unwrap().to_rgb8();
    assert_eq!((first.width(), first.height()), (WIDTH as u32, HEIGHT as u32));

    let manifest = read_manifest(&processed.manifest).unwrap();
    let expected: Vec<String> = (0..IMAGES)
        .map(|i| image_name(i).replace(".tif", ".png"))
        .collect();
    assert_eq!(manifest, expected);
}

#[test]
fn test_process_without_parse_fails() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let mut c = corrector(&survey, survey.config.clone(), false);
    let err = c.setup(Phase::Process).unwrap_err();
    assert!(matches!(err, CorrectError::MissingParseOutput(_)));
    assert_eq!(c.state(), CorrectorState::Uninitialized);
}

#[test]
fn test_reparse_requires_force() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    run_parse(&survey, survey.config.clone(), false);

    let mut again = corrector(&survey, survey.config.clone(), false);
    assert!(matches!(
        again.setup(Phase::Parse),
        Err(CorrectError::ParametersExist(_))
    ));

    run_parse(&survey, survey.config.clone(), true);
}

#[test]
fn test_reprocess_requires_force() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    run_parse(&survey, survey.config.clone(), false);

    let mut first = corrector(&survey, survey.config.clone(), false);
    first.setup(Phase::Process).unwrap();
    first.process().unwrap();

    let mut second = corrector(&survey, survey.config.clone(), false);
    assert!(matches!(
        second.setup(Phase::Process),
        Err(CorrectError::OutputsExist(_))
    ));

    let mut forced = corrector(&survey, survey.config.clone(), true);
    forced.setup(Phase::Process).unwrap();
    assert_eq!(forced.process().unwrap().images, IMAGES);
}

#[test]
fn test_out_of_order_calls_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);

    let mut c = corrector(&survey, survey.config.clone(), false);
    assert!(matches!(c.parse(), Err(CorrectError::State(_))));
    assert!(matches!(c.process(), Err(CorrectError::State(_))));

    c.setup(Phase::Parse).unwrap();
    assert!(matches!(c.process(), Err(CorrectError::State(_))));
    assert!(matches!(c.setup(Phase::Parse), Err(CorrectError::State(_))));

    c.parse().unwrap();
    assert!(matches!(c.parse(), Err(CorrectError::State(_))));
    assert!(matches!(c.setup(Phase::Parse), Err(CorrectError::State(_))));
}

#[test]
fn test_manual_balance_needs_no_parse() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let mut config = survey.config.clone();
    config.method = MethodKind::ManualBalance;

    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    let summary = c.process().unwrap();
    assert_eq!(summary.images, IMAGES);
    assert_eq!(files_with_extension(&summary.output_dir, "png").len(), IMAGES);
    assert!(summary
        .output_dir
        .to_string_lossy()
        .contains("manually_corrected"));
}

#[test]
fn test_greyworld_correction_uses_raw_statistics() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let mut config = survey.config.clone();
    config.colour_correction.distance_metric = DistanceMetric::None;

    let parser = run_parse(&survey, config.clone(), false);
    let params_dir = &parser.layout().unwrap().params_dir;
    assert!(params_dir.to_string_lossy().contains("greyworld_corrected"));
    let params = ParameterSet::load(params_dir).unwrap();
    assert!(params.attenuation.is_none());

    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    assert_eq!(c.process().unwrap().images, IMAGES);
}

#[test]
fn test_sixteen_bit_tiff_output() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let mut config = survey.config.clone();
    config.output_settings.compression_parameter = "tif".to_string();
    config.output_settings.bit_depth = 16;

    run_parse(&survey, config.clone(), false);
    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    let summary = c.process().unwrap();

    let outputs = files_with_extension(&summary.output_dir, "tif");
    assert_eq!(outputs.len(), IMAGES);
    let img = image::open(&outputs[0]).unwrap();
    assert!(matches!(img, image::DynamicImage::ImageRgb16(_)));
}

#[test]
fn test_missing_calibration_disables_undistortion() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let mut config = survey.config.clone();
    config.output_settings.undistort = true;

    run_parse(&survey, config.clone(), false);
    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    let summary = c.process().unwrap();
    assert!(!summary.undistorted);
    assert_eq!(summary.images, IMAGES);
}

#[test]
fn test_user_image_list_restricts_and_trims_navigation() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let listed: Vec<String> = (0..6).map(image_name).collect();
    fs::create_dir_all(survey.root.join("lists")).unwrap();
    fs::write(survey.root.join("lists/cam0.txt"), listed.join("\n")).unwrap();

    let mut config = survey.config.clone();
    config.cameras[0].image_file_list = "lists/cam0.txt".to_string();

    let parser = run_parse(&survey, config.clone(), false);
    assert_eq!(
        parser.settings().unwrap().navigation_csv,
        Some(survey.root.join("trimmed_csv_cam0.csv"))
    );
    let trimmed = fs::read_to_string(survey.root.join("trimmed_csv_cam0.csv")).unwrap();
    assert_eq!(trimmed.lines().count(), 1 + listed.len());

    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    let summary = c.process().unwrap();
    assert_eq!(summary.images, listed.len());
    let expected: Vec<String> = listed.iter().map(|n| n.replace(".tif", ".png")).collect();
    assert_eq!(read_manifest(&summary.manifest).unwrap(), expected);
}

#[test]
fn test_user_image_list_skips_images_without_navigation() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    survey.drop_navigation_row(&image_name(0));
    let listed: Vec<String> = (0..6).map(image_name).collect();
    fs::create_dir_all(survey.root.join("lists")).unwrap();
    fs::write(survey.root.join("lists/cam0.txt"), listed.join("\n")).unwrap();

    let mut config = survey.config.clone();
    config.cameras[0].image_file_list = "lists/cam0.txt".to_string();

    let parser = run_parse(&survey, config.clone(), false);
    let trimmed = fs::read_to_string(survey.root.join("trimmed_csv_cam0.csv")).unwrap();
    assert_eq!(trimmed.lines().count(), listed.len());

    // img_001 keeps its own altitude rather than inheriting img_000's row.
    let distance_dir = &parser.layout().unwrap().distance_dir;
    assert!(!distance_dir.join("img_000.npy").exists());
    let distance = read_npy::<f32>(&distance_dir.join("img_001.npy"))
        .unwrap()
        .into_dimensionality::<Ix2>()
        .unwrap();
    for &d in distance.iter() {
        assert_relative_eq!(d, survey.altitudes[1] as f32, max_relative = 1e-6);
    }

    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    let summary = c.process().unwrap();
    let expected: Vec<String> = (1..6)
        .map(|i| image_name(i).replace(".tif", ".png"))
        .collect();
    assert_eq!(summary.images, expected.len());
    assert_eq!(read_manifest(&summary.manifest).unwrap(), expected);
}

#[test]
fn test_depth_map_parse_then_process() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let depth_dir = survey.root.join("depth");
    fs::create_dir_all(&depth_dir).unwrap();
    for (i, &altitude) in survey.altitudes.iter().enumerate() {
        let name = format!("depth_{}.npy", image_name(i).replace(".tif", ""));
        write_npy(&depth_dir.join(name), &Array2::<f32>::from_elem((8, 8), altitude as f32)).unwrap();
    }

    let mut config = survey.config.clone();
    config.colour_correction.distance_metric = DistanceMetric::DepthMap;
    config.colour_correction.depth_map_path = PathBuf::from("depth");

    let parser = run_parse(&survey, config.clone(), false);
    let layout = parser.layout().unwrap();
    assert!(layout.params_dir.ends_with("depth_map_corrected"));
    assert!(ParameterSet::load(&layout.params_dir).unwrap().attenuation.is_some());

    let distances = files_with_extension(&layout.distance_dir, "npy");
    assert_eq!(distances.len(), IMAGES);
    for (path, &altitude) in distances.iter().zip(&survey.altitudes) {
        let distance = read_npy::<f32>(path).unwrap().into_dimensionality::<Ix2>().unwrap();
        assert_eq!(distance.dim(), (HEIGHT, WIDTH));
        for &d in distance.iter() {
            assert_relative_eq!(d, altitude as f32, max_relative = 1e-6);
        }
    }

    let mut c = corrector(&survey, config, false);
    c.setup(Phase::Process).unwrap();
    let summary = c.process().unwrap();
    assert_eq!(summary.images, IMAGES);
    assert_eq!(files_with_extension(&summary.output_dir, "png").len(), IMAGES);
}

#[test]
fn test_missing_user_list_fails() {
    let tmp = TempDir::new().unwrap();
    let survey = survey(&tmp);
    let mut config = survey.config.clone();
    config.cameras[0].image_file_list = "lists/absent.txt".to_string();

    let mut c = corrector(&survey, config, false);
    assert!(matches!(
        c.setup(Phase::Parse),
        Err(CorrectError::MissingFile(_))
    ));
}
