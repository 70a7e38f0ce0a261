use std::path::PathBuf;

use anyhow::{Context, Result};
use aquacorrect_core::color::ManualBalance;
use aquacorrect_core::pipeline::camera::CameraEntry;
use aquacorrect_core::pipeline::config::{BrightnessContrast, CameraCorrectionConfig, ALL_IMAGES};
use aquacorrect_core::pipeline::CorrectConfig;
use clap::Args;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a full default CorrectConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = CorrectConfig {
        cameras: vec![CameraCorrectionConfig {
            camera_name: "cam0".to_string(),
            image_file_list: ALL_IMAGES.to_string(),
            colour_correction: BrightnessContrast::default(),
            manual_balance: ManualBalance::default(),
        }],
        camera_system: vec![CameraEntry {
            name: "cam0".to_string(),
            sensor_type: "rggb".to_string(),
            bit_depth: 12,
            extension: "tif".to_string(),
            path: PathBuf::from("raw/cam0"),
            image_height: 1024,
            image_width: 1280,
            image_channels: 1,
            calibration: None,
        }],
        ..CorrectConfig::default()
    };
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
