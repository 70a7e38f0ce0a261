pub mod config;
pub mod parse;
pub mod process;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use aquacorrect_core::pipeline::{CorrectConfig, OUTPUT_ROOT_NAME};
use clap::Args;

/// Options shared by `parse` and `process`.
#[derive(Args)]
pub struct CorrectionArgs {
    /// Correction config file (TOML)
    pub config: PathBuf,

    /// Only correct this camera (default: every configured camera)
    #[arg(long)]
    pub camera: Option<String>,

    /// Output root (default: <config dir>/attenuation_correction)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite existing parameters, intermediates and outputs
    #[arg(short = 'F', long)]
    pub force: bool,
}

/// Configuration loaded for one invocation.
pub struct LoadedConfig {
    pub config: CorrectConfig,
    pub config_dir: PathBuf,
    pub output_root: PathBuf,
    pub cameras: Vec<String>,
}

impl CorrectionArgs {
    pub fn load(&self) -> Result<LoadedConfig> {
        let contents = std::fs::read_to_string(&self.config)
            .with_context(|| format!("Failed to read config {}", self.config.display()))?;
        let config: CorrectConfig = toml::from_str(&contents)
            .with_context(|| format!("Invalid correction config {}", self.config.display()))?;

        let config_dir = self
            .config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let output_root = self
            .output
            .clone()
            .unwrap_or_else(|| config_dir.join(OUTPUT_ROOT_NAME));

        let cameras = match &self.camera {
            Some(name) => {
                if !config.camera_names().contains(name) {
                    bail!("Camera '{name}' has no entry in [[cameras]]");
                }
                vec![name.clone()]
            }
            None => config.camera_names(),
        };
        if cameras.is_empty() {
            bail!("No cameras configured in {}", self.config.display());
        }

        Ok(LoadedConfig {
            config,
            config_dir,
            output_root,
            cameras,
        })
    }
}
