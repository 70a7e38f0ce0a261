use std::sync::Arc;

use anyhow::{Context, Result};
use aquacorrect_core::pipeline::{Corrector, Phase};
use clap::Args;
use tracing::info;

use super::CorrectionArgs;
use crate::progress::BarReporter;
use crate::summary::print_process_summary;

#[derive(Args)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub common: CorrectionArgs,
}

pub fn run(args: &ProcessArgs) -> Result<()> {
    let loaded = args.common.load()?;

    for camera in &loaded.cameras {
        info!(camera = %camera, force = args.common.force, "Processing camera");
        let reporter = Arc::new(BarReporter::new()?);
        let mut corrector = Corrector::new(
            loaded.config.clone(),
            camera.as_str(),
            &loaded.config_dir,
            &loaded.output_root,
            args.common.force,
        )
        .with_reporter(reporter.clone());

        corrector
            .setup(Phase::Process)
            .with_context(|| format!("Failed to set up process for camera '{camera}'"))?;
        let summary = corrector
            .process()
            .with_context(|| format!("Failed to correct images of camera '{camera}'"))?;
        reporter.finish();

        if let Some(settings) = corrector.settings() {
            print_process_summary(&summary, settings);
        }
    }
    Ok(())
}
