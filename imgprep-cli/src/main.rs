mod args;
mod config;
mod input;
mod report;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use imgprep_core::{Classifier, PipelineError, Preprocessing};
use imgprep_utils::{configure_telemetry, init_logging, normalize_path};
use log::{info, warn};

use crate::{
    args::RunArgs,
    config::{apply_cli_overrides, load_settings},
    input::{collect_images, image_name},
    report::{ImageReport, write_reports},
};

/// Either plain preprocessing or preprocessing followed by classification.
enum Runner {
    Preprocess(Preprocessing),
    Classify(Classifier),
}

impl Runner {
    fn pipeline(&self) -> &Preprocessing {
        match self {
            Runner::Preprocess(pipeline) => pipeline,
            Runner::Classify(classifier) => classifier.pipeline(),
        }
    }

    /// Process the loader's own target file.
    fn run(&self) -> Result<ImageReport> {
        let target = self.pipeline().loading().path_to_data();
        match self {
            Runner::Preprocess(pipeline) => Ok(ImageReport::preprocessed(target, &pipeline.run()?)),
            Runner::Classify(classifier) => Ok(ImageReport::classified(target, &classifier.run()?)),
        }
    }

    fn process(&self, root: &Path, path: &Path) -> Result<ImageReport> {
        let image = self.pipeline().loading().file_to_image(path)?;
        let name = image_name(root, path);
        match self {
            Runner::Preprocess(pipeline) => Ok(ImageReport::preprocessed(
                path,
                &pipeline.handle_image(image, &name)?,
            )),
            Runner::Classify(classifier) => Ok(ImageReport::classified(
                path,
                &classifier.classify_image(image, &name)?,
            )),
        }
    }
}

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = RunArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    anyhow::ensure!(
        !settings.pipeline.load.path.as_os_str().is_empty(),
        "no input given; pass --input or set pipeline.load.path in the settings file"
    );
    settings.pipeline.load.path = normalize_path(&settings.pipeline.load.path)?;

    let pipeline = Preprocessing::try_from(&settings.pipeline)?;
    match pipeline.final_shape() {
        Ok(shape) => info!("Planned output shape {shape}"),
        Err(err @ PipelineError::ShapeIndeterminate) => warn!("{err}"),
        Err(err) => return Err(err.into()),
    }

    let runner = match settings.model.as_ref() {
        Some(model) => {
            let model_path = normalize_path(&model.path)?;
            info!("Loading ONNX model from {}", model_path.display());
            let model = imgprep_utils::ModelSettings {
                path: model_path,
                ..model.clone()
            };
            Runner::Classify(Classifier::new(pipeline, &model)?)
        }
        None => Runner::Preprocess(pipeline),
    };

    let target: PathBuf = runner.pipeline().loading().path_to_data().to_path_buf();
    let reports = if runner.pipeline().loading().targets_directory() {
        process_directory(&runner, &target)?
    } else {
        vec![runner.run()?]
    };

    write_reports(&reports, args.json.as_deref())
}

fn process_directory(runner: &Runner, dir: &Path) -> Result<Vec<ImageReport>> {
    let images = collect_images(dir)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: jpg, jpeg, png, bmp, webp)",
            dir.display()
        );
    }

    info!("Processing {} image(s)...", images.len());
    let mut reports = Vec::with_capacity(images.len());
    for image_path in images {
        match runner.process(dir, &image_path) {
            Ok(report) => {
                info!(
                    "{} -> {}x{}x{} ({} values)",
                    image_path.display(),
                    report.shape[0],
                    report.shape[1],
                    report.shape[2],
                    report.len
                );
                reports.push(report);
            }
            Err(err) => warn!("Failed to process {}: {err:#}", image_path.display()),
        }
    }

    if reports.is_empty() {
        anyhow::bail!("all images failed; cannot produce output");
    }
    Ok(reports)
}
