//! Settings loading and command-line overrides.

use std::path::PathBuf;

use anyhow::Result;
use imgprep_utils::{AppSettings, ModelSettings, normalize_path};
use log::info;

use crate::args::RunArgs;

/// Load application settings from a file or fall back to defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    match config_path {
        Some(path) => {
            let resolved = normalize_path(path)?;
            let settings = AppSettings::load_from_path(&resolved)?;
            info!("Loaded settings from {}", resolved.display());
            Ok(settings)
        }
        None => Ok(AppSettings::default()),
    }
}

/// Apply command-line arguments on top of loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &RunArgs) {
    let load = &mut settings.pipeline.load;
    if let Some(input) = args.input.as_ref() {
        load.path = input.clone();
    }
    if let Some(mode) = args.color_mode {
        load.color_mode = mode;
    }
    if let (Some(width), Some(height)) = (args.width, args.height) {
        load.width = Some(width);
        load.height = Some(height);
    }
    if let Some(dir) = args.save_dir.as_ref() {
        settings.pipeline.save_dir = Some(dir.clone());
    }

    if let Some(path) = args.model.as_ref() {
        settings
            .model
            .get_or_insert_with(ModelSettings::default)
            .path = path.clone();
    }
    if let Some(model) = settings.model.as_mut() {
        if let Some(layout) = args.layout {
            model.layout = layout;
        }
        if let Some(top_k) = args.top_k {
            model.top_k = top_k;
        }
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim().to_ascii_lowercase();
        if !normalized.is_empty() {
            if normalized == "off" {
                settings.telemetry.enabled = false;
            }
            settings.telemetry.level = normalized;
        }
    }
}
