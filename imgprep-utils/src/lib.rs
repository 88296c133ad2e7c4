//! Common helpers shared across imgprep crates.

/// Pipeline, model and telemetry settings.
pub mod config;
/// Image loading, color conversion and buffer flattening.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::LevelFilter;

pub use config::{
    AppSettings, ColorMode, ImageOpSettings, InputMode, LoadSettings, ModelSettings,
    PipelineSettings, ResizeFilter, TelemetrySettings, TensorLayout, TensorOpSettings,
};
pub use image_utils::{
    bytes_to_floats, convert_color, image_dimensions, image_to_bytes, load_image,
};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` applies. Telemetry output is
/// always let through so timing guards are governed only by [`configure_telemetry`].
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    // A logger installed earlier (tests, embedding applications) wins.
    let _ = builder.try_init();
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
