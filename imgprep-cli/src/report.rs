use std::{
    fs::{self, File},
    path::Path,
};

use anyhow::{Context, Result};
use imgprep_core::{Classification, PreprocessOutput, Prediction};
use log::info;
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
pub struct PredictionRecord {
    pub class_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub score: f32,
}

impl From<&Prediction> for PredictionRecord {
    fn from(prediction: &Prediction) -> Self {
        Self {
            class_index: prediction.class_index,
            label: prediction.label.clone(),
            score: prediction.score,
        }
    }
}

/// One processed image: measured shape `[width, height, channels]` and buffer length.
#[derive(Debug, Serialize, PartialEq)]
pub struct ImageReport {
    pub image: String,
    pub shape: [u32; 3],
    pub len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<PredictionRecord>>,
}

impl ImageReport {
    pub fn preprocessed(image: &Path, output: &PreprocessOutput) -> Self {
        Self {
            image: image.display().to_string(),
            shape: [output.shape.width, output.shape.height, output.shape.channels],
            len: output.data.len(),
            predictions: None,
        }
    }

    pub fn classified(image: &Path, classification: &Classification) -> Self {
        Self {
            predictions: Some(
                classification
                    .predictions
                    .iter()
                    .map(PredictionRecord::from)
                    .collect(),
            ),
            ..Self::preprocessed(image, &classification.input)
        }
    }
}

/// Write `reports` as pretty JSON to `json_path`, or to stdout when no path is given.
pub fn write_reports(reports: &[ImageReport], json_path: Option<&Path>) -> Result<()> {
    let Some(json_path) = json_path else {
        let json = serde_json::to_string_pretty(reports).context("failed to serialize report")?;
        println!("{json}");
        return Ok(());
    };

    if let Some(dir) = json_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let file = File::create(json_path)
        .with_context(|| format!("failed to create {}", json_path.display()))?;
    serde_json::to_writer_pretty(file, reports)
        .with_context(|| format!("failed to write report JSON to {}", json_path.display()))?;
    info!("Wrote report to {}", json_path.display());
    Ok(())
}
