//! The staged preprocessing runner.
//!
//! A [`Preprocessing`] pipeline loads an image, runs the image stage, flattens the result
//! into an `f32` buffer using the loader's color mode and finally runs the tensor stage.
//! Shapes can be planned ahead of time with [`Preprocessing::final_shape`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use image::DynamicImage;
use imgprep_utils::{
    PipelineSettings, bytes_to_floats, convert_color, image_to_bytes, timing_guard,
};
use log::trace;

use crate::{
    error::PipelineError,
    image_ops::ImageOperation,
    loading::Loading,
    save::{DirectorySaver, ImageSaver},
    shape::{ImageShape, PlannedShape},
    tensor_ops::TensorOperation,
};

/// An image operation together with its optional save sink.
#[derive(Debug)]
pub struct ImageStep {
    operation: Box<dyn ImageOperation>,
    save: Option<Arc<dyn ImageSaver>>,
}

impl ImageStep {
    pub fn operation(&self) -> &dyn ImageOperation {
        self.operation.as_ref()
    }

    pub fn save_sink(&self) -> Option<&dyn ImageSaver> {
        self.save.as_deref()
    }
}

/// Ordered image-stage operations; empty by default.
#[derive(Debug, Default)]
pub struct ImageStage {
    steps: Vec<ImageStep>,
}

impl ImageStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation without a save sink.
    pub fn then<O: ImageOperation + 'static>(self, operation: O) -> Self {
        self.push(Box::new(operation), None)
    }

    /// Append an operation whose output is persisted through `saver`.
    pub fn then_saved<O: ImageOperation + 'static>(
        self,
        operation: O,
        saver: Arc<dyn ImageSaver>,
    ) -> Self {
        self.push(Box::new(operation), Some(saver))
    }

    pub fn push(
        mut self,
        operation: Box<dyn ImageOperation>,
        save: Option<Arc<dyn ImageSaver>>,
    ) -> Self {
        self.steps.push(ImageStep { operation, save });
        self
    }

    pub fn steps(&self) -> &[ImageStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Ordered tensor-stage operations; empty by default.
#[derive(Debug, Default)]
pub struct TensorStage {
    operations: Vec<Box<dyn TensorOperation>>,
}

impl TensorStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<O: TensorOperation + 'static>(self, operation: O) -> Self {
        self.push(Box::new(operation))
    }

    pub fn push(mut self, operation: Box<dyn TensorOperation>) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn operations(&self) -> &[Box<dyn TensorOperation>] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Result of running the pipeline on one image.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOutput {
    /// Flat buffer after the tensor stage.
    pub data: Vec<f32>,
    /// Shape measured from the final image, before the tensor stage.
    pub shape: ImageShape,
}

/// Loader plus image and tensor stages.
#[derive(Debug)]
pub struct Preprocessing {
    load: Loading,
    image_stage: ImageStage,
    tensor_stage: TensorStage,
}

impl Preprocessing {
    /// A pipeline with empty image and tensor stages.
    pub fn new(load: Loading) -> Self {
        Self {
            load,
            image_stage: ImageStage::default(),
            tensor_stage: TensorStage::default(),
        }
    }

    pub fn transform_image(mut self, stage: ImageStage) -> Self {
        self.image_stage = stage;
        self
    }

    pub fn transform_tensor(mut self, stage: TensorStage) -> Self {
        self.tensor_stage = stage;
        self
    }

    pub fn loading(&self) -> &Loading {
        &self.load
    }

    pub fn image_stage(&self) -> &ImageStage {
        &self.image_stage
    }

    pub fn tensor_stage(&self) -> &TensorStage {
        &self.tensor_stage
    }

    /// Plan the shape of the image leaving the image stage.
    ///
    /// Starts from the loader's declared shape (if any) and lets every image operation
    /// refine it. The final image is flattened in the loader's color mode, so the planned
    /// channel count is the loader's. Fails with [`PipelineError::ShapeIndeterminate`] when
    /// nothing fixes the size.
    pub fn final_shape(&self) -> Result<ImageShape, PipelineError> {
        let color_mode = self.load.color_mode();
        let start = (PlannedShape::from(self.load.image_shape()), color_mode);
        let (planned, _) = self
            .image_stage
            .steps
            .iter()
            .fold(start, |(shape, mode), step| {
                let op = step.operation();
                (op.output_shape(shape, mode), op.output_color_mode(mode))
            });
        planned
            .map(|shape| ImageShape::new(shape.width, shape.height, color_mode.channels()))
            .known()
            .ok_or(PipelineError::ShapeIndeterminate)
    }

    /// Run the pipeline on the loader's single target file.
    pub fn run(&self) -> Result<PreprocessOutput> {
        let _guard = timing_guard("imgprep_core::run", log::Level::Debug);
        let path = self.load.path_to_data();
        if self.load.targets_directory() {
            return Err(PipelineError::InvalidTarget {
                path: path.to_path_buf(),
            }
            .into());
        }
        let image = self.load.file_to_image(path)?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("image");
        self.handle_image(image, name)
    }

    /// Run both stages on an already decoded image.
    ///
    /// `name` identifies the image to save sinks.
    pub fn handle_image(&self, image: DynamicImage, name: &str) -> Result<PreprocessOutput> {
        let _guard = timing_guard("imgprep_core::handle_image", log::Level::Trace);

        let mut image = image;
        for step in &self.image_stage.steps {
            let op = step.operation();
            trace!("{name}: applying image operation {}", op.name());
            image = op
                .apply(image)
                .with_context(|| format!("{} failed on {name}", op.name()))?;
            if let Some(saver) = step.save_sink() {
                saver
                    .save(name, &image)
                    .with_context(|| format!("saving {name} after {} failed", op.name()))?;
            }
        }

        let color_mode = self.load.color_mode();
        let image = convert_color(&image, color_mode);
        let shape = ImageShape::of(&image);
        let mut data = bytes_to_floats(&image_to_bytes(&image, color_mode));

        for op in &self.tensor_stage.operations {
            trace!("{name}: applying tensor operation {}", op.name());
            data = op
                .apply(data, shape)
                .with_context(|| format!("{} failed on {name}", op.name()))?;
        }

        Ok(PreprocessOutput { data, shape })
    }
}

/// Directory receiving snapshots taken after image operation `index`.
pub fn step_save_dir(save_dir: &Path, index: usize, operation: &str) -> PathBuf {
    save_dir.join(format!("{index}_{operation}"))
}

impl TryFrom<&PipelineSettings> for Preprocessing {
    type Error = anyhow::Error;

    /// Operations flagged with `save` write into `<save_dir>/<index>_<operation>/`, so
    /// `save_dir` must then be set.
    fn try_from(settings: &PipelineSettings) -> Result<Self> {
        let mut image_stage = ImageStage::new();
        for (index, op) in settings.image_ops.iter().enumerate() {
            let operation: Box<dyn ImageOperation> = op.into();
            let save = if op.wants_save() {
                let dir = settings.save_dir.as_ref().with_context(|| {
                    format!("image operation #{index} requests saving but save_dir is unset")
                })?;
                let step_dir = step_save_dir(dir, index, operation.name());
                Some(Arc::new(DirectorySaver::new(step_dir)) as Arc<dyn ImageSaver>)
            } else {
                None
            };
            image_stage = image_stage.push(operation, save);
        }

        let tensor_stage = settings
            .tensor_ops
            .iter()
            .fold(TensorStage::new(), |stage, op| stage.push(op.into()));

        Ok(Preprocessing::new(Loading::from(&settings.load))
            .transform_image(image_stage)
            .transform_tensor(tensor_stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_ops::{Convert, Crop, Pad, Resize, Rotate};
    use crate::tensor_ops::{ChannelsFirst, Rescaling};
    use image::{GenericImageView, Rgb, RgbImage};
    use imgprep_utils::{ColorMode, ImageOpSettings, LoadSettings, TensorOpSettings};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingSaver {
        saved: Mutex<Vec<(String, DynamicImage)>>,
    }

    impl ImageSaver for RecordingSaver {
        fn save(&self, name: &str, image: &DynamicImage) -> Result<()> {
            self.saved
                .lock()
                .expect("saver lock")
                .push((name.to_string(), image.clone()));
            Ok(())
        }
    }

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7) as u8, (y * 5) as u8, 90])
        }))
    }

    #[test]
    fn final_shape_without_operations_or_declaration_is_indeterminate() {
        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Rgb));
        assert_eq!(pipeline.final_shape(), Err(PipelineError::ShapeIndeterminate));
        let message = PipelineError::ShapeIndeterminate.to_string();
        assert!(message.contains("resize"));
        assert!(message.contains("declare"));
    }

    #[test]
    fn final_shape_uses_declared_shape_through_shape_preserving_ops() {
        let pipeline = Preprocessing::new(
            Loading::new("img.png", ColorMode::Rgb).with_declared_size(40, 30),
        )
        .transform_image(ImageStage::new().then(Rotate::new(15.0)).then(Crop::new(5, 5, 0, 10)));
        assert_eq!(pipeline.final_shape(), Ok(ImageShape::new(30, 20, 3)));
    }

    #[test]
    fn final_shape_matches_output_after_color_conversion() {
        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Rgb)).transform_image(
            ImageStage::new()
                .then(Convert::new(ColorMode::Grayscale))
                .then(Resize::new(16, 8)),
        );
        let planned = pipeline.final_shape().expect("resize fixes the shape");
        assert_eq!(planned, ImageShape::new(16, 8, 3));

        let output = pipeline.handle_image(sample(30, 20), "gray").expect("handle");
        assert_eq!(output.shape, planned);
        assert_eq!(output.data.len(), planned.num_elements());
    }

    #[test]
    fn final_shape_survives_oversized_padding() {
        let pipeline = Preprocessing::new(
            Loading::new("img.png", ColorMode::Grayscale).with_declared_size(10, 10),
        )
        .transform_image(ImageStage::new().then(Pad {
            left: u32::MAX,
            ..Pad::default()
        }));
        assert_eq!(pipeline.final_shape(), Ok(ImageShape::new(u32::MAX, 10, 1)));
    }

    #[test]
    fn shape_preserving_ops_after_unknown_stay_unknown() {
        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Rgb))
            .transform_image(ImageStage::new().then(Rotate::new(90.0)));
        assert_eq!(pipeline.final_shape(), Err(PipelineError::ShapeIndeterminate));
    }

    #[test]
    fn empty_stages_flatten_the_loaded_image() {
        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Bgr));
        let output = pipeline.handle_image(sample(5, 4), "plain").expect("handle");

        assert_eq!(output.shape, ImageShape::new(5, 4, 3));
        assert_eq!(output.data.len(), output.shape.num_elements());
        // first pixel is (0, 0, 90) in RGB
        assert_eq!(&output.data[..3], &[90.0, 0.0, 0.0]);
    }

    #[test]
    fn concrete_shape_comes_from_the_image_not_the_plan() {
        let pipeline = Preprocessing::new(
            Loading::new("img.png", ColorMode::Grayscale).with_declared_size(100, 100),
        );
        let output = pipeline.handle_image(sample(7, 3), "gray").expect("handle");
        assert_eq!(output.shape, ImageShape::new(7, 3, 1));
        assert_eq!(output.data.len(), 21);
    }

    #[test]
    fn saves_only_after_operations_with_a_sink() {
        let saver = Arc::new(RecordingSaver::default());
        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Rgb)).transform_image(
            ImageStage::new()
                .then_saved(Crop::new(0, 0, 0, 2), saver.clone())
                .then(Resize::new(2, 2)),
        );

        let output = pipeline.handle_image(sample(6, 4), "digit").expect("handle");
        assert_eq!(output.shape, ImageShape::new(2, 2, 3));

        let saved = saver.saved.lock().expect("saver lock");
        assert_eq!(saved.len(), 1);
        let (name, image) = &saved[0];
        assert_eq!(name, "digit");
        assert_eq!(image.dimensions(), (4, 4));
    }

    #[test]
    fn tensor_stage_receives_concrete_shape_and_can_change_length() {
        #[derive(Debug)]
        struct FirstChannel;

        impl TensorOperation for FirstChannel {
            fn name(&self) -> &'static str {
                "first_channel"
            }

            fn apply(&self, data: Vec<f32>, shape: ImageShape) -> Result<Vec<f32>> {
                Ok(data
                    .chunks_exact(shape.channels as usize)
                    .map(|pixel| pixel[0])
                    .collect())
            }
        }

        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Rgb))
            .transform_image(ImageStage::new().then(Resize::new(3, 3)))
            .transform_tensor(TensorStage::new().then(Rescaling::new(1.0)).then(FirstChannel));

        let output = pipeline.handle_image(sample(9, 9), "reduce").expect("handle");
        assert_eq!(output.shape, ImageShape::new(3, 3, 3));
        assert_eq!(output.data.len(), 9);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let pipeline = Preprocessing::new(Loading::new("img.png", ColorMode::Rgb))
            .transform_image(ImageStage::new().then(Rotate::new(30.0)).then(Resize::new(8, 8)))
            .transform_tensor(TensorStage::new().then(Rescaling::default()).then(ChannelsFirst));

        let first = pipeline.handle_image(sample(20, 12), "same").expect("first");
        let second = pipeline.handle_image(sample(20, 12), "same").expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn settings_without_save_dir_reject_save_requests() {
        let settings = PipelineSettings {
            load: LoadSettings::default(),
            image_ops: vec![ImageOpSettings::Rotate {
                degrees: 90.0,
                save: true,
            }],
            tensor_ops: vec![],
            save_dir: None,
        };
        let err = Preprocessing::try_from(&settings).expect_err("missing save_dir");
        assert!(err.to_string().contains("save_dir"));
    }

    #[test]
    fn settings_build_full_pipeline() {
        let settings = PipelineSettings {
            load: LoadSettings {
                color_mode: ColorMode::Grayscale,
                ..LoadSettings::default()
            },
            image_ops: vec![ImageOpSettings::Resize {
                width: 28,
                height: 28,
                filter: Default::default(),
                save: true,
            }],
            tensor_ops: vec![TensorOpSettings::Rescaling { scale: 255.0 }],
            save_dir: Some(PathBuf::from("intermediate")),
        };
        let pipeline = Preprocessing::try_from(&settings).expect("build");

        assert_eq!(pipeline.final_shape(), Ok(ImageShape::new(28, 28, 1)));
        assert_eq!(pipeline.image_stage().len(), 1);
        assert!(pipeline.image_stage().steps()[0].save_sink().is_some());
        assert_eq!(pipeline.tensor_stage().len(), 1);
    }

    #[test]
    fn every_saving_step_keeps_its_own_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let save_dir = dir.path().join("stages");
        let settings = PipelineSettings {
            load: LoadSettings::default(),
            image_ops: vec![
                ImageOpSettings::Crop {
                    top: 0,
                    bottom: 0,
                    left: 10,
                    right: 10,
                    save: true,
                },
                ImageOpSettings::Resize {
                    width: 8,
                    height: 8,
                    filter: Default::default(),
                    save: true,
                },
            ],
            tensor_ops: vec![],
            save_dir: Some(save_dir.clone()),
        };
        let pipeline = Preprocessing::try_from(&settings).expect("build");
        pipeline.handle_image(sample(40, 30), "cat").expect("handle");

        let after_crop = image::open(step_save_dir(&save_dir, 0, "crop").join("cat.png"))
            .expect("crop snapshot");
        assert_eq!(after_crop.dimensions(), (20, 30));
        let after_resize = image::open(step_save_dir(&save_dir, 1, "resize").join("cat.png"))
            .expect("resize snapshot");
        assert_eq!(after_resize.dimensions(), (8, 8));
    }
}
