use std::sync::Arc;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use imgprep_core::{
    ChannelsFirst, Crop, DirectorySaver, ImageShape, ImageStage, Loading, PipelineError,
    Preprocessing, Rescaling, Resize, Rotate, TensorStage, step_save_dir,
};
use imgprep_utils::{AppSettings, ColorMode};
use tempfile::tempdir;

fn write_sample(path: &std::path::Path, width: u32, height: u32) {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3) as u8, (y * 3) as u8, ((x + y) * 2) as u8])
    })
    .save(path)
    .expect("write sample image");
}

#[test]
fn run_on_single_file_produces_planned_shape() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("seven.png");
    write_sample(&input, 64, 48);

    let pipeline = Preprocessing::new(Loading::new(&input, ColorMode::Grayscale))
        .transform_image(ImageStage::new().then(Resize::new(28, 28)))
        .transform_tensor(TensorStage::new().then(Rescaling::new(255.0)));

    let planned = pipeline.final_shape().expect("resize fixes the shape");
    assert_eq!(planned, ImageShape::new(28, 28, 1));

    let output = pipeline.run().expect("run");
    assert_eq!(output.shape, planned);
    assert_eq!(output.data.len(), 28 * 28);
    assert!(output.data.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn resize_plan_is_independent_of_input_size() {
    let dir = tempdir().expect("tempdir");
    for (index, (w, h)) in [(10, 10), (300, 20), (28, 28)].into_iter().enumerate() {
        let input = dir.path().join(format!("input_{index}.png"));
        write_sample(&input, w, h);

        let pipeline = Preprocessing::new(Loading::new(&input, ColorMode::Grayscale))
            .transform_image(ImageStage::new().then(Resize::new(28, 28)));
        assert_eq!(pipeline.final_shape(), Ok(ImageShape::new(28, 28, 1)));
        assert_eq!(pipeline.run().expect("run").shape, ImageShape::new(28, 28, 1));
    }
}

#[test]
fn run_against_directory_is_invalid_target() {
    let dir = tempdir().expect("tempdir");
    write_sample(&dir.path().join("a.png"), 4, 4);

    let pipeline = Preprocessing::new(Loading::new(dir.path(), ColorMode::Rgb));
    let err = pipeline.run().expect_err("directory target must fail");
    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::InvalidTarget {
            path: dir.path().to_path_buf()
        })
    );
}

#[test]
fn directory_saver_captures_state_after_its_operation() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("cat.png");
    write_sample(&input, 40, 30);
    let save_dir = dir.path().join("after_crop");

    let pipeline = Preprocessing::new(Loading::new(&input, ColorMode::Rgb)).transform_image(
        ImageStage::new()
            .then_saved(Crop::new(5, 5, 10, 10), Arc::new(DirectorySaver::new(&save_dir)))
            .then(Resize::new(8, 8)),
    );
    let output = pipeline.run().expect("run");
    assert_eq!(output.shape, ImageShape::new(8, 8, 3));

    let saved: Vec<_> = std::fs::read_dir(&save_dir)
        .expect("save dir exists")
        .filter_map(Result::ok)
        .collect();
    assert_eq!(saved.len(), 1);
    let snapshot = image::open(save_dir.join("cat.png")).expect("snapshot");
    assert_eq!(snapshot.dimensions(), (20, 20));
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("repeat.png");
    write_sample(&input, 50, 50);

    let pipeline = Preprocessing::new(Loading::new(&input, ColorMode::Bgr))
        .transform_image(ImageStage::new().then(Rotate::new(45.0)).then(Resize::new(16, 16)))
        .transform_tensor(TensorStage::new().then(Rescaling::default()).then(ChannelsFirst));

    let first = pipeline.run().expect("first run");
    let second = pipeline.run().expect("second run");
    assert_eq!(first, second);

    let image = image::open(&input).expect("reload");
    let in_memory = pipeline
        .handle_image(DynamicImage::ImageRgb8(image.to_rgb8()), "repeat")
        .expect("in-memory run");
    assert_eq!(in_memory, first);
}

#[test]
fn json_settings_drive_the_pipeline() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("digit.png");
    write_sample(&input, 32, 32);
    let save_dir = dir.path().join("stages");

    let json = format!(
        r#"{{
            "pipeline": {{
                "load": {{ "path": {input:?}, "color_mode": "grayscale" }},
                "image_ops": [
                    {{ "op": "crop", "top": 2, "bottom": 2, "left": 2, "right": 2, "save": true }},
                    {{ "op": "resize", "width": 28, "height": 28 }}
                ],
                "tensor_ops": [ {{ "op": "rescaling", "scale": 255.0 }} ],
                "save_dir": {save_dir:?}
            }}
        }}"#
    );
    let settings_path = dir.path().join("settings.json");
    std::fs::write(&settings_path, json).expect("write settings");

    let settings = AppSettings::load_from_path(&settings_path).expect("load settings");
    let pipeline = Preprocessing::try_from(&settings.pipeline).expect("build pipeline");
    let output = pipeline.run().expect("run");

    assert_eq!(output.shape, ImageShape::new(28, 28, 1));
    assert!(step_save_dir(&save_dir, 0, "crop").join("digit.png").exists());
    assert!(!step_save_dir(&save_dir, 1, "resize").exists());
}
