use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A pretrained ONNX graph prepared for repeated execution.
#[derive(Debug)]
pub struct OnnxModel {
    runnable: RunnableModel,
    path: PathBuf,
}

impl OnnxModel {
    /// Load the graph at `model_path`.
    ///
    /// The fully optimized plan is preferred; graphs that tract cannot optimize fall back to
    /// the decluttered typed plan.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable_model(path, true) {
            Ok(model) => {
                debug!("ONNX model {} optimized successfully", path.display());
                model
            }
            Err(opt_err) => {
                let mut chain = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain, "  - {cause}");
                }
                warn!(
                    "ONNX model {} failed optimized load; falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    chain.trim_end()
                );
                load_runnable_model(path, false).with_context(|| {
                    format!("fallback to decluttered graph failed after optimize error: {opt_err}")
                })?
            }
        };

        Ok(Self {
            runnable,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute the model on `data` laid out with `dims` and return its first output flattened.
    pub fn run(&self, data: &[f32], dims: &[usize]) -> Result<Vec<f32>> {
        let expected: usize = dims.iter().product();
        anyhow::ensure!(
            expected == data.len(),
            "input buffer holds {} values but dims {:?} need {}",
            data.len(),
            dims,
            expected
        );

        let input = Tensor::from_shape(dims, data)
            .map_err(|e| anyhow::anyhow!("failed to build input tensor: {e}"))?;
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("model execution failed: {e}"))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?
            .into_tensor();
        let values = output
            .as_slice::<f32>()
            .map_err(|e| anyhow::anyhow!("model output is not f32: {e}"))?;
        Ok(values.to_vec())
    }
}

fn load_runnable_model(path: &Path, optimized: bool) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    }
}
