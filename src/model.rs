// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference sessions.
//!
//! [`InferenceSession`] is the seam between the detection pipeline and whatever
//! runs the network: given a preprocessed tensor it returns raw output buffers.
//! [`OnnxSession`] implements it on top of ONNX Runtime.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::Array4;
#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{TensorRef, ValueType};
use tracing::debug;

use crate::error::{InferenceError, Result};
use crate::metadata::{METADATA_KEYS, ModelMetadata};
use crate::postprocessing::RawOutput;

/// Anything that turns an NCHW tensor into raw output buffers.
pub trait InferenceSession: Send {
    /// Run the network on a `(1, 3, S, S)` tensor.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Inference`] if the runtime fails.
    fn run(&mut self, input: &Array4<f32>) -> Result<Vec<RawOutput>>;

    /// Number of model inputs.
    fn input_count(&self) -> usize;

    /// Declared output shapes; dynamic dimensions are `None`.
    fn output_shapes(&self) -> Vec<Vec<Option<usize>>>;

    /// Metadata embedded in the model (defaults when absent).
    fn metadata(&self) -> &ModelMetadata;
}

/// ONNX Runtime backed session.
pub struct OnnxSession {
    session: Session,
    metadata: ModelMetadata,
    input_name: String,
    output_names: Vec<String>,
    output_shapes: Vec<Vec<Option<usize>>>,
    path: PathBuf,
}

impl OnnxSession {
    /// Load an ONNX model.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the `.onnx` file.
    /// * `num_threads` - Intra-op threads, `0` lets the runtime decide.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoad`] if the file is missing or the
    /// runtime rejects it.
    pub fn load<P: AsRef<Path>>(path: P, num_threads: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InferenceError::ModelLoad(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        #[allow(unused_mut)]
        let mut builder = Session::builder().map_err(|e| {
            InferenceError::ModelLoad(format!("Failed to create session builder: {e}"))
        })?;

        #[cfg(feature = "coreml")]
        {
            builder = builder
                .with_execution_providers([CoreMLExecutionProvider::default().build()])
                .map_err(|e| InferenceError::ModelLoad(format!("Failed to register CoreML EP: {e}")))?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(num_threads)
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to set intra-thread count: {e}")))?
            .commit_from_file(path)
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to load model: {e}")))?;

        let metadata = read_metadata(&session)?;
        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        let output_shapes = session
            .outputs
            .iter()
            .map(|o| declared_shape(&o.output_type))
            .collect();

        debug!(
            path = %path.display(),
            task = %metadata.task,
            classes = metadata.num_classes(),
            ?output_shapes,
            "loaded ONNX model"
        );

        Ok(Self {
            session,
            metadata,
            input_name,
            output_names,
            output_shapes,
            path: path.to_path_buf(),
        })
    }

    /// Path the model was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InferenceSession for OnnxSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<Vec<RawOutput>> {
        let input = input.as_standard_layout();
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| InferenceError::Inference(format!("Failed to create input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| InferenceError::Inference(format!("Inference failed: {e}")))?;

        self.output_names
            .iter()
            .map(|name| {
                let value = outputs.get(name.as_str()).ok_or_else(|| {
                    InferenceError::Inference(format!("Output '{name}' not found"))
                })?;
                let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
                    InferenceError::Inference(format!("Failed to extract output '{name}': {e}"))
                })?;
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let shape = shape.iter().map(|&d| d.max(0) as usize).collect();
                Ok(RawOutput::new(data.to_vec(), shape))
            })
            .collect()
    }

    fn input_count(&self) -> usize {
        self.session.inputs.len()
    }

    fn output_shapes(&self) -> Vec<Vec<Option<usize>>> {
        self.output_shapes.clone()
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl fmt::Debug for OnnxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxSession")
            .field("path", &self.path)
            .field("task", &self.metadata.task)
            .field("num_classes", &self.metadata.num_classes())
            .field("output_shapes", &self.output_shapes)
            .finish_non_exhaustive()
    }
}

/// Read the Ultralytics metadata properties of a session.
fn read_metadata(session: &Session) -> Result<ModelMetadata> {
    let model_metadata = session
        .metadata()
        .map_err(|e| InferenceError::ModelLoad(format!("Failed to get model metadata: {e}")))?;

    let mut properties = HashMap::new();
    for key in METADATA_KEYS.iter().chain(&["metadata", "model_metadata"]) {
        if let Ok(Some(value)) = model_metadata.custom(key) {
            properties.insert((*key).to_string(), value);
        }
    }

    if properties.is_empty() {
        return Ok(ModelMetadata::default());
    }
    ModelMetadata::from_properties(&properties)
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn declared_shape(value_type: &ValueType) -> Vec<Option<usize>> {
    match value_type {
        ValueType::Tensor { shape, .. } => shape
            .iter()
            .map(|&d| (d > 0).then_some(d as usize))
            .collect(),
        _ => Vec::new(),
    }
}
