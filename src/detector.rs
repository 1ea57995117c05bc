// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! The detection facade.
//!
//! A [`Detector`] owns an inference session and the backend chosen for it at
//! load time. Every caller (CLI, server, capture loop, benchmark) goes through
//! [`Detector::predict`].
//!
//! Two paths exist:
//!
//! | Path | Steps | Used when |
//! |------|-------|-----------|
//! | native | letterbox → run → head decode → remap → NMS → cap | [`Provider::Native`] |
//! | raw tensor | letterbox → run → registry decode → canvas check → remap → cap | [`Provider::RawTensor`] |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::DynamicImage;
use ndarray::Array4;
use tracing::debug;

use crate::backend::{Backend, Provider};
use crate::error::{InferenceError, Result};
use crate::inference::{DEFAULT_IMGSZ, InferenceConfig};
use crate::metadata::ModelMetadata;
use crate::model::{InferenceSession, OnnxSession};
use crate::postprocessing::{DecoderRegistry, OutputFormat, RawOutput, YoloHeadDecoder};
use crate::preprocessing::{LetterboxParams, letterbox};
use crate::remap::{check_canvas_bounds, remap_detections, to_canvas_space};
use crate::results::{Detection, Prediction, Speed};
use crate::utils::nms_per_class;

/// Object detector bound to one model for its whole lifetime.
///
/// # Example
///
/// ```no_run
/// use garbage_detect::{Detector, InferenceConfig};
///
/// let mut detector = Detector::load("models/best.onnx", InferenceConfig::default())?;
/// let image = image::open("bin.jpg")?;
/// let prediction = detector.predict(&image)?;
/// println!("{}", prediction.class_counts.summary());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Detector {
    session: Box<dyn InferenceSession>,
    backend: Backend,
    registry: DecoderRegistry,
    config: InferenceConfig,
    names: HashMap<usize, String>,
    model_path: Option<PathBuf>,
}

impl Detector {
    /// Load an ONNX model and select its backend.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelUnavailable`] if the file is missing, cannot
    /// be loaded, or no provider accepts it, and [`InferenceError::Config`] for an
    /// invalid configuration.
    pub fn load<P: AsRef<Path>>(path: P, config: InferenceConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        let session = OnnxSession::load(path, config.num_threads).map_err(|e| match e {
            InferenceError::ModelLoad(msg) => InferenceError::ModelUnavailable(msg),
            other => other,
        })?;
        let mut detector = Self::from_session(Box::new(session), config)?;
        detector.model_path = Some(path.to_path_buf());
        Ok(detector)
    }

    /// Wrap an existing session.
    ///
    /// # Errors
    ///
    /// Same as [`Detector::load`], minus file errors.
    pub fn from_session(session: Box<dyn InferenceSession>, config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        let backend = Backend::select(session.as_ref(), &config.providers)?;
        let names = session.metadata().names.clone();

        let mut registry = DecoderRegistry::default();
        if !names.is_empty() {
            registry.register(
                OutputFormat::YoloHead,
                Box::new(YoloHeadDecoder::with_classes(names.len())),
            );
        }

        Ok(Self {
            session,
            backend,
            registry,
            config,
            names,
            model_path: None,
        })
    }

    /// Replace the class-name mapping (for models without embedded names).
    #[must_use]
    pub fn with_names(mut self, names: HashMap<usize, String>) -> Self {
        self.names = names;
        self
    }

    /// Provider selected at load time.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.backend.provider()
    }

    /// Output format resolved at load time.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.backend.format()
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Class-id to name mapping.
    #[must_use]
    pub const fn names(&self) -> &HashMap<usize, String> {
        &self.names
    }

    /// Embedded model metadata.
    #[must_use]
    pub fn metadata(&self) -> &ModelMetadata {
        self.session.metadata()
    }

    /// Path the model was loaded from, if it came from a file.
    #[must_use]
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Canvas side used when the caller does not pick one.
    #[must_use]
    pub fn canvas_size(&self) -> usize {
        self.config
            .imgsz
            .or_else(|| self.session.metadata().canvas_size())
            .unwrap_or(DEFAULT_IMGSZ)
    }

    /// Run one zero tensor through the session.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub fn warmup(&mut self) -> Result<()> {
        let size = self.canvas_size();
        self.run(&Array4::zeros((1, 3, size, size))).map(|_| ())
    }

    /// Run the session on a preprocessed tensor and return its raw buffers.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub fn run(&mut self, tensor: &Array4<f32>) -> Result<Vec<RawOutput>> {
        self.session.run(tensor)
    }

    /// Detect with the configured threshold, canvas and cap.
    ///
    /// # Errors
    ///
    /// See [`Detector::predict_with`].
    pub fn predict(&mut self, image: &DynamicImage) -> Result<Prediction> {
        let confidence = self.config.confidence_threshold;
        let max_detections = self.config.max_detections;
        let size = self.canvas_size();
        self.predict_with(image, confidence, size, max_detections)
    }

    /// Detect with explicit per-call settings.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidInput`] for a degenerate image, an
    /// out-of-range confidence or a zero canvas/cap, session errors from the
    /// model, and [`InferenceError::CoordinateSanity`] when raw coordinates do
    /// not fit the canvas.
    pub fn predict_with(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        image_size: usize,
        max_detections: usize,
    ) -> Result<Prediction> {
        check_request(confidence, image_size)?;
        if max_detections == 0 {
            return Err(InferenceError::InvalidInput(
                "max_det must be at least 1".to_string(),
            ));
        }
        let target = canvas_side(image_size)?;

        let start = Instant::now();
        let boxed = letterbox(image, target)?;
        let tensor = boxed.to_tensor();
        let preprocess = elapsed_ms(start);

        let start = Instant::now();
        let outputs = self.session.run(&tensor)?;
        let inference = elapsed_ms(start);

        let start = Instant::now();
        let mut detections = match self.backend.provider() {
            Provider::Native => self.decode_native(&outputs, &boxed.params, confidence),
            Provider::RawTensor => self.decode_raw(&outputs, &boxed.params, confidence)?,
        };
        detections.truncate(max_detections);
        let postprocess = elapsed_ms(start);

        debug!(
            provider = %self.backend.provider(),
            detections = detections.len(),
            preprocess,
            inference,
            postprocess,
            "prediction done"
        );

        let mut prediction = Prediction::new(detections, image.width(), image.height(), target);
        prediction.speed = Speed::new(preprocess, inference, postprocess);
        Ok(prediction)
    }

    /// Native path: detections already in original-image space, highest
    /// confidence first.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelUnavailable`] when the selected backend is
    /// not native, otherwise as [`Detector::predict_with`].
    pub fn run_native(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        image_size: usize,
    ) -> Result<Vec<Detection>> {
        if self.backend.provider() != Provider::Native {
            return Err(InferenceError::ModelUnavailable(format!(
                "native detection path unavailable, backend is {}",
                self.backend.provider()
            )));
        }
        let max_detections = self.config.max_detections;
        self.predict_with(image, confidence, image_size, max_detections)
            .map(|p| p.detections)
    }

    /// Raw-tensor path: letterbox, run, decode with the resolved format, remap.
    ///
    /// Detections keep decoder emission order; no overlap suppression is applied.
    ///
    /// # Errors
    ///
    /// As [`Detector::predict_with`].
    pub fn detect_raw(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        image_size: usize,
    ) -> Result<Vec<Detection>> {
        check_request(confidence, image_size)?;
        let boxed = letterbox(image, canvas_side(image_size)?)?;
        let outputs = self.session.run(&boxed.to_tensor())?;
        let mut detections = self.decode_raw(&outputs, &boxed.params, confidence)?;
        detections.truncate(self.config.max_detections);
        Ok(detections)
    }

    fn decode_native(
        &self,
        outputs: &[RawOutput],
        params: &LetterboxParams,
        confidence: f32,
    ) -> Vec<Detection> {
        let raw = self
            .registry
            .decode(OutputFormat::YoloHead, outputs, confidence);
        let detections = remap_detections(&raw, params, &self.names);

        let candidates: Vec<([f32; 4], f32, usize)> = detections
            .iter()
            .map(|d| (d.xyxy(), d.confidence, d.class_id))
            .collect();
        nms_per_class(&candidates, self.config.iou_threshold)
            .into_iter()
            .map(|i| detections[i].clone())
            .collect()
    }

    fn decode_raw(
        &self,
        outputs: &[RawOutput],
        params: &LetterboxParams,
        confidence: f32,
    ) -> Result<Vec<Detection>> {
        let raw = self
            .registry
            .decode(self.backend.format(), outputs, confidence);
        let raw = to_canvas_space(raw, self.config.coordinate_space, params.target_size);
        if let Some(factor) = self.config.sanity_factor {
            check_canvas_bounds(&raw, params.target_size, factor)?;
        }
        Ok(remap_detections(&raw, params, &self.names))
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("backend", &self.backend)
            .field("model_path", &self.model_path)
            .field("num_classes", &self.names.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn check_request(confidence: f32, image_size: usize) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(InferenceError::InvalidInput(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    if image_size == 0 {
        return Err(InferenceError::InvalidInput(
            "image size must be positive".to_string(),
        ));
    }
    Ok(())
}

fn canvas_side(image_size: usize) -> Result<u32> {
    u32::try_from(image_size)
        .map_err(|_| InferenceError::InvalidInput(format!("image size {image_size} is too large")))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
