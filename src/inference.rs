// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference configuration and common types.
//!
//! This module defines the [`InferenceConfig`] struct, which controls the confidence
//! threshold, canvas size, detection cap and coordinate interpretation used by the
//! detection pipeline, plus the backend provider order tried when a model is loaded.

use std::fmt;
use std::str::FromStr;

use crate::backend::Provider;
use crate::error::{InferenceError, Result};

/// Default confidence threshold, matching the HTTP API default.
pub const DEFAULT_CONFIDENCE: f32 = 0.35;

/// Default canvas side for models that carry no size metadata.
pub const DEFAULT_IMGSZ: usize = 416;

/// How raw-tensor models express box coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSpace {
    /// Coordinates are absolute canvas pixels.
    #[default]
    Absolute,
    /// Coordinates are fractions of the canvas side (0..1).
    Normalized,
}

impl fmt::Display for CoordinateSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Normalized => write!(f, "normalized"),
        }
    }
}

impl FromStr for CoordinateSpace {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "absolute" | "pixels" | "abs" => Ok(Self::Absolute),
            "normalized" | "norm" | "relative" => Ok(Self::Normalized),
            _ => Err(InferenceError::Config(format!(
                "Unknown coordinate space '{s}'. Expected 'absolute' or 'normalized'"
            ))),
        }
    }
}

/// Configuration for the detection pipeline.
///
/// Uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use garbage_detect::{CoordinateSpace, InferenceConfig};
///
/// let config = InferenceConfig::new()
///     .with_confidence(0.5)
///     .with_max_detections(100)
///     .with_imgsz(640)
///     .with_coordinate_space(CoordinateSpace::Normalized);
/// ```
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Confidence threshold for detections (0.0 to 1.0).
    /// Detections with confidence scores lower than this value are discarded.
    pub confidence_threshold: f32,
    /// `IoU` threshold for the native path's per-class NMS (0.0 to 1.0).
    pub iou_threshold: f32,
    /// Maximum number of detections to return per image.
    /// Extra detections are dropped from the end of the emitted sequence.
    pub max_detections: usize,
    /// Canvas side length used for letterboxing.
    /// If `None`, the model's metadata decides, falling back to [`DEFAULT_IMGSZ`].
    pub imgsz: Option<usize>,
    /// Coordinate interpretation for raw-tensor outputs.
    pub coordinate_space: CoordinateSpace,
    /// Raw coordinates beyond `factor * canvas` (or below `-factor * canvas`)
    /// abort the request. `None` disables the check.
    pub sanity_factor: Option<f32>,
    /// Number of intra-op threads for ONNX Runtime.
    /// Setting this to `0` lets ONNX Runtime choose.
    pub num_threads: usize,
    /// Backend providers, tried in order when a model is loaded.
    pub providers: Vec<Provider>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: 0.45,
            max_detections: 300,
            imgsz: None,
            coordinate_space: CoordinateSpace::Absolute,
            sanity_factor: Some(2.0),
            num_threads: 0,
            providers: Provider::default_order(),
        }
    }
}

impl InferenceConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    ///
    /// Detections with a confidence score below this threshold are filtered out.
    ///
    /// # Arguments
    ///
    /// * `threshold` - The minimum confidence score (0.0 to 1.0).
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the `IoU` threshold for Non-Maximum Suppression on the native path.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the maximum number of detections to return.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Set the letterbox canvas side length.
    #[must_use]
    pub const fn with_imgsz(mut self, size: usize) -> Self {
        self.imgsz = Some(size);
        self
    }

    /// Declare how raw-tensor models express coordinates.
    #[must_use]
    pub const fn with_coordinate_space(mut self, space: CoordinateSpace) -> Self {
        self.coordinate_space = space;
        self
    }

    /// Set (or disable with `None`) the canvas sanity factor.
    #[must_use]
    pub const fn with_sanity_factor(mut self, factor: Option<f32>) -> Self {
        self.sanity_factor = factor;
        self
    }

    /// Set the number of threads for inference.
    ///
    /// # Arguments
    ///
    /// * `threads` - The number of intra-op threads. Set to `0` for auto-configuration.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Set the backend providers to try, in priority order.
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<Provider>) -> Self {
        self.providers = providers;
        self
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(InferenceError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(InferenceError::Config(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.max_detections == 0 {
            return Err(InferenceError::Config(
                "max_detections must be at least 1".to_string(),
            ));
        }
        if self.imgsz == Some(0) {
            return Err(InferenceError::Config("imgsz must be positive".to_string()));
        }
        if let Some(factor) = self.sanity_factor
            && !(factor.is_finite() && factor >= 1.0)
        {
            return Err(InferenceError::Config(format!(
                "sanity_factor must be a finite value >= 1, got {factor}"
            )));
        }
        if self.providers.is_empty() {
            return Err(InferenceError::Config(
                "at least one backend provider is required".to_string(),
            ));
        }
        Ok(())
    }
}
