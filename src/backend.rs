// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Backend provider chain.
//!
//! A loaded model is offered to each [`Provider`] in priority order; the first
//! one whose probe accepts it becomes the [`Backend`] for the lifetime of the
//! detector. The decision, including the output format, is never revisited
//! per request.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::{InferenceError, Result};
use crate::model::InferenceSession;
use crate::postprocessing::OutputFormat;

/// Detection capability providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Ultralytics detection export: the model's own head, class names and canvas
    /// size drive decoding, with overlap suppression.
    Native,
    /// Any single-input model. Only `[N, 6+]` detection rows are decoded; other
    /// outputs, detection heads included, yield no detections.
    RawTensor,
}

impl Provider {
    /// Providers in the order they are tried by default.
    #[must_use]
    pub fn default_order() -> Vec<Self> {
        vec![Self::Native, Self::RawTensor]
    }

    /// Check whether this provider can serve `session`.
    ///
    /// Returns the output format the provider will decode with, or the reason
    /// it declined.
    pub fn probe(self, session: &dyn InferenceSession) -> std::result::Result<OutputFormat, String> {
        let shapes = session.output_shapes();
        match self {
            Self::Native => {
                let metadata = session.metadata();
                if !metadata.is_detect() {
                    return Err(format!("model task is '{}', not 'detect'", metadata.task));
                }
                if metadata.names.is_empty() {
                    return Err("model carries no class names".to_string());
                }
                match OutputFormat::resolve(shapes.get(..1).unwrap_or_default()) {
                    OutputFormat::YoloHead => Ok(OutputFormat::YoloHead),
                    other => Err(format!("first output is {other}, not a detection head")),
                }
            }
            Self::RawTensor => {
                if session.input_count() != 1 {
                    return Err(format!(
                        "expected one input, model has {}",
                        session.input_count()
                    ));
                }
                if shapes.is_empty() {
                    return Err("model has no outputs".to_string());
                }
                // Only rows are decoded here; detection heads belong to the native path.
                match OutputFormat::resolve(&shapes) {
                    OutputFormat::Rows => Ok(OutputFormat::Rows),
                    _ => Ok(OutputFormat::Unrecognized),
                }
            }
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::RawTensor => write!(f, "raw-tensor"),
        }
    }
}

impl FromStr for Provider {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "native" | "ultralytics" => Ok(Self::Native),
            "raw" | "raw-tensor" | "onnx" => Ok(Self::RawTensor),
            _ => Err(InferenceError::Config(format!(
                "Unknown backend '{s}'. Expected 'native' or 'raw'"
            ))),
        }
    }
}

/// The provider chosen for a model, fixed once selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    provider: Provider,
    format: OutputFormat,
}

impl Backend {
    /// Try `providers` in order against `session`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelUnavailable`] listing every refusal when
    /// no provider accepts the model.
    pub fn select(session: &dyn InferenceSession, providers: &[Provider]) -> Result<Self> {
        let mut refusals = Vec::new();
        for &provider in providers {
            match provider.probe(session) {
                Ok(format) => {
                    if format == OutputFormat::Unrecognized {
                        warn!(
                            %provider,
                            shapes = ?session.output_shapes(),
                            "output format not recognized, detections will be empty"
                        );
                    }
                    info!(%provider, %format, "selected backend");
                    return Ok(Self { provider, format });
                }
                Err(reason) => {
                    debug!(%provider, %reason, "provider declined model");
                    refusals.push(format!("{provider}: {reason}"));
                }
            }
        }
        Err(InferenceError::ModelUnavailable(format!(
            "no backend provider accepted the model ({})",
            refusals.join("; ")
        )))
    }

    /// Selected provider.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    /// Output format decoded by this backend.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ModelMetadata;
    use crate::postprocessing::RawOutput;
    use ndarray::Array4;

    struct Stub {
        inputs: usize,
        shapes: Vec<Vec<Option<usize>>>,
        metadata: ModelMetadata,
    }

    impl InferenceSession for Stub {
        fn run(&mut self, _input: &Array4<f32>) -> Result<Vec<RawOutput>> {
            Ok(Vec::new())
        }
        fn input_count(&self) -> usize {
            self.inputs
        }
        fn output_shapes(&self) -> Vec<Vec<Option<usize>>> {
            self.shapes.clone()
        }
        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }
    }

    fn detect_metadata() -> ModelMetadata {
        ModelMetadata::from_yaml_str("task: detect\nnames: {0: 'bottle', 1: 'can'}").unwrap()
    }

    #[test]
    fn test_native_preferred_for_ultralytics_export() {
        let stub = Stub {
            inputs: 1,
            shapes: vec![vec![Some(1), Some(6), Some(3549)]],
            metadata: detect_metadata(),
        };
        let backend = Backend::select(&stub, &Provider::default_order()).unwrap();
        assert_eq!(backend.provider(), Provider::Native);
        assert_eq!(backend.format(), OutputFormat::YoloHead);
    }

    #[test]
    fn test_fallback_to_raw_tensor() {
        let stub = Stub {
            inputs: 1,
            shapes: vec![vec![None, Some(6)]],
            metadata: ModelMetadata::default(),
        };
        let backend = Backend::select(&stub, &Provider::default_order()).unwrap();
        assert_eq!(backend.provider(), Provider::RawTensor);
        assert_eq!(backend.format(), OutputFormat::Rows);
    }

    #[test]
    fn test_raw_tensor_accepts_unrecognized_output() {
        let stub = Stub {
            inputs: 1,
            shapes: vec![vec![Some(1), Some(2), Some(3), Some(4)]],
            metadata: ModelMetadata::default(),
        };
        let backend = Backend::select(&stub, &[Provider::RawTensor]).unwrap();
        assert_eq!(backend.format(), OutputFormat::Unrecognized);
    }

    #[test]
    fn test_raw_tensor_does_not_decode_heads() {
        let stub = Stub {
            inputs: 1,
            shapes: vec![vec![Some(1), Some(84), Some(8400)]],
            metadata: ModelMetadata::default(),
        };
        let backend = Backend::select(&stub, &Provider::default_order()).unwrap();
        assert_eq!(backend.provider(), Provider::RawTensor);
        assert_eq!(backend.format(), OutputFormat::Unrecognized);
    }

    #[test]
    fn test_native_accepts_small_head() {
        let stub = Stub {
            inputs: 1,
            shapes: vec![vec![Some(1), Some(6), Some(2)]],
            metadata: detect_metadata(),
        };
        let backend = Backend::select(&stub, &Provider::default_order()).unwrap();
        assert_eq!(backend.provider(), Provider::Native);
        assert_eq!(backend.format(), OutputFormat::YoloHead);
    }

    #[test]
    fn test_no_provider_is_model_unavailable() {
        let stub = Stub {
            inputs: 2,
            shapes: vec![vec![None, Some(6)]],
            metadata: ModelMetadata::default(),
        };
        let err = Backend::select(&stub, &Provider::default_order()).unwrap_err();
        assert!(matches!(err, InferenceError::ModelUnavailable(_)));
        assert!(err.to_string().contains("native"));
        assert!(err.to_string().contains("raw-tensor"));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("native".parse::<Provider>().unwrap(), Provider::Native);
        assert_eq!("raw".parse::<Provider>().unwrap(), Provider::RawTensor);
        assert!("tensorrt".parse::<Provider>().is_err());
    }
}
