// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the detection pipeline.

use std::fmt;

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the detection pipeline.
#[derive(Debug)]
pub enum InferenceError {
    /// Degenerate or unreadable image, or an argument outside its valid range.
    InvalidInput(String),
    /// No inference backend could be initialised for the requested model.
    ModelUnavailable(String),
    /// Raw model output that no registered decoder understands.
    ///
    /// The decoder reports this through logging and yields zero detections;
    /// the variant exists so callers can describe the condition.
    UnrecognizedOutputFormat(String),
    /// Capture device failed to open or read.
    Device(String),
    /// Error loading the ONNX model.
    ModelLoad(String),
    /// Error during model inference.
    Inference(String),
    /// Error processing images.
    Image(String),
    /// Invalid configuration provided.
    Config(String),
    /// Error parsing model metadata.
    Metadata(String),
    /// Raw coordinates far outside the inference canvas.
    CoordinateSanity(String),
    /// Visualizer error.
    Visualizer(String),
    /// Feature not enabled.
    FeatureNotEnabled(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
}

impl InferenceError {
    /// Whether this error belongs to a request or session boundary
    /// (missing model, bad upload, device failure) rather than to the pipeline internals.
    #[must_use]
    pub const fn is_boundary(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::ModelUnavailable(_) | Self::Device(_)
        )
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Self::ModelUnavailable(msg) => write!(f, "Model unavailable: {msg}"),
            Self::UnrecognizedOutputFormat(msg) => write!(f, "Unrecognized output format: {msg}"),
            Self::Device(msg) => write!(f, "Device error: {msg}"),
            Self::ModelLoad(msg) => write!(f, "Model load error: {msg}"),
            Self::Inference(msg) => write!(f, "Inference error: {msg}"),
            Self::Image(msg) => write!(f, "Image error: {msg}"),
            Self::Config(msg) => write!(f, "Config error: {msg}"),
            Self::Metadata(msg) => write!(f, "Metadata error: {msg}"),
            Self::CoordinateSanity(msg) => write!(f, "Coordinate sanity check failed: {msg}"),
            Self::Visualizer(msg) => write!(f, "Visualizer error: {msg}"),
            Self::FeatureNotEnabled(msg) => write!(f, "Feature not enabled: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(_) | image::ImageError::Unsupported(_) => {
                Self::InvalidInput(err.to_string())
            }
            _ => Self::Image(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferenceError::ModelUnavailable("no provider accepted model.onnx".to_string());
        assert_eq!(
            err.to_string(),
            "Model unavailable: no provider accepted model.onnx"
        );

        let err = InferenceError::InvalidInput("image has zero width".to_string());
        assert_eq!(err.to_string(), "Invalid input: image has zero width");

        let err = InferenceError::Device("cannot open /dev/video0".to_string());
        assert_eq!(err.to_string(), "Device error: cannot open /dev/video0");
    }

    #[test]
    fn test_boundary_classification() {
        assert!(InferenceError::InvalidInput(String::new()).is_boundary());
        assert!(InferenceError::ModelUnavailable(String::new()).is_boundary());
        assert!(InferenceError::Device(String::new()).is_boundary());
        assert!(!InferenceError::UnrecognizedOutputFormat(String::new()).is_boundary());
        assert!(!InferenceError::Inference(String::new()).is_boundary());
    }

    #[test]
    fn test_decode_error_is_invalid_input() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        assert!(matches!(
            InferenceError::from(err),
            InferenceError::InvalidInput(_)
        ));
    }
}
