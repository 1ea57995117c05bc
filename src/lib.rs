// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Garbage Detect
//!
//! Garbage detection on ONNX YOLO models: letterboxing, output decoding,
//! coordinate remapping and rendering, with a CLI, a live capture loop and an
//! HTTP API on top.
//!
//! ## Pipeline
//!
//! ```text
//! image ─► letterbox ─► InferenceSession::run ─► decode ─► remap ─► cap ─► Prediction
//!                                                   │
//!                                      format resolved once at load
//! ```
//!
//! Every image is letterboxed onto a square canvas (aspect ratio kept, padded
//! with gray 114). The model output is decoded by the decoder registered for
//! the format resolved when the model was loaded, and boxes are mapped back to
//! original-image pixels, clamped and capped.
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use garbage_detect::{Annotator, Detector, InferenceConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut detector = Detector::load("models/best.onnx", InferenceConfig::default())?;
//!     let image = image::open("bin.jpg")?;
//!
//!     let prediction = detector.predict(&image)?;
//!     for row in prediction.rows() {
//!         println!("{row}");
//!     }
//!     println!("{}", prediction.class_counts.summary());
//!
//!     let (annotated, _) = Annotator::new().annotate(&image, &prediction.detections);
//!     annotated.save("bin_annotated.png")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! | Provider | Accepts | Decoding |
//! |----------|---------|----------|
//! | `native` | Ultralytics detection exports (`task: detect`, names, YOLO head output) | head decode, per-class NMS |
//! | `raw-tensor` | any single-input model | `[N, 6]` rows only, no NMS; other outputs yield nothing |
//!
//! Providers are tried in order when a model loads and the first one that
//! accepts it is kept.
//!
//! ## CLI Usage
//!
//! ```bash
//! garbage-detect predict -m models/best.onnx -s bin.jpg
//! garbage-detect predict -m models/best.onnx -s photos/ --save
//! garbage-detect webcam -m models/best.onnx -s 0 --show
//! garbage-detect serve -m models/best.onnx --port 8000
//! garbage-detect benchmark -m models/best.onnx -d images/
//! garbage-detect dataset add -s new_photos --split train
//! garbage-detect check -m models/best.onnx
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`detector`] | The detection facade ([`Detector`]) |
//! | [`backend`] | Provider chain ([`Provider`], [`Backend`]) |
//! | [`model`] | Inference sessions ([`InferenceSession`], [`OnnxSession`]) |
//! | [`preprocessing`] | Letterbox transform |
//! | [`postprocessing`] | Output formats and decoders |
//! | [`remap`] | Canvas to original-image coordinates |
//! | [`annotate`] | Box and label rendering ([`Annotator`]) |
//! | [`capture`] | Live capture loop |
//! | [`results`] | Detections, counts and timings |
//! | [`metadata`] | ONNX model metadata parsing |
//! | [`benchmark`] | Throughput measurement |
//! | [`dataset`] | Dataset split helper |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `server` | HTTP API (default) |
//! | `visualize` | Real-time window display |
//! | `video` | Video files, streams and cameras |
//! | `coreml` | Apple `CoreML` execution provider |

// Modules
pub mod annotate;
pub mod backend;
pub mod benchmark;
pub mod capture;
pub mod cli;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod inference;
pub mod metadata;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod remap;
pub mod results;
#[cfg(feature = "server")]
pub mod server;
pub mod source;
pub mod utils;
pub mod visualizer;

// Re-export main types for convenience
pub use annotate::Annotator;
pub use backend::{Backend, Provider};
pub use capture::{CaptureSummary, FrameSink, FrameSource, SessionContext, run_capture};
pub use detector::Detector;
pub use error::{InferenceError, Result};
pub use inference::{CoordinateSpace, InferenceConfig};
pub use metadata::ModelMetadata;
pub use model::{InferenceSession, OnnxSession};
pub use postprocessing::{DecoderRegistry, OutputFormat, RawOutput};
pub use preprocessing::{LetterboxParams, letterbox};
pub use results::{ClassCount, Detection, Prediction, RawDetection, Speed};
pub use source::Source;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "garbage-detect");
    }
}
