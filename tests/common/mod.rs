// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Shared fixtures: an in-memory session standing in for an ONNX model.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;

use garbage_detect::{
    Detector, InferenceConfig, InferenceSession, ModelMetadata, RawOutput, Result,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;

/// Session that returns the same buffers for every input.
pub struct MockSession {
    pub shapes: Vec<Vec<Option<usize>>>,
    pub outputs: Vec<RawOutput>,
    pub metadata: ModelMetadata,
    pub fail: bool,
}

impl MockSession {
    /// A raw-tensor model emitting `rows` as `[N, 6]`.
    pub fn rows(rows: &[[f32; 6]]) -> Self {
        Self {
            shapes: vec![vec![None, Some(6)]],
            outputs: vec![RawOutput::from_rows(rows)],
            metadata: ModelMetadata::default(),
            fail: false,
        }
    }
}

impl InferenceSession for MockSession {
    fn run(&mut self, _input: &Array4<f32>) -> Result<Vec<RawOutput>> {
        if self.fail {
            return Err(garbage_detect::InferenceError::Inference(
                "mock failure".to_string(),
            ));
        }
        Ok(self.outputs.clone())
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_shapes(&self) -> Vec<Vec<Option<usize>>> {
        self.shapes.clone()
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

pub fn garbage_names() -> HashMap<usize, String> {
    HashMap::from([
        (0, "bottle".to_string()),
        (1, "can".to_string()),
        (2, "plastic bag".to_string()),
    ])
}

/// Raw-tensor detector over `rows` on a square canvas of `imgsz`.
pub fn rows_detector(rows: &[[f32; 6]], imgsz: usize) -> Detector {
    Detector::from_session(
        Box::new(MockSession::rows(rows)),
        InferenceConfig::default().with_imgsz(imgsz),
    )
    .unwrap()
    .with_names(garbage_names())
}

pub fn solid_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 80, 120])))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
