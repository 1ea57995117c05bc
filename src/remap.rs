// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Mapping canvas-space detections back to original-image space.
//!
//! Raw-tensor models may report coordinates either in canvas pixels or as
//! fractions of the canvas; [`to_canvas_space`] brings both to pixels, and
//! [`check_canvas_bounds`] refuses coordinates that cannot come from the canvas
//! at all. [`remap_detections`] then inverts the letterbox transform.

use std::collections::HashMap;

use crate::error::{InferenceError, Result};
use crate::inference::CoordinateSpace;
use crate::preprocessing::LetterboxParams;
use crate::results::{Detection, RawDetection, UNKNOWN_CLASS};

/// Convert decoder output to canvas pixels.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_canvas_space(
    mut detections: Vec<RawDetection>,
    space: CoordinateSpace,
    target_size: u32,
) -> Vec<RawDetection> {
    if space == CoordinateSpace::Normalized {
        let side = target_size as f32;
        for det in &mut detections {
            det.x1 *= side;
            det.y1 *= side;
            det.x2 *= side;
            det.y2 *= side;
        }
    }
    detections
}

/// Fail when any coordinate lies beyond `factor * target_size` on either side of the canvas.
///
/// # Errors
///
/// Returns [`InferenceError::CoordinateSanity`] naming the first offending box.
#[allow(clippy::cast_precision_loss)]
pub fn check_canvas_bounds(detections: &[RawDetection], target_size: u32, factor: f32) -> Result<()> {
    let limit = factor * target_size as f32;
    if let Some(det) = detections
        .iter()
        .find(|d| d.xyxy().iter().any(|v| v.abs() > limit))
    {
        return Err(InferenceError::CoordinateSanity(format!(
            "box {:?} exceeds {factor} x canvas ({target_size} px); \
             check whether the model outputs normalized coordinates",
            det.xyxy()
        )));
    }
    Ok(())
}

/// Invert the letterbox transform for every detection.
///
/// Output has the same order and count as the input. Coordinates are clamped to
/// the original image and inverted corners are swapped.
#[must_use]
pub fn remap_detections(
    detections: &[RawDetection],
    params: &LetterboxParams,
    names: &HashMap<usize, String>,
) -> Vec<Detection> {
    detections
        .iter()
        .map(|det| remap_detection(det, params, names))
        .collect()
}

/// Invert the letterbox transform for one detection.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn remap_detection(
    det: &RawDetection,
    params: &LetterboxParams,
    names: &HashMap<usize, String>,
) -> Detection {
    let (pad_left, pad_top) = (params.pad_left as f32, params.pad_top as f32);
    let (max_x, max_y) = (params.orig_width as f32, params.orig_height as f32);

    let map_x = |x: f32| ((x - pad_left) / params.scale).clamp(0.0, max_x);
    let map_y = |y: f32| ((y - pad_top) / params.scale).clamp(0.0, max_y);

    let (x1, x2) = ordered(map_x(det.x1), map_x(det.x2));
    let (y1, y2) = ordered(map_y(det.y1), map_y(det.y2));

    Detection {
        x1,
        y1,
        x2,
        y2,
        confidence: det.confidence,
        class_id: det.class_id,
        class_name: names
            .get(&det.class_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_CLASS.to_string()),
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}
