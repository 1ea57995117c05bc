// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection result types.
//!
//! [`RawDetection`] is what a decoder emits in canvas space, [`Detection`] is the
//! externally visible unit in original-image space, and [`Prediction`] bundles the
//! detections of one image with timing and per-class counts.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::utils::pluralize;

/// Class name used when a class id has no entry in the model's names.
pub const UNKNOWN_CLASS: &str = "unknown";

/// Timing information for one prediction (in milliseconds).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Speed {
    /// Time spent on preprocessing.
    pub preprocess: Option<f64>,
    /// Time spent on model inference.
    pub inference: Option<f64>,
    /// Time spent on postprocessing.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Sum of preprocess, inference, and postprocess times in milliseconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// A candidate detection in canvas space, as emitted by a decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawDetection {
    /// Build a detection from an `[x1, y1, x2, y2, confidence, class_id, ...]` row.
    ///
    /// Returns `None` for rows with fewer than six values, any non-finite value
    /// among the first six, or a negative class id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_row(row: &[f32]) -> Option<Self> {
        let fields = row.get(..6)?;
        if fields.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let class = fields[5].round();
        if class < 0.0 {
            return None;
        }
        Some(Self {
            x1: fields[0],
            y1: fields[1],
            x2: fields[2],
            y2: fields[3],
            confidence: fields[4],
            class_id: class as usize,
        })
    }

    /// Box corners as `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn xyxy(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A detection in original-image pixel space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    /// Box corners as `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn xyxy(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Wire row `[x1, y1, x2, y2, confidence, class_id]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_row(&self) -> [f32; 6] {
        [
            self.x1,
            self.y1,
            self.x2,
            self.y2,
            self.confidence,
            self.class_id as f32,
        ]
    }

    /// Box width in pixels.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Box height in pixels.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Occurrences per class name, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCount {
    entries: Vec<(String, usize)>,
}

impl ClassCount {
    /// Create an empty count.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Count class names across a batch of detections.
    #[must_use]
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = Self::new();
        for det in detections {
            counts.add(&det.class_name);
        }
        counts
    }

    /// Record one occurrence of `class_name`.
    pub fn add(&mut self, class_name: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| name == class_name) {
            entry.1 += 1;
        } else {
            self.entries.push((class_name.to_string(), 1));
        }
    }

    /// Count for one class, if it was seen.
    #[must_use]
    pub fn get(&self, class_name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, count)| *count)
    }

    /// Number of distinct classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no class was counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of counted detections.
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// Iterate over `(class_name, count)` in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Human readable summary such as `"2 bottles, 1 can"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "(no detections)".to_string();
        }
        self.iter()
            .map(|(name, count)| {
                if count > 1 {
                    format!("{count} {}", pluralize(name))
                } else {
                    format!("{count} {name}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Serialize for ClassCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, count) in &self.entries {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

/// One row of the tabular result form: class, confidence and box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRow {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl fmt::Display for DetectionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<16} {:>6.2}  [{:.1}, {:.1}, {:.1}, {:.1}]",
            self.class_name, self.confidence, self.bbox[0], self.bbox[1], self.bbox[2], self.bbox[3]
        )
    }
}

/// Detections for a single image plus bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Detections in emission order.
    pub detections: Vec<Detection>,
    /// Per-class counts of `detections`.
    pub class_counts: ClassCount,
    /// Timing information.
    pub speed: Speed,
    /// Original image width.
    pub orig_width: u32,
    /// Original image height.
    pub orig_height: u32,
    /// Side of the square inference canvas.
    pub canvas_size: u32,
}

impl Prediction {
    /// Wrap a detection sequence, computing its class counts.
    #[must_use]
    pub fn new(detections: Vec<Detection>, orig_width: u32, orig_height: u32, canvas_size: u32) -> Self {
        let class_counts = ClassCount::from_detections(&detections);
        Self {
            detections,
            class_counts,
            speed: Speed::default(),
            orig_width,
            orig_height,
            canvas_size,
        }
    }

    /// Number of detections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Tabular form of the detections.
    #[must_use]
    pub fn rows(&self) -> Vec<DetectionRow> {
        self.detections
            .iter()
            .map(|d| DetectionRow {
                class_name: d.class_name.clone(),
                confidence: d.confidence,
                bbox: d.xyxy(),
            })
            .collect()
    }

    /// Wire rows `[x1, y1, x2, y2, confidence, class_id]`.
    #[must_use]
    pub fn to_rows(&self) -> Vec<[f32; 6]> {
        self.detections.iter().map(Detection::to_row).collect()
    }
}
