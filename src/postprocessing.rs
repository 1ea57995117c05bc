// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoding of raw model outputs into canvas-space detections.
//!
//! The output encoding of a model is resolved once, when the model is loaded,
//! into an [`OutputFormat`] tag. A [`DecoderRegistry`] maps each tag to a
//! [`Decoder`]. Decoding never fails: a buffer no decoder understands yields
//! zero detections and a warning.

use std::collections::HashMap;
use std::fmt;

use ndarray::{ArrayView2, Axis};
use tracing::warn;

use crate::error::InferenceError;
use crate::results::RawDetection;

/// Values per row of an end-to-end detection buffer.
pub const ROW_WIDTH: usize = 6;

/// One raw output buffer returned by an inference session.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    /// Flat row-major data.
    pub data: Vec<f32>,
    /// Tensor shape.
    pub shape: Vec<usize>,
}

impl RawOutput {
    /// Wrap a flat buffer and its shape.
    #[must_use]
    pub const fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        Self { data, shape }
    }

    /// Build a rank-2 `[rows, 6]` output from detection rows.
    #[must_use]
    pub fn from_rows(rows: &[[f32; ROW_WIDTH]]) -> Self {
        Self {
            data: rows.iter().flatten().copied().collect(),
            shape: vec![rows.len(), ROW_WIDTH],
        }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Output encodings a model can be resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// One rank-2 buffer whose rows are `[x1, y1, x2, y2, confidence, class_id]`.
    Rows,
    /// Ultralytics detection head, `[1, 4 + nc, N]` or `[1, N, 4 + nc]`,
    /// with boxes as centre/size and one score per class.
    YoloHead,
    /// Anything else.
    Unrecognized,
}

impl OutputFormat {
    /// Resolve the format from the output shapes a model declares.
    ///
    /// Dynamic dimensions are given as `None`.
    #[must_use]
    pub fn resolve(declared: &[Vec<Option<usize>>]) -> Self {
        let [shape] = declared else {
            return Self::Unrecognized;
        };
        match shape.as_slice() {
            [_, cols] if cols.is_none_or(|c| c >= ROW_WIDTH) => Self::Rows,
            [_, a, b] if head_feature_axis(*a, *b).is_some() => Self::YoloHead,
            _ => Self::Unrecognized,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows => write!(f, "rows"),
            Self::YoloHead => write!(f, "yolo-head"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// A declared head needs a feature axis with room for a box and one class.
fn head_feature_axis(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    let features = match (a, b) {
        (Some(a), Some(b)) => {
            if leading_feature_axis(a, b) {
                a
            } else {
                b
            }
        }
        (Some(f), None) | (None, Some(f)) => f,
        (None, None) => return None,
    };
    Some(features).filter(|&f| f >= MIN_HEAD_FEATURES)
}

/// Smallest feature axis of a head: four box values and one class score.
const MIN_HEAD_FEATURES: usize = 5;

/// Whether the middle axis of `[1, a, b]` holds the features.
///
/// It does when it can hold a box and a score and is either the smaller axis
/// or the only axis wide enough.
const fn leading_feature_axis(a: usize, b: usize) -> bool {
    a >= MIN_HEAD_FEATURES && (a <= b || b < MIN_HEAD_FEATURES)
}

/// Turns raw output buffers into canvas-space candidates.
pub trait Decoder: Send + Sync {
    /// Decode `outputs`, dropping candidates below `confidence_threshold`.
    ///
    /// Malformed input yields fewer (possibly zero) detections, never an error.
    fn decode(&self, outputs: &[RawOutput], confidence_threshold: f32) -> Vec<RawDetection>;
}

/// Decoder for [`OutputFormat::Rows`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RowsDecoder;

impl Decoder for RowsDecoder {
    fn decode(&self, outputs: &[RawOutput], confidence_threshold: f32) -> Vec<RawDetection> {
        let [output] = outputs else {
            warn!(count = outputs.len(), "expected exactly one output buffer");
            return Vec::new();
        };
        let &[num_rows, cols] = output.shape.as_slice() else {
            warn!(shape = ?output.shape, "expected a rank-2 output buffer");
            return Vec::new();
        };
        if cols == 0 {
            return Vec::new();
        }

        let mut skipped = 0usize;
        let detections: Vec<RawDetection> = output
            .data
            .chunks(cols)
            .take(num_rows)
            .filter_map(|row| {
                let det = RawDetection::from_row(row);
                if det.is_none() {
                    skipped += 1;
                }
                det
            })
            .filter(|det| det.confidence >= confidence_threshold)
            .collect();

        if skipped > 0 {
            warn!(skipped, "skipped malformed detection rows");
        }
        detections
    }
}

/// Geometry of a YOLO head buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadLayout {
    pub num_classes: usize,
    pub num_predictions: usize,
    /// `true` for `[1, N, 4 + nc]`, `false` for `[1, 4 + nc, N]`.
    pub transposed: bool,
}

impl HeadLayout {
    /// Read the layout from an actual output shape.
    ///
    /// With `expected_classes`, the axis equal to `4 + nc` is the feature axis;
    /// otherwise the smaller axis that can hold a box and a class score is.
    #[must_use]
    pub fn from_shape(shape: &[usize], expected_classes: Option<usize>) -> Option<Self> {
        let &[1, a, b] = shape else {
            return None;
        };
        let transposed = match expected_classes {
            Some(nc) if a == 4 + nc => false,
            Some(nc) if b == 4 + nc => true,
            _ => !leading_feature_axis(a, b),
        };
        let (features, num_predictions) = if transposed { (b, a) } else { (a, b) };
        if features < MIN_HEAD_FEATURES {
            return None;
        }
        Some(Self {
            num_classes: features - 4,
            num_predictions,
            transposed,
        })
    }
}

/// Decoder for [`OutputFormat::YoloHead`].
///
/// Emits every candidate whose best class score passes the threshold, in
/// prediction order; overlap suppression is left to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct YoloHeadDecoder {
    num_classes: Option<usize>,
}

impl YoloHeadDecoder {
    /// Decoder for a model with a known class count.
    #[must_use]
    pub const fn with_classes(num_classes: usize) -> Self {
        Self {
            num_classes: Some(num_classes),
        }
    }
}

impl Decoder for YoloHeadDecoder {
    fn decode(&self, outputs: &[RawOutput], confidence_threshold: f32) -> Vec<RawDetection> {
        let Some(output) = outputs.first() else {
            return Vec::new();
        };
        let Some(layout) = HeadLayout::from_shape(&output.shape, self.num_classes) else {
            warn!(shape = ?output.shape, "output is not a detection head");
            return Vec::new();
        };

        let features = layout.num_classes + 4;
        let dims = if layout.transposed {
            (layout.num_predictions, features)
        } else {
            (features, layout.num_predictions)
        };
        let Ok(view) = ArrayView2::from_shape(dims, &output.data) else {
            warn!(shape = ?output.shape, len = output.data.len(), "output length does not match its shape");
            return Vec::new();
        };
        // Rows are predictions from here on.
        let view = if layout.transposed { view } else { view.reversed_axes() };

        view.axis_iter(Axis(0))
            .filter_map(|pred| {
                let (class_id, score) = pred
                    .iter()
                    .skip(4)
                    .enumerate()
                    .filter(|(_, s)| !s.is_nan())
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(i, &s)| (i, s))?;
                if score < confidence_threshold {
                    return None;
                }
                let (cx, cy, w, h) = (pred[0], pred[1], pred[2], pred[3]);
                if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
                    return None;
                }
                Some(RawDetection {
                    x1: cx - w / 2.0,
                    y1: cy - h / 2.0,
                    x2: cx + w / 2.0,
                    y2: cy + h / 2.0,
                    confidence: score,
                    class_id,
                })
            })
            .collect()
    }
}

/// Decoders keyed by output format.
pub struct DecoderRegistry {
    decoders: HashMap<OutputFormat, Box<dyn Decoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(OutputFormat::Rows, Box::new(RowsDecoder));
        registry.register(OutputFormat::YoloHead, Box::new(YoloHeadDecoder::default()));
        registry
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<String> = self.decoders.keys().map(ToString::to_string).collect();
        formats.sort();
        f.debug_struct("DecoderRegistry")
            .field("formats", &formats)
            .finish()
    }
}

impl DecoderRegistry {
    /// Registry without any decoder.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Install (or replace) the decoder for `format`.
    pub fn register(&mut self, format: OutputFormat, decoder: Box<dyn Decoder>) {
        self.decoders.insert(format, decoder);
    }

    /// Whether `format` has a decoder.
    #[must_use]
    pub fn supports(&self, format: OutputFormat) -> bool {
        self.decoders.contains_key(&format)
    }

    /// Decode `outputs` with the decoder registered for `format`.
    ///
    /// Formats without a decoder yield an empty sequence.
    #[must_use]
    pub fn decode(
        &self,
        format: OutputFormat,
        outputs: &[RawOutput],
        confidence_threshold: f32,
    ) -> Vec<RawDetection> {
        match self.decoders.get(&format) {
            Some(decoder) => decoder.decode(outputs, confidence_threshold),
            None => {
                let shapes: Vec<&[usize]> = outputs.iter().map(|o| o.shape.as_slice()).collect();
                let err = InferenceError::UnrecognizedOutputFormat(format!(
                    "no decoder for {format} outputs {shapes:?}"
                ));
                warn!("{err}, returning no detections");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format() {
        assert_eq!(
            OutputFormat::resolve(&[vec![None, Some(6)]]),
            OutputFormat::Rows
        );
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(300), Some(7)]]),
            OutputFormat::Rows
        );
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(1), Some(84), Some(8400)]]),
            OutputFormat::YoloHead
        );
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(1), None, Some(9)]]),
            OutputFormat::YoloHead
        );
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(10), Some(4)]]),
            OutputFormat::Unrecognized
        );
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(1), Some(6)], vec![Some(1), Some(6)]]),
            OutputFormat::Unrecognized
        );
        assert_eq!(OutputFormat::resolve(&[]), OutputFormat::Unrecognized);
    }

    #[test]
    fn test_resolve_agrees_with_head_layout() {
        for shape in [[1, 7, 2], [1, 6, 3], [1, 1, 6], [1, 84, 8400], [1, 8400, 84], [1, 4, 3]] {
            let declared = [shape.iter().map(|&d| Some(d)).collect::<Vec<_>>()];
            let resolved = OutputFormat::resolve(&declared) == OutputFormat::YoloHead;
            assert_eq!(
                resolved,
                HeadLayout::from_shape(&shape, None).is_some(),
                "shape {shape:?}"
            );
        }
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(1), Some(7), Some(2)]]),
            OutputFormat::YoloHead
        );
        assert_eq!(
            OutputFormat::resolve(&[vec![Some(1), Some(4), Some(3)]]),
            OutputFormat::Unrecognized
        );
    }

    #[test]
    fn test_rows_threshold_and_order() {
        let output = RawOutput::from_rows(&[
            [100.0, 100.0, 200.0, 200.0, 0.9, 2.0],
            [10.0, 10.0, 20.0, 20.0, 0.2, 0.0],
            [30.0, 30.0, 60.0, 60.0, 0.5, 1.0],
        ]);
        let dets = RowsDecoder.decode(&[output], 0.5);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 2);
        assert_eq!(dets[1].class_id, 1);
        assert!(dets.iter().all(|d| d.confidence >= 0.5));
    }

    #[test]
    fn test_rows_decode_is_idempotent() {
        let output = RawOutput::from_rows(&[
            [1.0, 2.0, 3.0, 4.0, 0.7, 0.0],
            [5.0, 6.0, 7.0, 8.0, 0.3, 1.0],
        ]);
        let outputs = [output];
        assert_eq!(
            RowsDecoder.decode(&outputs, 0.25),
            RowsDecoder.decode(&outputs, 0.25)
        );
    }

    #[test]
    fn test_rows_skips_malformed_rows() {
        let output = RawOutput::new(
            vec![
                1.0, 2.0, 3.0, 4.0, 0.9, 0.0, //
                f32::NAN, 2.0, 3.0, 4.0, 0.9, 0.0, //
                1.0, 2.0, 3.0, 4.0, 0.9, -3.0, //
                1.0, 2.0, 3.0,
            ],
            vec![4, 6],
        );
        let dets = RowsDecoder.decode(&[output], 0.1);
        assert_eq!(dets.len(), 1);
    }

    #[test]
    fn test_rows_narrow_buffer_yields_nothing() {
        let output = RawOutput::new(vec![1.0; 10], vec![2, 5]);
        assert!(RowsDecoder.decode(&[output], 0.0).is_empty());
    }

    #[test]
    fn test_rows_rejects_other_ranks() {
        let output = RawOutput::new(vec![0.5; 12], vec![1, 2, 6]);
        assert!(RowsDecoder.decode(&[output], 0.0).is_empty());

        let row = RawOutput::from_rows(&[[1.0, 2.0, 3.0, 4.0, 0.9, 0.0]]);
        assert!(RowsDecoder.decode(&[row.clone(), row], 0.0).is_empty());
    }

    #[test]
    fn test_head_layout() {
        let layout = HeadLayout::from_shape(&[1, 84, 8400], Some(80)).unwrap();
        assert_eq!(layout.num_classes, 80);
        assert_eq!(layout.num_predictions, 8400);
        assert!(!layout.transposed);

        let layout = HeadLayout::from_shape(&[1, 8400, 84], None).unwrap();
        assert_eq!(layout.num_classes, 80);
        assert!(layout.transposed);

        assert!(HeadLayout::from_shape(&[1, 4, 3], None).is_none());
        assert!(HeadLayout::from_shape(&[84, 8400], None).is_none());
    }

    #[test]
    fn test_yolo_head_decode() {
        // Two classes, three predictions, layout [1, 6, 3].
        #[rustfmt::skip]
        let data = vec![
            50.0, 200.0, 10.0,  // cx
            50.0, 200.0, 10.0,  // cy
            20.0, 40.0,  4.0,   // w
            10.0, 40.0,  4.0,   // h
            0.9,  0.1,   0.05,  // class 0
            0.05, 0.6,   0.1,   // class 1
        ];
        let output = RawOutput::new(data, vec![1, 6, 3]);
        let dets = YoloHeadDecoder::with_classes(2).decode(&[output], 0.25);

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].xyxy(), [40.0, 45.0, 60.0, 55.0]);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[1].class_id, 1);
        assert!((dets[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_yolo_head_nan_scores_do_not_panic() {
        let output = RawOutput::new(
            vec![100.0, 100.0, 50.0, 50.0, f32::NAN, 0.9],
            vec![1, 1, 6],
        );
        let dets = YoloHeadDecoder::default().decode(&[output], 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn test_yolo_head_length_mismatch() {
        let output = RawOutput::new(vec![0.0; 10], vec![1, 6, 3]);
        assert!(YoloHeadDecoder::default().decode(&[output], 0.0).is_empty());
    }

    #[test]
    fn test_registry_unrecognized_yields_empty() {
        let registry = DecoderRegistry::default();
        assert!(registry.supports(OutputFormat::Rows));
        assert!(!registry.supports(OutputFormat::Unrecognized));

        let output = RawOutput::new(vec![0.9; 24], vec![2, 2, 6]);
        assert!(
            registry
                .decode(OutputFormat::Unrecognized, &[output.clone()], 0.0)
                .is_empty()
        );
        // A 3-D buffer handed to the rows decoder is not an error either.
        assert!(registry.decode(OutputFormat::Rows, &[output], 0.0).is_empty());
    }

    #[test]
    fn test_registry_replace_decoder() {
        let mut registry = DecoderRegistry::empty();
        assert!(!registry.supports(OutputFormat::YoloHead));
        registry.register(OutputFormat::YoloHead, Box::new(YoloHeadDecoder::with_classes(3)));
        assert!(registry.supports(OutputFormat::YoloHead));
    }
}
