// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! End-to-end pipeline tests through the public API with in-memory sessions.

mod common;

use std::sync::atomic::Ordering;

use common::{MockSession, garbage_names, rows_detector, solid_image};
use garbage_detect::capture::{ImageSequence, NullSink};
use garbage_detect::{
    Annotator, Detector, InferenceConfig, InferenceError, ModelMetadata, OutputFormat, Provider,
    RawOutput, SessionContext, letterbox, run_capture,
};

#[test]
fn test_letterbox_then_remap_round_trip() {
    // 640x480 onto 416: scale 0.65, 312 rows of image, 52 rows of padding above.
    let boxed = letterbox(&solid_image(640, 480), 416).unwrap();
    assert_eq!(boxed.canvas.dimensions(), (416, 416));
    assert_eq!(boxed.params.pad_top, 52);
    assert_eq!(boxed.params.pad_left, 0);

    let mut detector = rows_detector(&[[0.0, 52.0, 416.0, 364.0, 0.9, 2.0]], 416);
    let prediction = detector.predict(&solid_image(640, 480)).unwrap();
    let det = &prediction.detections[0];
    assert!((det.x1).abs() < 0.5 && (det.y1).abs() < 0.5);
    assert!((det.x2 - 640.0).abs() < 0.5 && (det.y2 - 480.0).abs() < 0.5);
    assert_eq!(det.class_name, "plastic bag");
}

#[test]
fn test_boxes_are_clamped_to_image() {
    let mut detector = rows_detector(&[[-30.0, -30.0, 500.0, 500.0, 0.8, 0.0]], 416);
    let prediction = detector.predict(&solid_image(300, 200)).unwrap();
    for det in &prediction.detections {
        assert!(0.0 <= det.x1 && det.x1 <= det.x2 && det.x2 <= 300.0);
        assert!(0.0 <= det.y1 && det.y1 <= det.y2 && det.y2 <= 200.0);
    }
}

#[test]
fn test_threshold_and_unknown_class() {
    let mut detector = rows_detector(
        &[
            [10.0, 10.0, 50.0, 50.0, 0.2, 0.0],
            [10.0, 10.0, 50.0, 50.0, 0.6, 7.0],
        ],
        416,
    );
    let prediction = detector.predict_with(&solid_image(416, 416), 0.5, 416, 10).unwrap();
    assert_eq!(prediction.len(), 1);
    assert_eq!(prediction.detections[0].class_name, "unknown");
    assert_eq!(prediction.to_rows()[0][5], 7.0);
}

#[test]
fn test_raw_tensor_provider_ignores_detection_heads() {
    // [1, 84, 3] head from a model without detection metadata.
    let session = MockSession {
        shapes: vec![vec![Some(1), Some(84), Some(3)]],
        outputs: vec![RawOutput::new(vec![0.9; 84 * 3], vec![1, 84, 3])],
        metadata: ModelMetadata::default(),
        fail: false,
    };
    let mut detector = Detector::from_session(Box::new(session), InferenceConfig::default().with_imgsz(416))
        .unwrap()
        .with_names(garbage_names());
    assert_eq!(detector.provider(), Provider::RawTensor);
    assert_eq!(detector.format(), OutputFormat::Unrecognized);

    let prediction = detector.predict(&solid_image(416, 416)).unwrap();
    assert!(prediction.is_empty());
    assert!(prediction.class_counts.is_empty());
    assert!(detector.detect_raw(&solid_image(416, 416), 0.5, 416).unwrap().is_empty());
}

#[test]
fn test_native_small_head_applies_nms() {
    // [1, 7, 3] head: cx, cy, w, h and three class scores per candidate.
    #[rustfmt::skip]
    let data = vec![
        100.0, 102.0, 300.0,
        100.0, 102.0, 300.0,
        40.0,  40.0,  20.0,
        40.0,  40.0,  20.0,
        0.1,   0.0,   0.0,
        0.9,   0.7,   0.2,
        0.0,   0.1,   0.6,
    ];
    let metadata =
        ModelMetadata::from_yaml_str("task: detect\nnames: {0: 'bottle', 1: 'can', 2: 'plastic bag'}").unwrap();
    let session = MockSession {
        shapes: vec![vec![Some(1), Some(7), Some(3)]],
        outputs: vec![RawOutput::new(data, vec![1, 7, 3])],
        metadata,
        fail: false,
    };
    let mut detector =
        Detector::from_session(Box::new(session), InferenceConfig::default().with_imgsz(416)).unwrap();
    assert_eq!(detector.provider(), Provider::Native);
    assert_eq!(detector.format(), OutputFormat::YoloHead);

    let detections = detector.run_native(&solid_image(416, 416), 0.5, 416).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class_name, "can");
    assert_eq!(detections[0].xyxy(), [80.0, 80.0, 120.0, 120.0]);
    assert_eq!(detections[1].class_name, "plastic bag");
}

#[test]
fn test_refused_model_is_unavailable() {
    let session = MockSession::rows(&[]);
    let config = InferenceConfig::default().with_providers(vec![Provider::Native]);
    let err = Detector::from_session(Box::new(session), config).unwrap_err();
    assert!(matches!(err, InferenceError::ModelUnavailable(_)));
    assert!(err.is_boundary());
}

#[test]
fn test_missing_model_file() {
    let err = Detector::load("does/not/exist.onnx", InferenceConfig::default()).unwrap_err();
    assert!(matches!(err, InferenceError::ModelUnavailable(_)));
}

#[test]
fn test_capture_over_image_directory() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        solid_image(64, 48).save(tmp.path().join(name)).unwrap();
    }
    std::fs::write(tmp.path().join("d.png"), b"corrupt").unwrap();

    let detector = rows_detector(&[[0.0, 0.0, 32.0, 32.0, 0.9, 1.0]], 64);
    let mut ctx = SessionContext::new(detector, Annotator::without_font());
    let mut source = ImageSequence::from_dir(tmp.path()).unwrap();
    let mut sink = NullSink::default();

    let summary = run_capture(&mut ctx, &mut source, &mut sink, None).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.detections, 3);
    assert_eq!(sink.frames, 3);
    assert!(!summary.stopped);
    assert!(source.is_released());
}

#[test]
fn test_capture_stops_on_flag_and_survives_inference_errors() {
    let tmp = tempfile::tempdir().unwrap();
    solid_image(32, 32).save(tmp.path().join("a.png")).unwrap();
    solid_image(32, 32).save(tmp.path().join("b.png")).unwrap();

    let mut failing = MockSession::rows(&[]);
    failing.fail = true;
    let detector = Detector::from_session(Box::new(failing), InferenceConfig::default()).unwrap();
    let mut ctx = SessionContext::new(detector, Annotator::without_font());
    let mut source = ImageSequence::from_dir(tmp.path()).unwrap();
    let mut sink = NullSink::default();

    let summary = run_capture(&mut ctx, &mut source, &mut sink, None).unwrap();
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.failed_frames, 2);
    assert_eq!(summary.detections, 0);

    let mut source = ImageSequence::from_dir(tmp.path()).unwrap();
    ctx.request_stop();
    assert!(ctx.stop_handle().load(Ordering::SeqCst));
    let summary = run_capture(&mut ctx, &mut source, &mut sink, None).unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.frames, 0);
    assert!(source.is_released());

    let detector = ctx.into_detector();
    assert_eq!(detector.provider(), Provider::RawTensor);
}
