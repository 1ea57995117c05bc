// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Benchmark and dataset helpers against temporary directories.

mod common;

use std::fs;

use common::{rows_detector, solid_image};
use garbage_detect::InferenceError;
use garbage_detect::benchmark::{append_benchmark_log, benchmark};
use garbage_detect::dataset::{Split, add_images_to_dataset};

#[test]
fn test_benchmark_times_each_image() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["1.jpg", "2.png", "3.png"] {
        solid_image(48, 32).save(tmp.path().join(name)).unwrap();
    }
    fs::write(tmp.path().join("notes.txt"), b"skip me").unwrap();

    let mut detector = rows_detector(&[], 64);
    let report = benchmark(&mut detector, tmp.path(), 2).unwrap();
    assert_eq!(report.times.len(), 2);
    assert_eq!(report.backend, "raw-tensor");
    assert!(report.avg_fps.is_finite());

    let log = tmp.path().join("benchmark_results.txt");
    append_benchmark_log(&log, &report).unwrap();
    let text = fs::read_to_string(&log).unwrap();
    assert!(text.starts_with("Model: "));
    assert!(text.contains("Type: raw-tensor\n"));
    assert!(text.ends_with(&format!("{}\n", "-".repeat(40))));
}

#[test]
fn test_benchmark_empty_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let mut detector = rows_detector(&[], 64);
    let err = benchmark(&mut detector, tmp.path(), 100).unwrap_err();
    assert!(matches!(err, InferenceError::InvalidInput(ref msg) if msg.contains("No images found")));
}

#[test]
fn test_dataset_add_twice_copies_once() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("incoming");
    fs::create_dir_all(&source).unwrap();
    solid_image(8, 8).save(source.join("bin_01.png")).unwrap();
    solid_image(8, 8).save(source.join("bin_02.JPG")).unwrap();

    let root = tmp.path().join("dataset_split");
    let first = add_images_to_dataset(&source, &root, Split::Train).unwrap();
    assert_eq!(first.copied, 2);
    assert!(first.skipped.is_empty());
    assert_eq!(first.destination, root.join("images").join("train"));
    assert_eq!(first.labels, root.join("labels").join("train"));

    let second = add_images_to_dataset(&source, &root, Split::Train).unwrap();
    assert_eq!(second.found, 2);
    assert_eq!(second.copied, 0);
    assert_eq!(second.skipped.len(), 2);
}
