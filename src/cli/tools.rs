// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Maintenance commands: benchmark, dataset and model self-check.

use image::{DynamicImage, Rgb, RgbImage};

use crate::benchmark::{append_benchmark_log, benchmark};
use crate::cli::args::{BenchmarkArgs, CheckArgs, DatasetAddArgs, DatasetCommand};
use crate::cli::logging::banner;
use crate::dataset::{Split, add_images_to_dataset};
use crate::detector::Detector;
use crate::error::Result;
use crate::{error, section, success, verbose, warn};

/// `(confidence, canvas)` pairs exercised by the self-check.
pub const CHECK_CONFIGS: [(f32, usize); 5] = [(0.10, 320), (0.15, 416), (0.20, 640), (0.20, 800), (0.15, 1024)];

/// Detection cap used by the self-check.
pub const CHECK_MAX_DET: usize = 100;

/// Time the model over a directory and append the result to the log file.
///
/// # Errors
///
/// Returns model, image and log-file errors.
pub fn run_benchmark(args: &BenchmarkArgs) -> Result<()> {
    let mut detector = Detector::load(&args.model.model, args.model.inference_config()?)?;
    verbose!("{}", banner(detector.provider()));
    detector.warmup()?;

    let report = benchmark(&mut detector, &args.dir, args.max_images)?;
    verbose!("Average FPS: {:.2}", report.avg_fps);
    append_benchmark_log(&args.log, &report)?;
    success!("Results appended to {}", args.log.display());
    Ok(())
}

/// Dispatch a dataset subcommand.
///
/// # Errors
///
/// Returns [`crate::InferenceError::InvalidInput`] for a bad split or missing
/// directory and I/O errors from copying.
pub fn run_dataset(command: &DatasetCommand) -> Result<()> {
    match command {
        DatasetCommand::Add(args) => run_dataset_add(args),
    }
}

fn run_dataset_add(args: &DatasetAddArgs) -> Result<()> {
    let split: Split = args.split.parse()?;
    let report = add_images_to_dataset(&args.source, &args.root, split)?;
    for name in &report.skipped {
        warn!("{name} already exists in {}, skipped", report.destination.display());
    }
    success!(
        "Copied {}/{} images to {}",
        report.copied,
        report.found,
        report.destination.display()
    );
    if report.copied > 0 {
        verbose!("Place their label files in {}", report.labels.display());
    }
    Ok(())
}

/// Load a model and run a solid green frame through it at several settings.
///
/// # Errors
///
/// Returns model load errors. Per-configuration failures are printed, not returned.
pub fn run_check(args: &CheckArgs) -> Result<()> {
    let mut detector = Detector::load(&args.model.model, args.model.inference_config()?)?;
    verbose!("{}", banner(detector.provider()));
    verbose!("Output format: {}", detector.format());
    verbose!("Classes ({}):", detector.names().len());
    let mut names: Vec<_> = detector.names().iter().collect();
    names.sort_by_key(|(id, _)| **id);
    for (id, name) in names {
        verbose!("  {id}: {name}");
    }

    let image = check_image();
    section!("Self-check on a 640x480 green frame");
    for (confidence, imgsz) in CHECK_CONFIGS {
        match detector.predict_with(&image, confidence, imgsz, CHECK_MAX_DET) {
            Ok(prediction) => verbose!(
                "conf={confidence:.2} imgsz={imgsz}: {} detections",
                prediction.len()
            ),
            Err(e) => error!("conf={confidence:.2} imgsz={imgsz}: {e}"),
        }
    }
    Ok(())
}

fn check_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([0, 255, 0])))
}
