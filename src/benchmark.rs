// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference speed benchmark over a directory of images.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::detector::Detector;
use crate::error::{InferenceError, Result};
use crate::preprocessing::letterbox;
use crate::source::{collect_images, load_image};

/// Default results file, appended to on every run.
pub const DEFAULT_LOG_FILE: &str = "benchmark_results.txt";

/// Images read per run at most.
pub const MAX_IMAGES: usize = 100;

const BENCHMARK_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Timings of one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    /// Model identifier (path).
    pub model: String,
    /// Backend provider that ran the model.
    pub backend: String,
    /// Inference time per image, in seconds.
    pub times: Vec<f64>,
    /// `times.len() / sum(times)`.
    pub avg_fps: f64,
}

impl BenchmarkReport {
    /// Log entry in the results-file format.
    #[must_use]
    pub fn log_entry(&self) -> String {
        let times = self
            .times
            .iter()
            .map(|t| format!("{t:.4}"))
            .collect::<Vec<_>>()
            .join(",");
        let mut entry = String::new();
        let _ = writeln!(entry, "Model: {}", self.model);
        let _ = writeln!(entry, "Type: {}", self.backend);
        let _ = writeln!(entry, "Avg FPS: {:.2}", self.avg_fps);
        let _ = writeln!(entry, "Times: {times}");
        let _ = writeln!(entry, "{}", "-".repeat(40));
        entry
    }
}

/// Time inference on up to `max_images` images from `image_dir`.
///
/// Images are letterboxed to the detector's canvas outside the timed region;
/// only the session run is timed.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidInput`] if the directory holds no
/// `jpg`/`jpeg`/`png` images, and propagates load and inference failures.
pub fn benchmark(detector: &mut Detector, image_dir: &Path, max_images: usize) -> Result<BenchmarkReport> {
    let mut paths = collect_images(image_dir, &BENCHMARK_EXTENSIONS)?;
    paths.truncate(max_images);
    if paths.is_empty() {
        return Err(InferenceError::InvalidInput(format!(
            "No images found in {}",
            image_dir.display()
        )));
    }

    let size = u32::try_from(detector.canvas_size())
        .map_err(|_| InferenceError::Config("canvas size too large".to_string()))?;

    let mut times = Vec::with_capacity(paths.len());
    for path in &paths {
        let tensor = letterbox(&load_image(path)?, size)?.to_tensor();
        let start = Instant::now();
        detector.run(&tensor)?;
        times.push(start.elapsed().as_secs_f64());
    }

    let total: f64 = times.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let avg_fps = if total > 0.0 { times.len() as f64 / total } else { 0.0 };
    info!("Benchmarked {} images: {avg_fps:.2} FPS", times.len());

    Ok(BenchmarkReport {
        model: detector
            .model_path()
            .map_or_else(|| "<in-memory>".to_string(), |p| p.display().to_string()),
        backend: detector.provider().to_string(),
        times,
        avg_fps,
    })
}

/// Append a report to the results file, creating it if needed.
///
/// # Errors
///
/// Returns [`InferenceError::Io`] if the file cannot be written.
pub fn append_benchmark_log(path: &Path, report: &BenchmarkReport) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(report.log_entry().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> BenchmarkReport {
        BenchmarkReport {
            model: "models/best.onnx".to_string(),
            backend: "native".to_string(),
            times: vec![0.012_34, 0.02],
            avg_fps: 61.728,
        }
    }

    #[test]
    fn test_log_entry_format() {
        assert_eq!(
            report().log_entry(),
            format!(
                "Model: models/best.onnx\nType: native\nAvg FPS: 61.73\nTimes: 0.0123,0.0200\n{}\n",
                "-".repeat(40)
            )
        );
    }

    #[test]
    fn test_append_log_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_LOG_FILE);
        append_benchmark_log(&path, &report()).unwrap();
        append_benchmark_log(&path, &report()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Avg FPS: 61.73").count(), 2);
    }
}
