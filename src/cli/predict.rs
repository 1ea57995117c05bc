// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::annotate::Annotator;
use crate::cli::args::PredictArgs;
use crate::cli::logging::{banner, set_verbose};
use crate::detector::Detector;
use crate::error::{InferenceError, Result};
use crate::results::{ClassCount, Prediction};
use crate::source::{Source, load_image};
use crate::utils::find_next_run_dir;
use crate::{error, section, success, verbose};

/// JSON line printed per image with `--json`: the `/predict` shape without the image.
#[derive(Debug, Serialize)]
struct JsonPrediction<'a> {
    source: String,
    detections: Vec<[f32; 6]>,
    counts: &'a ClassCount,
}

/// Run detection over an image or a directory of images.
///
/// # Errors
///
/// Returns model and source errors. Failures on individual images are
/// reported and skipped.
#[allow(clippy::cast_precision_loss)]
pub fn run_prediction(args: &PredictArgs) -> Result<()> {
    set_verbose(args.verbose && !args.json);

    let source = Source::from(args.source.as_str());
    if source.is_video() {
        return Err(InferenceError::InvalidInput(format!(
            "{source} is a video source, use the 'webcam' command"
        )));
    }
    let paths = source.image_paths()?;

    let mut detector = Detector::load(&args.model.model, args.model.inference_config()?)?;
    verbose!("{}", banner(detector.provider()));
    verbose!(
        "{} summary: {} classes, imgsz={}, output={}",
        args.model.model.display(),
        detector.names().len(),
        detector.canvas_size(),
        detector.format()
    );

    let save_dir = if args.save {
        let dir = find_next_run_dir(Path::new("runs/detect"), "predict");
        fs::create_dir_all(&dir)?;
        Some(dir)
    } else {
        None
    };
    let annotator = save_dir.as_ref().map(|_| Annotator::new());

    let imgsz = detector.canvas_size();
    let total = paths.len();
    let (mut preprocess, mut inference, mut postprocess) = (0.0_f64, 0.0_f64, 0.0_f64);
    let mut processed = 0usize;

    for (i, path) in paths.iter().enumerate() {
        let prediction = match load_image(path)
            .and_then(|image| predict_one(&mut detector, &image, imgsz, args.max_det).map(|p| (image, p)))
        {
            Ok((image, prediction)) => {
                if let (Some(dir), Some(annotator)) = (&save_dir, &annotator) {
                    let (annotated, _) = annotator.annotate(&image, &prediction.detections);
                    let target = output_path(dir, path);
                    if let Err(e) = annotated.save(&target) {
                        error!("Failed to save {}: {e}", target.display());
                    }
                }
                prediction
            }
            Err(e) => {
                error!("{}: {e}", path.display());
                continue;
            }
        };

        processed += 1;
        preprocess += prediction.speed.preprocess.unwrap_or(0.0);
        inference += prediction.speed.inference.unwrap_or(0.0);
        postprocess += prediction.speed.postprocess.unwrap_or(0.0);

        if args.json {
            let line = JsonPrediction {
                source: path.display().to_string(),
                detections: prediction.to_rows(),
                counts: &prediction.class_counts,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{json}"),
                Err(e) => error!("Failed to serialize result: {e}"),
            }
            continue;
        }

        verbose!(
            "image {}/{} {}: {}x{} {}, {:.1}ms",
            i + 1,
            total,
            path.display(),
            prediction.canvas_size,
            prediction.canvas_size,
            prediction.class_counts.summary(),
            prediction.speed.inference.unwrap_or(0.0)
        );
        print_table(&prediction);
    }

    if processed > 0 {
        let n = processed as f64;
        verbose!(
            "Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess per image at shape (1, 3, {imgsz}, {imgsz})",
            preprocess / n,
            inference / n,
            postprocess / n
        );
    }
    if let Some(dir) = &save_dir {
        success!("Results saved to {}", dir.display());
    }
    Ok(())
}

fn predict_one(
    detector: &mut Detector,
    image: &image::DynamicImage,
    imgsz: usize,
    max_det: usize,
) -> Result<Prediction> {
    let confidence = detector.config().confidence_threshold;
    detector.predict_with(image, confidence, imgsz, max_det)
}

fn print_table(prediction: &Prediction) {
    if prediction.is_empty() {
        return;
    }
    section!("{:<16} {:>6}  box (x1, y1, x2, y2)", "class", "conf");
    for row in prediction.rows() {
        verbose!("{row}");
    }
    for (name, count) in prediction.class_counts.iter() {
        verbose!("  {name}: {count}");
    }
}

/// `<dir>/<stem>.png` for an input image.
fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
    dir.join(format!("{stem}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_png() {
        assert_eq!(
            output_path(Path::new("runs/detect/predict"), Path::new("photos/bin.JPG")),
            PathBuf::from("runs/detect/predict/bin.png")
        );
    }

    #[test]
    fn test_json_line_shape() {
        let prediction = Prediction::new(Vec::new(), 10, 10, 416);
        let line = JsonPrediction {
            source: "a.jpg".to_string(),
            detections: prediction.to_rows(),
            counts: &prediction.class_counts,
        };
        let value: serde_json::Value = serde_json::to_value(&line).unwrap();
        assert_eq!(value["detections"], serde_json::json!([]));
        assert_eq!(value["counts"], serde_json::json!({}));
    }
}
