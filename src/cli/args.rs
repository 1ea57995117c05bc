// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::backend::Provider;
use crate::benchmark::{DEFAULT_LOG_FILE, MAX_IMAGES};
use crate::dataset::DEFAULT_DATASET_ROOT;
use crate::error::Result;
use crate::inference::{CoordinateSpace, DEFAULT_CONFIDENCE, InferenceConfig};

/// Model used when `--model` is not given.
pub const DEFAULT_MODEL: &str = "models/best.onnx";

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    garbage-detect predict -m models/best.onnx -s bin.jpg
    garbage-detect predict -m models/best.onnx -s photos/ --save --conf 0.5
    garbage-detect predict -m exported.onnx -s bin.jpg --backend raw --normalized --json
    garbage-detect webcam -m models/best.onnx -s 0 --show
    garbage-detect serve -m models/best.onnx --port 8000
    garbage-detect benchmark -m models/best.onnx -d dataset_split/images/val
    garbage-detect dataset add -s new_photos --split train
    garbage-detect check -m models/best.onnx"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect garbage in an image or a directory of images
    Predict(PredictArgs),
    /// Run live detection on a camera, video, stream or image directory
    Webcam(WebcamArgs),
    /// Start the HTTP detection server
    Serve(ServeArgs),
    /// Measure inference throughput over a directory of images
    Benchmark(BenchmarkArgs),
    /// Manage the training dataset
    #[command(subcommand)]
    Dataset(DatasetCommand),
    /// Load a model and run it on synthetic frames at several settings
    Check(CheckArgs),
}

/// Model selection and inference settings shared by model-bound commands.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to ONNX model file
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: PathBuf,

    /// Confidence threshold
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    pub conf: f32,

    /// `IoU` threshold for the native path's NMS
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Inference canvas size (square). Defaults to the model's own size
    #[arg(long)]
    pub imgsz: Option<usize>,

    /// Backend provider: auto, native or raw
    #[arg(long, default_value = "auto")]
    pub backend: String,

    /// Raw-tensor output coordinates are fractions of the canvas
    #[arg(long, default_value_t = false)]
    pub normalized: bool,
}

impl ModelArgs {
    /// Providers to try, in order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::InferenceError::Config`] for an unknown backend name.
    pub fn providers(&self) -> Result<Vec<Provider>> {
        if self.backend.eq_ignore_ascii_case("auto") {
            return Ok(Provider::default_order());
        }
        Ok(vec![self.backend.parse()?])
    }

    /// Inference configuration described by these arguments.
    ///
    /// # Errors
    ///
    /// See [`ModelArgs::providers`].
    pub fn inference_config(&self) -> Result<InferenceConfig> {
        let space = if self.normalized {
            CoordinateSpace::Normalized
        } else {
            CoordinateSpace::Absolute
        };
        let mut config = InferenceConfig::new()
            .with_confidence(self.conf)
            .with_iou(self.iou)
            .with_coordinate_space(space)
            .with_providers(self.providers()?);
        if let Some(size) = self.imgsz {
            config = config.with_imgsz(size);
        }
        Ok(config)
    }
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Input image or directory of images
    #[arg(short, long)]
    pub source: String,

    /// Maximum number of detections per image
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// Save annotated images to runs/detect/predict
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Print detections as JSON, one object per image
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

/// Arguments for the webcam command.
#[derive(Args, Debug)]
pub struct WebcamArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Camera index, video file, stream URL or image directory
    #[arg(short, long, default_value = "0")]
    pub source: String,

    /// Display frames in a window
    #[arg(long, default_value_t = false)]
    pub show: bool,

    /// Save annotated frames to runs/detect/webcam
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<usize>,
}

/// Arguments for the serve command. Unset values come from the environment.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to ONNX model file [env: `MODEL_PATH`]
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Bind address [env: `HOST`]
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port [env: `PORT`]
    #[arg(long)]
    pub port: Option<u16>,

    /// Default confidence threshold [env: `CONF`]
    #[arg(long)]
    pub conf: Option<f32>,

    /// Inference canvas size [env: `IMGSZ`]
    #[arg(long)]
    pub imgsz: Option<usize>,
}

/// Arguments for the benchmark command.
#[derive(Args, Debug)]
pub struct BenchmarkArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Directory of benchmark images
    #[arg(short, long)]
    pub dir: PathBuf,

    /// File the results are appended to
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log: PathBuf,

    /// Maximum number of images to time
    #[arg(long, default_value_t = MAX_IMAGES)]
    pub max_images: usize,
}

/// Dataset subcommands.
#[derive(Subcommand, Debug)]
pub enum DatasetCommand {
    /// Copy new images into a dataset split
    Add(DatasetAddArgs),
}

/// Arguments for `dataset add`.
#[derive(Args, Debug)]
pub struct DatasetAddArgs {
    /// Directory with the new images
    #[arg(short, long)]
    pub source: PathBuf,

    /// Target split: train, val or test
    #[arg(long, default_value = "train")]
    pub split: String,

    /// Dataset root directory
    #[arg(long, default_value = DEFAULT_DATASET_ROOT)]
    pub root: PathBuf,
}

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}
