// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Live capture loop.
//!
//! A [`SessionContext`] holds the detector and a stop flag for one capture
//! session. [`run_capture`] pulls frames from a [`FrameSource`], runs the
//! detection pipeline on each one to completion, draws the result and hands it
//! to a [`FrameSink`]. The stop flag is checked between frames, and the source
//! is released on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::{DynamicImage, RgbImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::annotate::Annotator;
use crate::detector::Detector;
use crate::error::{InferenceError, Result};
use crate::results::Prediction;
use crate::source::{IMAGE_EXTENSIONS, Source, collect_images, load_image};

/// State owned by one capture session.
///
/// Created when the session starts and dropped when it ends; nothing here is
/// process-wide.
#[derive(Debug)]
pub struct SessionContext {
    stop: Arc<AtomicBool>,
    detector: Detector,
    annotator: Annotator,
}

impl SessionContext {
    /// Start a session around a loaded detector.
    #[must_use]
    pub fn new(detector: Detector, annotator: Annotator) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            detector,
            annotator,
        }
    }

    /// Shared stop flag, for signal handlers and other threads.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Ask the capture loop to stop before the next frame.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// The session's detector.
    #[must_use]
    pub const fn detector(&self) -> &Detector {
        &self.detector
    }

    /// End the session, returning the detector.
    #[must_use]
    pub fn into_detector(self) -> Detector {
        self.detector
    }
}

/// Something that yields frames until it runs dry.
pub trait FrameSource {
    /// Next frame, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Device`] if the device cannot be read.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;

    /// Release the underlying device. Must be idempotent.
    fn release(&mut self);

    /// Human readable name.
    fn name(&self) -> String;
}

/// Frames read from a list of image files.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    index: usize,
    released: bool,
}

impl ImageSequence {
    /// Sequence over explicit paths.
    #[must_use]
    pub const fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            index: 0,
            released: false,
        }
    }

    /// Sequence over the images of a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Device`] if the directory cannot be listed.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        collect_images(dir, &IMAGE_EXTENSIONS)
            .map(Self::new)
            .map_err(|e| InferenceError::Device(format!("Cannot open {}: {e}", dir.display())))
    }

    /// Whether [`FrameSource::release`] was called.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        if self.released {
            return Ok(None);
        }
        while let Some(path) = self.paths.get(self.index) {
            self.index += 1;
            match load_image(path) {
                Ok(img) => return Ok(Some(img)),
                Err(e) => warn!("Skipping {}: {e}", path.display()),
            }
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn name(&self) -> String {
        format!("{} images", self.paths.len())
    }
}

/// Frames decoded by FFmpeg from a file, stream URL or camera device.
#[cfg(feature = "video")]
pub struct VideoSource {
    decoder: Option<video_rs::decode::Decoder>,
    name: String,
}

#[cfg(feature = "video")]
static VIDEO_INIT: std::sync::Once = std::sync::Once::new();

#[cfg(feature = "video")]
impl VideoSource {
    /// Open a video source. Camera index `N` opens `/dev/videoN`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Device`] if FFmpeg cannot open the source.
    pub fn open(source: &Source) -> Result<Self> {
        VIDEO_INIT.call_once(|| {
            if let Err(e) = video_rs::init() {
                warn!("Failed to initialize video-rs: {e}");
            }
        });

        let name = source.to_string();
        let decoder = match source {
            Source::Video(path) => video_rs::decode::Decoder::new(path.as_path()),
            Source::Webcam(idx) => {
                video_rs::decode::Decoder::new(Path::new(&format!("/dev/video{idx}")))
            }
            Source::Stream(url) => {
                let url = url
                    .parse::<video_rs::Url>()
                    .map_err(|e| InferenceError::Device(format!("Invalid stream URL {url}: {e}")))?;
                video_rs::decode::Decoder::new(url)
            }
            Source::Image(_) | Source::Directory(_) => {
                return Err(InferenceError::Device(format!("{name} is not a video source")));
            }
        }
        .map_err(|e| InferenceError::Device(format!("Failed to open {name}: {e}")))?;

        info!("Opened {name} at {:.1} FPS", decoder.frame_rate());
        Ok(Self {
            decoder: Some(decoder),
            name,
        })
    }
}

#[cfg(feature = "video")]
impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        match decoder.decode() {
            Ok((_ts, frame)) => frame_to_image(&frame).map(Some),
            Err(video_rs::Error::DecodeExhausted | video_rs::Error::ReadExhausted) => Ok(None),
            Err(e) => Err(InferenceError::Device(format!(
                "Failed to read frame from {}: {e}",
                self.name
            ))),
        }
    }

    fn release(&mut self) {
        if self.decoder.take().is_some() {
            debug!("Released {}", self.name);
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Convert a `video_rs` HWC frame to an image.
#[cfg(feature = "video")]
fn frame_to_image(frame: &video_rs::Frame) -> Result<DynamicImage> {
    let &[height, width, 3] = frame.shape() else {
        return Err(InferenceError::Device(format!(
            "Unexpected frame shape {:?}",
            frame.shape()
        )));
    };
    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| InferenceError::Device("Frame too large".to_string()))
    };
    let data = frame.as_standard_layout().iter().copied().collect();
    RgbImage::from_raw(to_u32(width)?, to_u32(height)?, data)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| InferenceError::Device("Frame buffer has wrong length".to_string()))
}

/// Open the frame source for a parsed [`Source`].
///
/// Directories and single images become an [`ImageSequence`]; everything else
/// needs the `video` feature.
///
/// # Errors
///
/// Returns [`InferenceError::Device`] if the source cannot be opened, and
/// [`InferenceError::FeatureNotEnabled`] for video sources without `video`.
pub fn open_source(source: &Source) -> Result<Box<dyn FrameSource>> {
    match source {
        Source::Directory(dir) => Ok(Box::new(ImageSequence::from_dir(dir)?)),
        Source::Image(path) => Ok(Box::new(ImageSequence::new(vec![path.clone()]))),
        #[cfg(feature = "video")]
        _ => Ok(Box::new(VideoSource::open(source)?)),
        #[cfg(not(feature = "video"))]
        _ => Err(InferenceError::FeatureNotEnabled(format!(
            "Reading {source} requires the 'video' feature"
        ))),
    }
}

/// Receives annotated frames.
pub trait FrameSink {
    /// Present one frame. Return `false` to end the session (window closed).
    ///
    /// # Errors
    ///
    /// Errors end the session.
    fn present(&mut self, frame: &RgbImage, prediction: Option<&Prediction>) -> Result<bool>;
}

/// Sink that only counts frames.
#[derive(Debug, Default)]
pub struct NullSink {
    pub frames: usize,
}

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &RgbImage, _prediction: Option<&Prediction>) -> Result<bool> {
        self.frames += 1;
        Ok(true)
    }
}

/// Sink writing each frame as `frame_000000.png` into a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    index: usize,
}

impl DirectorySink {
    /// Create the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`] if it cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, index: 0 })
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSink for DirectorySink {
    fn present(&mut self, frame: &RgbImage, _prediction: Option<&Prediction>) -> Result<bool> {
        let path = self.dir.join(format!("frame_{:06}.png", self.index));
        frame.save(&path)?;
        self.index += 1;
        Ok(true)
    }
}

/// Exponentially smoothed frames-per-second.
#[derive(Debug, Clone, Copy, Default)]
pub struct FpsMeter {
    smoothed: Option<f64>,
}

impl FpsMeter {
    /// Smoothing weight of the previous value.
    pub const DECAY: f64 = 0.9;

    /// Feed one instantaneous reading; returns the smoothed value.
    pub fn update(&mut self, fps: f64) -> f64 {
        let value = match self.smoothed {
            None => fps,
            Some(prev) => Self::DECAY * prev + (1.0 - Self::DECAY) * fps,
        };
        self.smoothed = Some(value);
        value
    }

    /// Current smoothed value (0 before the first frame).
    #[must_use]
    pub fn value(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }
}

/// What a finished capture session did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureSummary {
    /// Frames presented to the sink.
    pub frames: usize,
    /// Frames whose inference failed (shown without boxes).
    pub failed_frames: usize,
    /// Detections over all frames.
    pub detections: usize,
    /// Frames per second over the whole session.
    pub mean_fps: f64,
    /// Whether the session ended because of a stop request.
    pub stopped: bool,
}

#[allow(clippy::cast_precision_loss)]
const fn frames_f64(frames: usize) -> f64 {
    frames as f64
}

/// Releases the source when dropped.
struct ReleaseOnDrop<'a> {
    source: &'a mut dyn FrameSource,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// Run the capture loop until the source ends, the sink closes, `max_frames`
/// frames were shown or a stop is requested.
///
/// # Errors
///
/// Returns [`InferenceError::Device`] if the source fails and propagates sink
/// errors. Inference errors on a frame are logged and do not end the loop.
pub fn run_capture(
    ctx: &mut SessionContext,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    max_frames: Option<usize>,
) -> Result<CaptureSummary> {
    let mut guard = ReleaseOnDrop { source };
    info!("Capturing from {}", guard.source.name());

    let mut summary = CaptureSummary::default();
    let mut meter = FpsMeter::default();
    let started = Instant::now();

    loop {
        if ctx.is_stopped() {
            summary.stopped = true;
            break;
        }
        if max_frames.is_some_and(|max| summary.frames >= max) {
            break;
        }

        let frame_start = Instant::now();
        let Some(frame) = guard.source.next_frame()? else {
            break;
        };

        let (mut canvas, prediction) = match ctx.detector.predict(&frame) {
            Ok(prediction) => {
                let (canvas, _) = ctx.annotator.annotate(&frame, &prediction.detections);
                (canvas, Some(prediction))
            }
            Err(e) => {
                warn!("Inference failed on frame {}: {e}", summary.frames);
                summary.failed_frames += 1;
                (frame.to_rgb8(), None)
            }
        };

        let elapsed = frame_start.elapsed().as_secs_f64();
        let fps = meter.update(if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 });
        ctx.annotator.draw_fps(&mut canvas, fps);

        if let Some(p) = &prediction {
            summary.detections += p.len();
            debug!(frame = summary.frames, fps, counts = %p.class_counts.summary(), "frame");
        }
        summary.frames += 1;

        if !sink.present(&canvas, prediction.as_ref())? {
            break;
        }
    }

    let total = started.elapsed().as_secs_f64();
    if total > 0.0 {
        summary.mean_fps = frames_f64(summary.frames) / total;
    }
    drop(guard);

    info!(
        "Capture ended after {} frames ({} detections, {:.1} FPS)",
        summary.frames, summary.detections, summary.mean_fps
    );
    Ok(summary)
}
