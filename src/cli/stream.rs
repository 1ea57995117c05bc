// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;
use std::sync::atomic::Ordering;

use crate::annotate::Annotator;
use crate::capture::{CaptureSummary, DirectorySink, FrameSink, NullSink, SessionContext, open_source, run_capture};
use crate::cli::args::WebcamArgs;
use crate::cli::logging::banner;
use crate::detector::Detector;
use crate::error::Result;
use crate::source::Source;
use crate::utils::find_next_run_dir;
use crate::{success, verbose, warn};

/// Sinks fed in turn with every annotated frame.
struct Fanout(Vec<Box<dyn FrameSink>>);

impl FrameSink for Fanout {
    fn present(
        &mut self,
        frame: &image::RgbImage,
        prediction: Option<&crate::results::Prediction>,
    ) -> Result<bool> {
        let mut keep_going = true;
        for sink in &mut self.0 {
            keep_going &= sink.present(frame, prediction)?;
        }
        Ok(keep_going)
    }
}

/// Run a live detection session until the source ends, the window closes,
/// `--max-frames` is reached or Ctrl+C is pressed.
///
/// # Errors
///
/// Returns model, source and device errors.
pub fn run_webcam(args: &WebcamArgs) -> Result<()> {
    let source = Source::from(args.source.as_str());
    let detector = Detector::load(&args.model.model, args.model.inference_config()?)?;
    let mut ctx = SessionContext::new(detector, Annotator::new());
    verbose!("{}", banner(ctx.detector().provider()));

    let stop = ctx.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
    if args.save {
        let dir = find_next_run_dir(Path::new("runs/detect"), "webcam");
        sinks.push(Box::new(DirectorySink::new(dir)?));
    }
    if args.show {
        push_viewer(&mut sinks)?;
    }
    if sinks.is_empty() {
        sinks.push(Box::new(NullSink::default()));
    }
    let mut sink = Fanout(sinks);

    let mut frames = open_source(&source)?;
    let summary = run_capture(&mut ctx, frames.as_mut(), &mut sink, args.max_frames)?;
    report(&summary);
    Ok(())
}

#[cfg(feature = "visualize")]
fn push_viewer(sinks: &mut Vec<Box<dyn FrameSink>>) -> Result<()> {
    let viewer = crate::visualizer::Viewer::new("Garbage Detect", 640, 480)?;
    sinks.push(Box::new(viewer));
    Ok(())
}

#[cfg(not(feature = "visualize"))]
#[allow(clippy::unnecessary_wraps)]
fn push_viewer(_sinks: &mut Vec<Box<dyn FrameSink>>) -> Result<()> {
    warn!("--show requires the 'visualize' feature. Compile with --features visualize to enable display.");
    Ok(())
}

fn report(summary: &CaptureSummary) {
    if summary.stopped {
        verbose!("Interrupted");
    }
    if summary.failed_frames > 0 {
        warn!("{} frames failed inference", summary.failed_frames);
    }
    success!(
        "{} frames, {} detections, {:.1} FPS",
        summary.frames,
        summary.detections,
        summary.mean_fps
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Closing;

    impl FrameSink for Closing {
        fn present(&mut self, _frame: &RgbImage, _prediction: Option<&crate::results::Prediction>) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_fanout_feeds_every_sink() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fanout = Fanout(vec![
            Box::new(DirectorySink::new(tmp.path()).unwrap()),
            Box::new(Closing),
        ]);
        let frame = RgbImage::new(4, 4);
        assert!(!fanout.present(&frame, None).unwrap());
        assert!(tmp.path().join("frame_000000.png").exists());
    }
}
