// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Window for live capture sessions.

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};

use crate::capture::FrameSink;
use crate::error::{InferenceError, Result};
use crate::results::Prediction;

/// A minifb window showing annotated frames. Esc or Q closes it.
pub struct Viewer {
    window: Window,
    width: usize,
    height: usize,
    buffer: Vec<u32>,
}

impl Viewer {
    /// Open a window of the given initial size.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Visualizer`] if no window can be created
    /// (for example without a display).
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| InferenceError::Visualizer(format!("Failed to create window: {e}")))?;

        // ~60 Hz
        window.set_target_fps(60);

        Ok(Self {
            window,
            width,
            height,
            buffer: Vec::new(),
        })
    }

    /// Whether the user closed the window.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.window.is_open()
            || self.window.is_key_down(Key::Escape)
            || self.window.is_key_down(Key::Q)
    }

    /// Show one frame. Returns `false` once the window was closed.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Visualizer`] if the window rejects the buffer.
    pub fn show(&mut self, frame: &RgbImage) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }

        let (width, height) = (frame.width() as usize, frame.height() as usize);
        self.buffer.clear();
        // minifb expects 0x00RRGGBB
        self.buffer.extend(
            frame
                .pixels()
                .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2])),
        );
        self.width = width;
        self.height = height;

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| InferenceError::Visualizer(format!("Failed to update window: {e}")))?;
        Ok(true)
    }
}

impl FrameSink for Viewer {
    fn present(&mut self, frame: &RgbImage, _prediction: Option<&Prediction>) -> Result<bool> {
        self.show(frame)
    }
}
