// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection rendering.
//!
//! [`Annotator`] draws one rectangle and one `"{class} {confidence:.2}"` label
//! per detection and returns the per-class counts of what it drew.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::error::{InferenceError, Result};
use crate::results::{ClassCount, Detection};

/// Assets URL for downloading fonts
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Default label font.
pub const DEFAULT_FONT: &str = "Arial.ttf";

const BOX_THICKNESS: i32 = 3;
const LABEL_SCALE: f32 = 16.0;
const LABEL_PAD: u32 = 2;

/// Ultralytics Color Palette
pub const COLORS: [[u8; 3]; 20] = [
    [4, 42, 255],    // #042aff
    [11, 219, 235],  // #0bdbeb
    [243, 243, 243], // #f3f3f3
    [0, 223, 183],   // #00dfb7
    [17, 31, 104],   // #111f68
    [255, 111, 221], // #ff6fdd
    [255, 68, 79],   // #ff444f
    [204, 237, 0],   // #cced00
    [0, 243, 68],    // #00f344
    [189, 0, 255],   // #bd00ff
    [0, 180, 255],   // #00b4ff
    [221, 0, 186],   // #dd00ba
    [0, 255, 255],   // #00ffff
    [38, 192, 0],    // #26c000
    [1, 255, 179],   // #01ffb3
    [125, 36, 255],  // #7d24ff
    [123, 0, 104],   // #7b0068
    [255, 27, 108],  // #ff1b6c
    [252, 109, 47],  // #fc6d2f
    [162, 255, 11],  // #a2ff0b
];

/// Get color for a class ID
#[must_use]
pub const fn get_class_color(class_id: usize) -> Rgb<u8> {
    Rgb(COLORS[class_id % COLORS.len()])
}

/// Label text for one detection.
#[must_use]
pub fn label(det: &Detection) -> String {
    format!("{} {:.2}", det.class_name, det.confidence)
}

/// Check if font exists locally or download it
///
/// Fonts are cached in the user config directory under `Ultralytics/`.
#[must_use]
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy().into_owned();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(&font_name);

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        warn!("Failed to create config directory: {e}");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    info!("Downloading {url} to {}", font_path.display());

    let response = match ureq::get(&url).call() {
        Ok(response) => response,
        Err(e) => {
            warn!("Failed to download font from {url}: {e}");
            return None;
        }
    };

    let mut file = match File::create(&font_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create font file: {e}");
            return None;
        }
    };
    let mut reader = response.into_body().into_reader();
    if let Err(e) = io::copy(&mut reader, &mut file) {
        warn!("Failed to download font: {e}");
        let _ = fs::remove_file(&font_path);
        return None;
    }

    Some(font_path)
}

/// Draws detections onto frames.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl Annotator {
    /// Annotator with the default font, downloading it on first use.
    ///
    /// Without a font only boxes are drawn.
    #[must_use]
    pub fn new() -> Self {
        let font = check_font(DEFAULT_FONT).and_then(|path| match Self::with_font(&path) {
            Ok(annotator) => annotator.font,
            Err(e) => {
                warn!("{e}");
                None
            }
        });
        Self { font }
    }

    /// Annotator with a font read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`] if the file cannot be read and
    /// [`InferenceError::Visualizer`] if it is not a usable font.
    pub fn with_font(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let font = FontVec::try_from_vec(data).map_err(|e| {
            InferenceError::Visualizer(format!("Invalid font {}: {e}", path.display()))
        })?;
        Ok(Self { font: Some(font) })
    }

    /// Annotator that draws boxes only.
    #[must_use]
    pub const fn without_font() -> Self {
        Self { font: None }
    }

    /// Whether labels can be drawn.
    #[must_use]
    pub const fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `detections` onto `img` and count them per class.
    ///
    /// An empty slice leaves the image untouched and returns empty counts.
    pub fn render(&self, img: &mut RgbImage, detections: &[Detection]) -> ClassCount {
        for det in detections {
            self.draw_detection(img, det);
        }
        ClassCount::from_detections(detections)
    }

    /// Copy `image` to RGB and render `detections` onto the copy.
    #[must_use]
    pub fn annotate(&self, image: &DynamicImage, detections: &[Detection]) -> (RgbImage, ClassCount) {
        let mut img = image.to_rgb8();
        let counts = self.render(&mut img, detections);
        (img, counts)
    }

    /// Draw an `FPS: x.x` overlay in the top-left corner.
    pub fn draw_fps(&self, img: &mut RgbImage, fps: f64) {
        if let Some(font) = &self.font {
            let text = format!("FPS: {fps:.1}");
            draw_text_mut(img, Rgb([0, 255, 0]), 10, 10, PxScale::from(24.0), font, &text);
        }
    }

    fn draw_detection(&self, img: &mut RgbImage, det: &Detection) {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);

        let mut x1 = det.x1.round() as i32;
        let mut y1 = det.y1.round() as i32;
        let mut x2 = det.x2.round() as i32;
        let mut y2 = det.y2.round() as i32;
        if x1 > x2 {
            std::mem::swap(&mut x1, &mut x2);
        }
        if y1 > y2 {
            std::mem::swap(&mut y1, &mut y2);
        }
        let (x1, y1) = (x1.clamp(0, max_x), y1.clamp(0, max_y));
        let (x2, y2) = (x2.clamp(0, max_x), y2.clamp(0, max_y));
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        let color = get_class_color(det.class_id);
        for t in 0..BOX_THICKNESS {
            let (tx1, ty1) = ((x1 + t).min(x2), (y1 + t).min(y2));
            let (tx2, ty2) = ((x2 - t).max(tx1), (y2 - t).max(ty1));
            if tx2 > tx1 && ty2 > ty1 {
                let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
                draw_hollow_rect_mut(img, rect, color);
            }
        }

        let Some(font) = &self.font else {
            return;
        };
        let text = label(det);
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = text_size(scale, font, &text);
        let (box_w, box_h) = (text_w + 2 * LABEL_PAD, text_h + 2 * LABEL_PAD);

        let (label_x, label_y) = label_origin(x1, y1, (box_w, box_h), width);
        draw_filled_rect_mut(img, Rect::at(label_x, label_y).of_size(box_w, box_h), color);

        let text_color = if luminance(color) > 150.0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        };
        draw_text_mut(
            img,
            text_color,
            label_x + LABEL_PAD as i32,
            label_y + LABEL_PAD as i32,
            scale,
            font,
            &text,
        );
    }
}

/// Top-left corner of a `label` sized background for a box whose top-left is `(x1, y1)`.
///
/// Above the box when there is room, otherwise just inside it; shifted left so
/// it ends at the right edge of an image `width` wide.
fn label_origin(x1: i32, y1: i32, label: (u32, u32), width: u32) -> (i32, i32) {
    let (label_w, label_h) = label;
    let y = if y1 >= label_h as i32 { y1 - label_h as i32 } else { y1 };
    let x = x1.min(width.saturating_sub(label_w) as i32).max(0);
    (x, y)
}

fn luminance(color: Rgb<u8>) -> f32 {
    let [r, g, b] = color.0;
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xyxy: [f32; 4], class_id: usize, name: &str) -> Detection {
        Detection {
            x1: xyxy[0],
            y1: xyxy[1],
            x2: xyxy[2],
            y2: xyxy[3],
            confidence: 0.876,
            class_id,
            class_name: name.to_string(),
        }
    }

    #[test]
    fn test_label_format() {
        assert_eq!(label(&det([0.0; 4], 0, "bottle")), "bottle 0.88");
    }

    #[test]
    fn test_empty_detections_leave_image_unchanged() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 16, Rgb([9, 9, 9])));
        let (out, counts) = Annotator::without_font().annotate(&image, &[]);
        assert_eq!(out, image.to_rgb8());
        assert!(counts.is_empty());
    }

    #[test]
    fn test_render_draws_box_and_counts() {
        let mut img = RgbImage::new(50, 50);
        let counts = Annotator::without_font().render(
            &mut img,
            &[
                det([10.0, 10.0, 40.0, 40.0], 0, "bottle"),
                det([5.0, 5.0, 20.0, 20.0], 0, "bottle"),
            ],
        );
        assert_eq!(counts.get("bottle"), Some(2));
        assert_eq!(*img.get_pixel(10, 25), get_class_color(0));
        // Interior untouched.
        assert_eq!(*img.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_out_of_bounds_boxes_do_not_panic() {
        let mut img = RgbImage::new(20, 20);
        let counts = Annotator::without_font().render(
            &mut img,
            &[
                det([-100.0, -100.0, 500.0, 500.0], 3, "can"),
                det([15.0, 15.0, 2.0, 2.0], 1, "bag"),
                det([5.0, 5.0, 5.0, 5.0], 2, "cup"),
            ],
        );
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_label_origin_above_box() {
        assert_eq!(label_origin(30, 40, (50, 20), 200), (30, 20));
        assert_eq!(label_origin(30, 20, (50, 20), 200), (30, 0));
    }

    #[test]
    fn test_label_origin_near_top_edge_goes_inside() {
        assert_eq!(label_origin(30, 5, (50, 20), 200), (30, 5));
        assert_eq!(label_origin(0, 0, (50, 20), 200), (0, 0));
    }

    #[test]
    fn test_label_origin_stays_within_width() {
        // Box near the right edge: the label ends at the edge.
        assert_eq!(label_origin(180, 40, (50, 20), 200), (150, 20));
        // Image narrower than the label: pinned to the left edge.
        assert_eq!(label_origin(10, 40, (50, 20), 30), (0, 20));
    }

    #[test]
    fn test_with_font_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = Annotator::with_font(&tmp.path().join("missing.ttf")).unwrap_err();
        assert!(matches!(missing, InferenceError::Io(_)));

        let bogus = tmp.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").unwrap();
        let invalid = Annotator::with_font(&bogus).unwrap_err();
        assert!(matches!(invalid, InferenceError::Visualizer(_)));
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(get_class_color(0), get_class_color(COLORS.len()));
    }
}
