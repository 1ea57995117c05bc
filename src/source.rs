// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Input sources.
//!
//! A source string from the command line is classified once into a [`Source`]:
//! a camera index, a stream URL, a video file, an image directory or a single
//! image.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::error::{InferenceError, Result};

/// Extensions read as still images.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

/// Extensions read as video files.
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpeg", "mpg",
];

/// Represents different input sources for inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Path to an image file.
    Image(PathBuf),
    /// Directory containing images.
    Directory(PathBuf),
    /// Path to a video file.
    Video(PathBuf),
    /// Camera device index.
    Webcam(u32),
    /// Streaming URL (RTSP, RTMP, HTTP).
    Stream(String),
}

impl Source {
    /// Check if this source produces a live or recorded frame stream.
    #[must_use]
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::Video(_) | Self::Webcam(_) | Self::Stream(_))
    }

    /// Still images this source refers to, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidInput`] for video sources, missing
    /// paths and directories without images.
    pub fn image_paths(&self) -> Result<Vec<PathBuf>> {
        match self {
            Self::Image(path) if path.is_file() => Ok(vec![path.clone()]),
            Self::Image(path) => Err(InferenceError::InvalidInput(format!(
                "Image not found: {}",
                path.display()
            ))),
            Self::Directory(dir) => {
                let images = collect_images(dir, &IMAGE_EXTENSIONS)?;
                if images.is_empty() {
                    return Err(InferenceError::InvalidInput(format!(
                        "No images found in {}",
                        dir.display()
                    )));
                }
                Ok(images)
            }
            _ => Err(InferenceError::InvalidInput(format!(
                "{self} is not an image source"
            ))),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(p) | Self::Directory(p) | Self::Video(p) => write!(f, "{}", p.display()),
            Self::Webcam(idx) => write!(f, "camera {idx}"),
            Self::Stream(url) => write!(f, "{url}"),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if let Ok(idx) = s.parse::<u32>() {
            return Self::Webcam(idx);
        }

        if ["rtsp://", "rtmp://", "http://", "https://"]
            .iter()
            .any(|scheme| s.starts_with(scheme))
        {
            return Self::Stream(s.to_string());
        }

        let path = PathBuf::from(s);
        if path.is_dir() {
            return Self::Directory(path);
        }
        if has_extension(&path, &VIDEO_EXTENSIONS) {
            return Self::Video(path);
        }
        Self::Image(path)
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// Whether `path` ends in one of `extensions` (case-insensitive).
#[must_use]
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

/// Whether `path` names a still image by extension.
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    has_extension(path, &IMAGE_EXTENSIONS)
}

/// Files directly inside `dir` whose extension is in `extensions`, sorted.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidInput`] if `dir` is not a directory, and
/// [`InferenceError::Io`] if it cannot be listed.
pub fn collect_images(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(InferenceError::InvalidInput(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    images.sort();
    Ok(images)
}

/// Open an image file.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidInput`] if the file is missing or not a
/// decodable image.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| {
        InferenceError::InvalidInput(format!("Failed to load image {}: {e}", path.display()))
    })
}
