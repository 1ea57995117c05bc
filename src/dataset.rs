// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Dataset bookkeeping: adding new images to a YOLO dataset split.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{InferenceError, Result};
use crate::source::collect_images;

/// Extensions copied into a dataset.
pub const DATASET_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Default dataset root.
pub const DEFAULT_DATASET_ROOT: &str = "dataset_split";

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Train,
    Val,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Split {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            _ => Err(InferenceError::InvalidInput(format!(
                "Invalid split '{s}'. Choose 'train', 'val' or 'test'"
            ))),
        }
    }
}

/// Outcome of [`add_images_to_dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddImagesReport {
    /// Image files found in the source directory.
    pub found: usize,
    /// Files copied.
    pub copied: usize,
    /// Files left alone because the destination already had them.
    pub skipped: Vec<String>,
    /// `<root>/images/<split>`.
    pub destination: PathBuf,
    /// `<root>/labels/<split>`, where annotations for the new images belong.
    pub labels: PathBuf,
}

/// Copy the images of `source_dir` into `dataset_root/images/<split>`.
///
/// Existing files are never overwritten.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidInput`] if `source_dir` does not exist,
/// and [`InferenceError::Io`] if copying fails.
pub fn add_images_to_dataset(source_dir: &Path, dataset_root: &Path, split: Split) -> Result<AddImagesReport> {
    if !source_dir.is_dir() {
        return Err(InferenceError::InvalidInput(format!(
            "Directory does not exist: {}",
            source_dir.display()
        )));
    }

    let destination = dataset_root.join("images").join(split.to_string());
    let labels = dataset_root.join("labels").join(split.to_string());
    fs::create_dir_all(&destination)?;

    let images = collect_images(source_dir, &DATASET_EXTENSIONS)?;
    if images.is_empty() {
        warn!("No images found in {}", source_dir.display());
    }

    let mut copied = 0;
    let mut skipped = Vec::new();
    for image in &images {
        let Some(name) = image.file_name() else {
            continue;
        };
        let target = destination.join(name);
        if target.exists() {
            skipped.push(name.to_string_lossy().into_owned());
            continue;
        }
        fs::copy(image, &target)?;
        debug!("Copied {}", image.display());
        copied += 1;
    }

    Ok(AddImagesReport {
        found: images.len(),
        copied,
        skipped,
        destination,
        labels,
    })
}
