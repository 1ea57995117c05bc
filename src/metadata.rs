// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX model metadata parsing.
//!
//! Ultralytics exports store the model description, task, input size and class
//! names as custom metadata properties on the ONNX graph. Values are YAML scalars
//! or Python-style dicts; this module reads the subset the detector needs.

use std::collections::HashMap;

use crate::error::{InferenceError, Result};

/// Keys Ultralytics writes as individual metadata properties.
pub const METADATA_KEYS: [&str; 7] = [
    "description",
    "version",
    "stride",
    "task",
    "batch",
    "imgsz",
    "names",
];

/// Metadata extracted from an exported model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    /// Model description, e.g. "Ultralytics YOLO11n model trained on garbage.yaml".
    pub description: String,
    /// Exporter version.
    pub version: String,
    /// Task name as written by the exporter (`detect`, `segment`, ...).
    /// Empty when the model carries no metadata.
    pub task: String,
    /// Model stride (typically 32).
    pub stride: u32,
    /// Batch size the model was exported with.
    pub batch: usize,
    /// Input image size as (height, width), if declared.
    pub imgsz: Option<(usize, usize)>,
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: String::new(),
            task: String::new(),
            stride: 32,
            batch: 1,
            imgsz: None,
            names: HashMap::new(),
        }
    }
}

impl ModelMetadata {
    /// Build metadata from individual key/value properties.
    ///
    /// Keys may be the separate Ultralytics properties (`task`, `names`, ...) or a
    /// single `metadata` property holding the whole YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric field is malformed.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        if let Some(yaml) = properties
            .get("metadata")
            .or_else(|| properties.get("model_metadata"))
        {
            return Self::from_yaml_str(yaml);
        }

        let mut keys: Vec<&String> = properties.keys().collect();
        keys.sort();
        let yaml = keys
            .into_iter()
            .map(|key| format!("{key}: {}", properties[key]))
            .collect::<Vec<_>>()
            .join("\n");
        Self::from_yaml_str(&yaml)
    }

    /// Parse metadata from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Metadata`] if `stride` or `batch` is not an integer.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut metadata = Self::default();

        for line in yaml_str.lines() {
            // Only top-level keys; indented lines belong to blocks parsed below.
            if line.starts_with(' ') || line.starts_with('\t') {
                continue;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = unquote(value);

            match key.trim() {
                "description" => metadata.description = value.to_string(),
                "version" => metadata.version = value.to_string(),
                "task" => metadata.task = value.to_lowercase(),
                "stride" => {
                    metadata.stride = value.parse().map_err(|_| {
                        InferenceError::Metadata(format!("Invalid stride value: {value}"))
                    })?;
                }
                "batch" => {
                    metadata.batch = value.parse().map_err(|_| {
                        InferenceError::Metadata(format!("Invalid batch value: {value}"))
                    })?;
                }
                _ => {}
            }
        }

        metadata.imgsz = parse_imgsz(yaml_str);
        metadata.names = parse_names(yaml_str);

        Ok(metadata)
    }

    /// Whether the model declares the detection task.
    #[must_use]
    pub fn is_detect(&self) -> bool {
        self.task == "detect"
    }

    /// Number of classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Class name by ID.
    #[must_use]
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Square canvas side implied by `imgsz`.
    #[must_use]
    pub fn canvas_size(&self) -> Option<usize> {
        self.imgsz.map(|(h, w)| h.max(w))
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'').trim_matches('"')
}

/// Parse `imgsz: [640, 640]`, `imgsz: 640` or a multi-line YAML list.
fn parse_imgsz(yaml_str: &str) -> Option<(usize, usize)> {
    let lines: Vec<&str> = yaml_str.lines().collect();
    let idx = lines.iter().position(|l| l.trim_start().starts_with("imgsz:"))?;
    let rest = lines[idx].trim_start().trim_start_matches("imgsz:").trim();

    if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.split(']').next()) {
        let values: Vec<usize> = inner
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        return match values.as_slice() {
            [h, w, ..] => Some((*h, *w)),
            [s] => Some((*s, *s)),
            [] => None,
        };
    }

    if let Ok(size) = rest.parse::<usize>() {
        return Some((size, size));
    }

    let values: Vec<usize> = lines[idx + 1..]
        .iter()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with('-'))
        .filter_map(|l| l.trim_start_matches('-').trim().parse().ok())
        .collect();
    match values.as_slice() {
        [h, w, ..] => Some((*h, *w)),
        [s] => Some((*s, *s)),
        [] => None,
    }
}

/// Parse `names` from a Python dict (`{0: 'bottle', 1: 'can'}`) or a YAML block.
fn parse_names(yaml_str: &str) -> HashMap<usize, String> {
    let mut names = HashMap::new();

    let Some(start) = yaml_str.find("names:") else {
        return names;
    };
    let after = yaml_str[start + "names:".len()..].trim_start();

    if let Some(body) = after.strip_prefix('{') {
        let body = body.split('}').next().unwrap_or_default();
        for entry in split_dict_entries(body) {
            if let Some((key, value)) = entry.split_once(':')
                && let Ok(class_id) = key.trim().parse::<usize>()
            {
                names.insert(class_id, unquote(value).to_string());
            }
        }
        return names;
    }

    // YAML block: indented `id: name` lines following the key.
    for line in after.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            break;
        };
        match key.trim().parse::<usize>() {
            Ok(class_id) => {
                names.insert(class_id, unquote(value).to_string());
            }
            Err(_) => break,
        }
    }

    names
}

/// Split a dict body on commas that are not inside quotes.
fn split_dict_entries(body: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in body.chars() {
        match (c, quote) {
            ('\'' | '"', None) => {
                quote = Some(c);
                current.push(c);
            }
            (q, Some(open)) if q == open => {
                quote = None;
                current.push(c);
            }
            (',', None) => entries.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        entries.push(current);
    }
    entries
}
