use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSION: &str = "jpg";

/// Identifies one family of remote images. Produced once (from the product
/// catalog or from run settings) and only read by the pipeline.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ProductDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Catalog pattern, e.g. `3DIMG_*_L1C_ASIA_MER_BIMG_V*.jpg`.
    pub pattern: String,
    /// Extension of downloaded frames, without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Storage sub-path below the images directory.
    #[serde(default)]
    pub path: String,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl ProductDescriptor {
    pub fn new(pattern: &str, extension: &str, path: &str) -> Self {
        Self {
            name: None,
            pattern: pattern.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            path: path.to_string(),
        }
    }

    /// Descriptor whose extension is taken from the pattern's own suffix.
    pub fn from_pattern(pattern: &str, path: &str) -> Self {
        Self::new(pattern, &extension_of(pattern), path)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Human readable name: explicit name, else the last path segment, else
    /// the pattern.
    pub fn display_name(&self) -> &str {
        if let Some(name) = self.name.as_deref() {
            return name;
        }
        self.path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.pattern)
    }

    /// `images_dir/<path>` with each `/`-separated segment as a directory.
    pub fn storage_dir(&self, images_dir: &Path) -> PathBuf {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(images_dir.to_path_buf(), |dir, segment| dir.join(segment))
    }
}

fn extension_of(pattern: &str) -> String {
    Path::new(pattern)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.contains('*'))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(default_extension)
}
