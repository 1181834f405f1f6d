use crate::date_range::DateRange;
use crate::error::RangeError;
use crate::fetch::{DEFAULT_CONCURRENCY, IMAGE_BASE_URL};
use crate::planner::CATALOG_URL;
use crate::product::ProductDescriptor;
use crate::video::{DEFAULT_CONTAINER, DEFAULT_FRAMERATE};
use anyhow::{ensure, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything one run needs, read from a TOML file.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub product: ProductDescriptor,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_framerate() -> u32 {
    DEFAULT_FRAMERATE
}
fn default_images_dir() -> PathBuf {
    PathBuf::from("Images")
}
fn default_videos_dir() -> PathBuf {
    PathBuf::from("Videos")
}
fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}
fn default_catalog_url() -> String {
    CATALOG_URL.to_string()
}
fn default_image_base_url() -> String {
    IMAGE_BASE_URL.to_string()
}
fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl RunSettings {
    pub fn new(start: NaiveDate, end: NaiveDate, product: ProductDescriptor) -> Self {
        Self {
            name: None,
            start,
            end,
            product,
            concurrency: default_concurrency(),
            framerate: default_framerate(),
            images_dir: default_images_dir(),
            videos_dir: default_videos_dir(),
            container: default_container(),
            catalog_url: default_catalog_url(),
            image_base_url: default_image_base_url(),
            ffmpeg: default_ffmpeg(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let settings: Self = toml::from_str(&table.to_string())?;
        Ok(settings)
    }

    pub fn template() -> toml::Table {
        toml::toml! {
            name = "Shortwave_Infrared_21Jul2023_22Jul2023"

            start = "2023-07-21"

            end = "2023-07-22"

            concurrency = 25

            framerate = 24

            images_dir = "Images"

            videos_dir = "Videos"

            container = "mp4"

            ffmpeg = "ffmpeg"

            [product]
            name = "Shortwave Infrared"
            pattern = "3DIMG_*_L1C_SIR_V*.jpg"
            extension = "jpg"
            path = "INSAT-3D/IMAGER/Standard(Full Disk)/Shortwave Infrared"
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.start <= self.end,
            "start date {} is after end date {}",
            self.start,
            self.end
        );
        ensure!(self.concurrency >= 1, "concurrency must be at least 1");
        ensure!(self.framerate >= 1, "framerate must be at least 1");
        ensure!(!self.product.pattern.is_empty(), "product pattern is empty");
        Ok(())
    }

    pub fn date_range(&self) -> Result<DateRange, RangeError> {
        DateRange::new(self.start, self.end)
    }

    /// Explicit name, or `<product>_<start>_<end>`, with whitespace and path
    /// separators folded into `_`.
    pub fn run_name(&self) -> String {
        let raw = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!(
                "{}_{}_{}",
                self.product.display_name(),
                self.start.format("%d%b%Y"),
                self.end.format("%d%b%Y")
            ),
        };
        sanitize_name(&raw)
    }

    /// `Images/<product-path>/<run-name>`
    pub fn frames_dir(&self) -> PathBuf {
        self.product
            .storage_dir(&self.images_dir)
            .join(self.run_name())
    }

    /// `Videos/<run-name>.<container>`
    pub fn video_path(&self) -> PathBuf {
        self.videos_dir
            .join(format!("{}.{}", self.run_name(), self.container))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn sanitize_name(raw: &str) -> String {
    let re = Regex::new(r"[\s/\\]+").expect("Regex pattern should always compile");
    re.replace_all(raw.trim(), "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE_PATH: &str = "/tmp/timelapse_settings_template.toml";

    #[test]
    fn test_template() {
        let settings = RunSettings::from_template(&RunSettings::template()).unwrap();
        assert_eq!(settings.product.pattern, "3DIMG_*_L1C_SIR_V*.jpg");
        assert_eq!(settings.concurrency, 25);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_write_and_read_toml() {
        let settings = RunSettings::from_template(&RunSettings::template()).unwrap();
        settings.write(TEMPLATE_PATH).unwrap();

        let read = RunSettings::read(TEMPLATE_PATH).unwrap();
        assert_eq!(read, settings);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings: RunSettings = toml::from_str(
            r#"
            start = "2023-07-21"
            end = "2023-07-21"
            [product]
            pattern = "3DIMG_*_L1C_SIR_V*.jpg"
            "#,
        )
        .unwrap();
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.framerate, DEFAULT_FRAMERATE);
        assert_eq!(settings.product.extension, "jpg");
        assert_eq!(settings.catalog_url, CATALOG_URL);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = RunSettings::from_template(&RunSettings::template()).unwrap();
        settings.concurrency = 0;
        assert!(settings.validate().is_err());

        let mut settings = RunSettings::from_template(&RunSettings::template()).unwrap();
        settings.start = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_derived_run_name_and_paths() {
        let product = ProductDescriptor::new(
            "3DIMG_*_L1C_SIR_V*.jpg",
            "jpg",
            "INSAT-3D/IMAGER/Shortwave Infrared",
        );
        let mut settings = RunSettings::new(
            NaiveDate::from_ymd_opt(2023, 7, 21).unwrap(),
            NaiveDate::from_ymd_opt(2023, 7, 22).unwrap(),
            product,
        );
        assert_eq!(settings.run_name(), "Shortwave_Infrared_21Jul2023_22Jul2023");
        assert_eq!(
            settings.frames_dir(),
            Path::new("Images")
                .join("INSAT-3D")
                .join("IMAGER")
                .join("Shortwave Infrared")
                .join("Shortwave_Infrared_21Jul2023_22Jul2023")
        );

        settings.name = Some(" my  run/one ".to_string());
        assert_eq!(settings.run_name(), "my_run_one");
        assert_eq!(settings.video_path(), Path::new("Videos").join("my_run_one.mp4"));
    }
}
