use crate::error::FrameError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Destination for successfully fetched images.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Stores one image and returns the frame number it was given.
    async fn write(&self, bytes: &[u8]) -> Result<u32, FrameError>;
}

/// Writes frames as `<dir>/<n>.<ext>` with `n` counting successful writes from
/// 1. Number allocation and the write itself happen under one lock, so
/// concurrent callers never share a number and never leave a gap.
pub struct FrameWriter {
    dir: PathBuf,
    extension: String,
    written: Mutex<u32>,
}

impl FrameWriter {
    /// Creates `dir` if needed. Frames left in it by an earlier run are removed
    /// so the new sequence replaces them instead of mixing with them.
    pub async fn prepare(dir: &Path, extension: &str) -> Result<Self, FrameError> {
        let prepare_err = |source| FrameError::Prepare {
            path: dir.to_path_buf(),
            source,
        };

        if fs::try_exists(dir).await.map_err(prepare_err)? {
            warn!("{dir:?} already exists, its frames will be overwritten");
            let mut entries = fs::read_dir(dir).await.map_err(prepare_err)?;
            while let Some(entry) = entries.next_entry().await.map_err(prepare_err)? {
                let path = entry.path();
                if is_frame_file(&path, extension) {
                    fs::remove_file(&path).await.map_err(prepare_err)?;
                }
            }
        } else {
            fs::create_dir_all(dir).await.map_err(prepare_err)?;
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
            written: Mutex::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn frame_path(&self, number: u32) -> PathBuf {
        self.dir.join(format!("{number}.{}", self.extension))
    }

    pub async fn frame_count(&self) -> u32 {
        *self.written.lock().await
    }
}

#[async_trait]
impl FrameSink for FrameWriter {
    async fn write(&self, bytes: &[u8]) -> Result<u32, FrameError> {
        let mut written = self.written.lock().await;
        let number = *written + 1;
        let path = self.frame_path(number);

        // Write aside and rename so a failed write never leaves a short frame
        let partial = self.dir.join(format!("{number}.{}.partial", self.extension));
        let write_err = |source| FrameError::Write {
            path: path.clone(),
            source,
        };
        let stored = match fs::write(&partial, bytes).await {
            Ok(()) => fs::rename(&partial, &path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = stored {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                debug!("Could not remove {partial:?}: {cleanup}");
            }
            return Err(write_err(err));
        }

        *written = number;
        debug!("Wrote frame {path:?}");
        Ok(number)
    }
}

fn is_frame_file(path: &Path, extension: &str) -> bool {
    let numbered = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.parse::<u32>().is_ok());
    let matching_ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
    numbered && matching_ext
}
