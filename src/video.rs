use crate::error::AssembleError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::info;

pub const DEFAULT_FRAMERATE: u32 = 24;
pub const DEFAULT_CONTAINER: &str = "mp4";

/// Pads odd frame dimensions up to even ones, which yuv420 encoding needs.
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// Turns the numbered frames of one run directory into a video with ffmpeg.
#[derive(Debug, Clone)]
pub struct VideoAssembler {
    program: PathBuf,
    frames_dir: PathBuf,
    extension: String,
}

impl VideoAssembler {
    pub fn new(program: &Path, frames_dir: &Path, extension: &str) -> Self {
        Self {
            program: program.to_path_buf(),
            frames_dir: frames_dir.to_path_buf(),
            extension: extension.to_string(),
        }
    }

    /// `<frames_dir>/%d.<ext>`, the encoder's numeric input pattern.
    pub fn input_pattern(&self) -> PathBuf {
        self.frames_dir.join(format!("%d.{}", self.extension))
    }

    pub fn args(&self, frame_count: u32, framerate: u32, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-loglevel",
            "quiet",
            "-stats",
            "-framerate",
            framerate.to_string().as_str(),
            "-start_number",
            "1",
            "-i",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(self.input_pattern().into_os_string());
        args.extend(
            [
                "-frames:v",
                frame_count.to_string().as_str(),
                "-vf",
                EVEN_PAD_FILTER,
                "-vcodec",
                "libx264",
                "-y",
                "-an",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(destination.as_os_str().to_owned());
        args
    }

    /// Runs the encoder over frames `1..=frame_count` and hands back its exit
    /// status as is.
    pub async fn assemble(
        &self,
        frame_count: u32,
        framerate: u32,
        destination: &Path,
    ) -> Result<ExitStatus, AssembleError> {
        if frame_count == 0 {
            return Err(AssembleError::NoFrames);
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AssembleError::Destination {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        info!("Generating video {destination:?} from {frame_count} frames at {framerate} fps");
        // ffmpeg reports progress on stderr, which stays attached
        let status = Command::new(&self.program)
            .args(self.args(frame_count, framerate, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| AssembleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        info!("Done! Exit code - {:?}", status.code());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(program: &str) -> VideoAssembler {
        VideoAssembler::new(Path::new(program), Path::new("Images/Run"), "jpg")
    }

    #[test]
    fn test_args_describe_contiguous_sequence() {
        let args = assembler("ffmpeg").args(46, 24, Path::new("Videos/Run.mp4"));
        let args = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        let after = |flag: &str| {
            let at = args.iter().position(|a| a == flag).unwrap();
            args[at + 1].clone()
        };
        assert_eq!(after("-framerate"), "24");
        assert_eq!(after("-start_number"), "1");
        assert_eq!(
            after("-i"),
            Path::new("Images/Run").join("%d.jpg").to_string_lossy()
        );
        assert_eq!(after("-frames:v"), "46");
        assert_eq!(after("-vf"), EVEN_PAD_FILTER);
        assert_eq!(args.last().unwrap(), "Videos/Run.mp4");
    }

    #[tokio::test]
    async fn test_refuses_empty_sequence() {
        let result = assembler("ffmpeg")
            .assemble(0, 24, Path::new("Videos/Run.mp4"))
            .await;
        assert!(matches!(result, Err(AssembleError::NoFrames)));
    }

    #[tokio::test]
    async fn test_missing_encoder_is_a_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = assembler("/nonexistent/encoder-binary")
            .assemble(3, 24, &tmp.path().join("out.mp4"))
            .await;
        assert!(matches!(result, Err(AssembleError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_is_surfaced() {
        let tmp = tempfile::tempdir().unwrap();
        let destination = tmp.path().join("Videos").join("out.mp4");

        let ok = assembler("true").assemble(3, 24, &destination).await.unwrap();
        assert!(ok.success());
        assert!(tmp.path().join("Videos").is_dir());

        let failed = assembler("false").assemble(3, 24, &destination).await.unwrap();
        assert!(!failed.success());
    }
}
