//! Run lifecycle: plan, fetch, then assemble whatever frames were written.
use crate::error::RunError;
use crate::fetch::{FetchEngine, FetchSummary, HttpFetcher, ImageFetcher};
use crate::frames::FrameWriter;
use crate::observer::{RunEvent, RunObserver, TracingObserver};
use crate::planner::{CatalogQuery, HttpCatalog, UrlPlanner};
use crate::settings::RunSettings;
use crate::video::VideoAssembler;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoOutcome {
    pub status: ExitStatus,
}

impl VideoOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    pub planned: usize,
    pub fetch: FetchSummary,
    pub frames: u32,
    pub cancelled: bool,
    pub frames_dir: PathBuf,
    pub video_path: PathBuf,
    /// `None` when no frames were written or assembly was switched off.
    pub video: Option<VideoOutcome>,
}

pub struct RunController {
    settings: RunSettings,
    catalog: Arc<dyn CatalogQuery>,
    fetcher: Arc<dyn ImageFetcher>,
    observer: Arc<dyn RunObserver>,
    assemble: bool,
}

impl RunController {
    /// Controller talking to the catalog and image host named in `settings`.
    pub fn new(settings: RunSettings) -> Result<Self, RunError> {
        let catalog_url = parse_url(&settings.catalog_url)?;
        let image_base = parse_url(&settings.image_base_url)?;
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        let catalog = Arc::new(HttpCatalog::new(client, catalog_url));
        let fetcher = Arc::new(HttpFetcher::new(image_base, settings.request_timeout())?);
        Ok(Self::with_parts(settings, catalog, fetcher))
    }

    pub fn with_parts(
        settings: RunSettings,
        catalog: Arc<dyn CatalogQuery>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            settings,
            catalog,
            fetcher,
            observer: Arc::new(TracingObserver),
            assemble: true,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fetch only; written frames are kept but no video is produced.
    pub fn without_video(mut self) -> Self {
        self.assemble = false;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Spawns the run onto the runtime so the caller stays responsive.
    pub fn start(self) -> RunHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.execute(cancel.clone()));
        RunHandle { cancel, task }
    }

    pub async fn execute(self, cancel: CancellationToken) -> Result<RunReport, RunError> {
        let settings = &self.settings;
        let range = settings.date_range()?;
        let name = settings.run_name();
        let frames_dir = settings.frames_dir();
        let video_path = settings.video_path();
        info!(
            "Run {name}: {} from {} to {}",
            settings.product.display_name(),
            range.start(),
            range.end()
        );

        let plan = UrlPlanner::new(self.catalog.clone())
            .plan(&range, &settings.product)
            .await;
        let planned = plan.len();
        self.observer.notify(RunEvent::Planned { items: planned });

        let writer =
            Arc::new(FrameWriter::prepare(&frames_dir, &settings.product.extension).await?);
        let engine = FetchEngine::new(self.fetcher.clone(), settings.concurrency);
        let fetch = engine
            .run(
                plan.into_items(),
                writer.clone(),
                self.observer.clone(),
                &cancel,
            )
            .await;
        self.observer.notify(RunEvent::FetchCompleted(fetch));

        let frames = writer.frame_count().await;
        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Run {name} cancelled with {frames} frames written");
            self.observer.notify(RunEvent::Cancelled { frames });
        }

        // A cancelled run still yields a (shorter) video from its frames
        let video = if self.assemble && frames > 0 {
            self.observer.notify(RunEvent::AssemblyStarted {
                frames,
                destination: video_path.clone(),
            });
            let assembler =
                VideoAssembler::new(&settings.ffmpeg, &frames_dir, &settings.product.extension);
            let status = assembler
                .assemble(frames, settings.framerate, &video_path)
                .await?;
            self.observer.notify(RunEvent::AssemblyFinished {
                success: status.success(),
                code: status.code(),
            });
            Some(VideoOutcome { status })
        } else {
            if frames == 0 {
                info!("No frames written, skipping video");
            }
            None
        };

        self.observer.notify(RunEvent::Completed { frames });
        Ok(RunReport {
            name,
            planned,
            fetch,
            frames,
            cancelled,
            frames_dir,
            video_path,
            video,
        })
    }
}

fn parse_url(url: &str) -> Result<Url, RunError> {
    Url::parse(url).map_err(|source| RunError::Url {
        url: url.to_string(),
        source,
    })
}

/// A run executing in the background.
pub struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<RunReport, RunError>>,
}

impl RunHandle {
    /// Stops workers from taking new items. Attempts in flight complete.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<RunReport, RunError> {
        self.task
            .await
            .map_err(|err| RunError::Aborted(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::fetch::FetchOutcome;
    use crate::planner::{CatalogRequest, FetchItem};
    use crate::product::ProductDescriptor;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::Path;

    struct FixedCatalog(Option<String>);

    #[async_trait]
    impl CatalogQuery for FixedCatalog {
        async fn query(&self, _request: &CatalogRequest) -> Result<String, PlanError> {
            self.0.clone().ok_or(PlanError::Malformed)
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl ImageFetcher for EchoFetcher {
        async fn fetch(&self, item: &FetchItem) -> FetchOutcome {
            FetchOutcome::Success(item.suffix.clone().into_bytes())
        }
    }

    fn settings(root: &Path) -> RunSettings {
        let mut settings = RunSettings::new(
            NaiveDate::from_ymd_opt(2023, 7, 21).unwrap(),
            NaiveDate::from_ymd_opt(2023, 7, 21).unwrap(),
            ProductDescriptor::new("P_*.jpg", "jpg", "SAT/SENSOR"),
        );
        settings.name = Some("test".to_string());
        settings.images_dir = root.join("Images");
        settings.videos_dir = root.join("Videos");
        settings
    }

    #[tokio::test]
    async fn test_unreachable_catalog_completes_with_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = RunController::with_parts(
            settings(tmp.path()),
            Arc::new(FixedCatalog(None)),
            Arc::new(EchoFetcher),
        );

        let report = controller.start().wait().await.unwrap();
        assert_eq!(report.planned, 0);
        assert_eq!(report.frames, 0);
        assert!(report.video.is_none());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_fetch_only_run_writes_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = FixedCatalog(Some("a/21JUL2023_1.jpg,a/21JUL2023_2.jpg".to_string()));
        let controller = RunController::with_parts(
            settings(tmp.path()),
            Arc::new(catalog),
            Arc::new(EchoFetcher),
        )
        .without_video();

        let report = controller
            .execute(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.frames, 2);
        assert!(report.video.is_none());
        assert_eq!(
            report.frames_dir,
            tmp.path().join("Images").join("SAT").join("SENSOR").join("test")
        );
        assert!(report.frames_dir.join("1.jpg").exists());
        assert!(report.frames_dir.join("2.jpg").exists());
    }

    #[tokio::test]
    async fn test_cancel_before_start_skips_assembly() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = FixedCatalog(Some("a.jpg,b.jpg,c.jpg".to_string()));
        let controller = RunController::with_parts(
            settings(tmp.path()),
            Arc::new(catalog),
            Arc::new(EchoFetcher),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = controller.execute(cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.frames, 0);
        assert_eq!(report.fetch.abandoned, 3);
        assert!(report.video.is_none());
    }

    #[test]
    fn test_rejects_bad_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = settings(tmp.path());
        settings.catalog_url = "not a url".to_string();
        assert!(matches!(
            RunController::new(settings),
            Err(RunError::Url { .. })
        ));
    }
}
