//! Fetch engine: a fixed pool of workers draining a pre-loaded FIFO queue.
//!
//! Every item gets exactly one attempt. Misses and failures are logged and
//! dropped, successes go to the [`FrameSink`]. Cancellation is checked by each
//! worker before it dequeues its next item; attempts already in flight finish.
use crate::frames::FrameSink;
use crate::observer::{RunEvent, RunObserver};
use crate::planner::FetchItem;
use async_trait::async_trait;
use futures_util::FutureExt;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::ops::AddAssign;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_CONCURRENCY: usize = 25;
pub const IMAGE_BASE_URL: &str = "https://mosdac.gov.in/look/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<u8>),
    NotFound,
    HttpError(u16),
    TransportError(String),
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, item: &FetchItem) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpFetcher {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, item: &FetchItem) -> FetchOutcome {
        let url = match item.url(&self.base) {
            Ok(url) => url,
            Err(err) => return FetchOutcome::TransportError(err.to_string()),
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => return FetchOutcome::TransportError(err.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            return FetchOutcome::HttpError(status.as_u16());
        }

        match response.bytes().await {
            Ok(bytes) => FetchOutcome::Success(bytes.to_vec()),
            Err(err) => FetchOutcome::TransportError(err.to_string()),
        }
    }
}

/// Tally of one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Items that ended up as frames.
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Items left in the queue because the run was cancelled.
    pub abandoned: usize,
}

impl AddAssign for FetchSummary {
    fn add_assign(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.not_found += other.not_found;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
    }
}

pub struct FetchEngine {
    fetcher: Arc<dyn ImageFetcher>,
    concurrency: usize,
}

impl FetchEngine {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Drains `items` through the worker pool. Returns once the queue is empty
    /// or, after cancellation, once every worker has finished its current item.
    pub async fn run(
        &self,
        items: Vec<FetchItem>,
        sink: Arc<dyn FrameSink>,
        observer: Arc<dyn RunObserver>,
        cancel: &CancellationToken,
    ) -> FetchSummary {
        let total = items.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let workers = self.concurrency.min(total);
        info!("Fetching {total} items with {workers} workers");

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                queue: queue.clone(),
                fetcher: self.fetcher.clone(),
                sink: sink.clone(),
                observer: observer.clone(),
                cancel: cancel.clone(),
            };
            pool.spawn(worker.run());
        }

        let mut summary = FetchSummary::default();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(tally) => summary += tally,
                Err(err) => error!("Fetch worker aborted: {err}"),
            }
        }

        summary.abandoned = queue.lock().await.len();
        if summary.abandoned > 0 {
            info!("{} items abandoned after cancellation", summary.abandoned);
        }
        info!(
            "Fetched {} of {total} items ({} missing, {} failed)",
            summary.succeeded, summary.not_found, summary.failed
        );
        summary
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<FetchItem>>>,
    fetcher: Arc<dyn ImageFetcher>,
    sink: Arc<dyn FrameSink>,
    observer: Arc<dyn RunObserver>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> FetchSummary {
        let mut tally = FetchSummary::default();
        loop {
            if self.cancel.is_cancelled() {
                debug!("Worker {} stopping on cancellation", self.id);
                break;
            }
            let Some(item) = self.queue.lock().await.pop_front() else {
                break;
            };
            // A panicking fetcher or sink costs this item, not the worker
            match AssertUnwindSafe(self.process(&item)).catch_unwind().await {
                Ok(outcome) => tally += outcome,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(
                        "Item {} ({}) panicked: {reason}",
                        item.sequence_index, item.suffix
                    );
                    tally += self.fail(item.sequence_index, reason);
                }
            }
        }
        tally
    }

    /// Attempts one item and returns its contribution to the tally.
    async fn process(&self, item: &FetchItem) -> FetchSummary {
        let index = item.sequence_index;
        match self.fetcher.fetch(item).await {
            FetchOutcome::Success(bytes) => match self.sink.write(&bytes).await {
                Ok(frame) => {
                    self.observer.notify(RunEvent::ItemSucceeded {
                        sequence_index: index,
                        frame,
                    });
                    FetchSummary {
                        succeeded: 1,
                        ..Default::default()
                    }
                }
                Err(err) => {
                    error!("Item {index} ({}): {err}", item.suffix);
                    self.fail(index, err.to_string())
                }
            },
            FetchOutcome::NotFound => {
                debug!("Item {index} ({}) not found", item.suffix);
                self.observer
                    .notify(RunEvent::ItemMissing { sequence_index: index });
                FetchSummary {
                    not_found: 1,
                    ..Default::default()
                }
            }
            FetchOutcome::HttpError(status) => {
                warn!("Item {index} ({}) failed with status {status}", item.suffix);
                self.fail(index, format!("HTTP status {status}"))
            }
            FetchOutcome::TransportError(cause) => {
                error!("Item {index} ({}): {cause}", item.suffix);
                self.fail(index, cause)
            }
        }
    }

    fn fail(&self, sequence_index: u32, reason: String) -> FetchSummary {
        self.observer.notify(RunEvent::ItemFailed {
            sequence_index,
            reason,
        });
        FetchSummary {
            failed: 1,
            ..Default::default()
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
