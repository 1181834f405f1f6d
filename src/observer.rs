//! Run events for hosts that want feedback (progress bars, log panes) without
//! the pipeline keeping any global state of its own.
use crate::fetch::FetchSummary;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Planned {
        items: usize,
    },
    ItemSucceeded {
        sequence_index: u32,
        frame: u32,
    },
    ItemMissing {
        sequence_index: u32,
    },
    ItemFailed {
        sequence_index: u32,
        reason: String,
    },
    Cancelled {
        frames: u32,
    },
    FetchCompleted(FetchSummary),
    AssemblyStarted {
        frames: u32,
        destination: PathBuf,
    },
    AssemblyFinished {
        success: bool,
        code: Option<i32>,
    },
    Completed {
        frames: u32,
    },
}

pub trait RunObserver: Send + Sync {
    fn notify(&self, event: RunEvent);
}

pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn notify(&self, _event: RunEvent) {}
}

/// Forwards events to `tracing`. This is the default observer of a run.
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn notify(&self, event: RunEvent) {
        match event {
            RunEvent::Planned { items } => info!("Downloading {items} images..."),
            RunEvent::ItemSucceeded {
                sequence_index,
                frame,
            } => debug!("Item {sequence_index} saved as frame {frame}"),
            RunEvent::ItemMissing { sequence_index } => {
                debug!("Item {sequence_index} is missing")
            }
            RunEvent::ItemFailed {
                sequence_index,
                reason,
            } => debug!("Item {sequence_index} dropped: {reason}"),
            RunEvent::Cancelled { frames } => warn!("Cancelled after {frames} frames"),
            RunEvent::FetchCompleted(summary) => info!(
                "Downloads finished: {} frames, {} missing, {} failed",
                summary.succeeded, summary.not_found, summary.failed
            ),
            RunEvent::AssemblyStarted {
                frames,
                destination,
            } => info!("Encoding {frames} frames into {destination:?}"),
            RunEvent::AssemblyFinished { success, code } => {
                if success {
                    info!("Encoder finished");
                } else {
                    warn!("Encoder failed with exit code {code:?}");
                }
            }
            RunEvent::Completed { frames } => info!("Run complete with {frames} frames"),
        }
    }
}

/// Forwards events to a channel, dropping them once the receiver is gone.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl RunObserver for ChannelObserver {
    fn notify(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_observer_logs_events() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingObserver.notify(RunEvent::Planned { items: 3 });
            TracingObserver.notify(RunEvent::ItemFailed {
                sequence_index: 2,
                reason: "HTTP status 503".to_string(),
            });
            TracingObserver.notify(RunEvent::AssemblyFinished {
                success: false,
                code: Some(1),
            });
        });

        let logged = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Downloading 3 images"));
        assert!(logged.contains("Item 2 dropped: HTTP status 503"));
        assert!(logged.contains("WARN"));
        assert!(logged.contains("Encoder failed with exit code Some(1)"));
    }

    #[test]
    fn test_channel_observer_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);
        observer.notify(RunEvent::Planned { items: 3 });
        assert_eq!(rx.try_recv().unwrap(), RunEvent::Planned { items: 3 });
    }

    #[test]
    fn test_channel_observer_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelObserver::new(tx).notify(RunEvent::Completed { frames: 0 });
    }
}
