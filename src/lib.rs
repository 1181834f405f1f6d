pub mod catalog;
pub mod date_range;
pub mod error;
pub mod fetch;
pub mod frames;
pub mod observer;
pub mod planner;
pub mod product;
pub mod run;
pub mod settings;
pub mod video;

pub use date_range::DateRange;
pub use fetch::{FetchEngine, FetchOutcome, FetchSummary, HttpFetcher, ImageFetcher};
pub use frames::{FrameSink, FrameWriter};
pub use observer::{ChannelObserver, NoopObserver, RunEvent, RunObserver, TracingObserver};
pub use planner::{DownloadPlan, FetchItem, UrlPlanner};
pub use product::ProductDescriptor;
pub use run::{RunController, RunHandle, RunReport};
pub use settings::RunSettings;
pub use video::VideoAssembler;
