//! Pipeline stages and their orchestration.

mod collector;
mod fetcher;
mod metrics;
mod orchestrator;
mod separator;
mod uploader;


pub use collector::{Stem, StemCollector};
pub use fetcher::{SourceFetcher, StagedAsset};
pub use metrics::{Metrics, MetricsSnapshot, Stage};
pub use orchestrator::{JobOutcome, JobReport, Orchestrator, Phase};
pub use separator::Separator;
pub use uploader::ChannelUploader;
