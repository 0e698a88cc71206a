//! Derivative builder for georeferenced maps.
//!
//! Copies the tile pyramid behind each georeferenced map into a local,
//! size-bounded IIIF level 0 image and rewrites the map's georeference
//! annotation to point at it.

pub mod annotation;
pub mod config;
pub mod download;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod scheduler;
pub mod stats;

pub use config::DownloaderConfig;
pub use download::{Fetcher, HttpFetcher};
pub use error::{MapError, TransferError};
pub use pipeline::{MapOutcome, Pipeline};
pub use scheduler::Scheduler;
pub use stats::{RunStats, StatsSnapshot};
