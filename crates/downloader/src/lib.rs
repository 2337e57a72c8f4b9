//! The download engine: accepts detected streams, fetches their segments
//! under a concurrency budget, and assembles playable output files.
//!
//! The [`Scheduler`] is the public surface. Each job runs as its own
//! cooperative task; the only mutable state shared with callers is the job
//! table snapshot and a per-job cancellation token.

pub mod config;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod helper;
mod job;
pub mod process;
pub mod progress;
pub mod retry;
pub mod sanitize;
pub mod scheduler;

pub use config::{EngineConfig, HelperConfig, HttpConfig};
pub use encoder::EncoderAdapter;
pub use error::DownloadError;
pub use fetch::HttpFetcher;
pub use scheduler::{EventSinks, Scheduler};
