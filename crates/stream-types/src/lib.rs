//! Shared data model for the companion download engine.
//!
//! Everything in this crate crosses the native-messaging boundary to the
//! browser extension, so all wire-visible structs serialize with camelCase
//! field names and lowercase enum discriminants.

mod job;
mod quality;
mod stream;

pub use job::{DownloadJob, DownloadProgress, DownloadStatus};
pub use quality::{AudioTrack, Resolution, VideoQuality, quality_label};
pub use stream::{DetectedStream, Protection, StreamType};

/// Current UNIX time in milliseconds, the timestamp unit used on the wire.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
