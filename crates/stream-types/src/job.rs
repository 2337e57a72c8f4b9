use serde::{Deserialize, Serialize};

use crate::quality::{AudioTrack, VideoQuality};
use crate::stream::DetectedStream;

/// Lifecycle of a download job.
///
/// Legal transitions form a DAG: `pending → downloading → merging → completed`,
/// with `cancelled` reachable from `pending`/`downloading` and `failed` from
/// any non-terminal state. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Merging,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Point-in-time transfer counters for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    /// Known or estimated total; `0` when nothing is known.
    pub total_bytes: u64,
    /// Instantaneous speed in bytes per second.
    pub speed: f64,
    /// Estimated seconds remaining.
    pub eta_seconds: f64,
    /// `0.0..=100.0`.
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_segment: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_segments: Option<u32>,
}

/// A download request and everything the engine knows about its execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: String,
    pub stream: DetectedStream,
    pub quality: VideoQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioTrack>,
    pub status: DownloadStatus,
    #[serde(default)]
    pub progress: DownloadProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl DownloadJob {
    pub fn new(
        id: impl Into<String>,
        stream: DetectedStream,
        quality: VideoQuality,
        audio: Option<AudioTrack>,
    ) -> Self {
        Self {
            id: id.into(),
            stream,
            quality,
            audio,
            status: DownloadStatus::Pending,
            progress: DownloadProgress::default(),
            output_path: None,
            error: None,
            created_at: crate::now_ms(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!DownloadStatus::Pending.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
        assert!(!DownloadStatus::Merging.is_terminal());
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(DownloadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn progress_wire_shape_is_camel_case() {
        let p = DownloadProgress {
            downloaded_bytes: 1024,
            total_bytes: 4096,
            speed: 512.0,
            eta_seconds: 6.0,
            percentage: 25.0,
            current_segment: Some(2),
            total_segments: Some(8),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["downloadedBytes"], 1024);
        assert_eq!(json["totalBytes"], 4096);
        assert_eq!(json["etaSeconds"], 6.0);
        assert_eq!(json["currentSegment"], 2);

        let back: DownloadProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DownloadStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        let s: DownloadStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(s, DownloadStatus::Cancelled);
    }
}
