//! The tagged message protocol. Every message carries a `type` discriminator
//! and a millisecond `timestamp`; field names are camelCase because the peer
//! is extension JavaScript.

use serde::{Deserialize, Serialize};
use stream_types::{
    AudioTrack, DetectedStream, DownloadJob, DownloadProgress, DownloadStatus, VideoQuality,
    now_ms,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "PING")]
    Ping { timestamp: i64 },

    #[serde(rename = "PONG")]
    Pong { timestamp: i64, version: String },

    #[serde(rename = "STREAM_DETECTED")]
    StreamDetected {
        timestamp: i64,
        stream: DetectedStream,
    },

    #[serde(rename = "DOWNLOAD_REQUEST", rename_all = "camelCase")]
    DownloadRequest {
        timestamp: i64,
        stream: DetectedStream,
        quality: VideoQuality,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<AudioTrack>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_dir: Option<String>,
    },

    #[serde(rename = "DOWNLOAD_PROGRESS", rename_all = "camelCase")]
    DownloadProgress {
        timestamp: i64,
        job_id: String,
        progress: DownloadProgress,
        status: DownloadStatus,
    },

    #[serde(rename = "DOWNLOAD_COMPLETE", rename_all = "camelCase")]
    DownloadComplete {
        timestamp: i64,
        job_id: String,
        output_path: String,
    },

    #[serde(rename = "DOWNLOAD_ERROR", rename_all = "camelCase")]
    DownloadError {
        timestamp: i64,
        job_id: String,
        error: String,
    },

    #[serde(rename = "DOWNLOAD_CANCEL", rename_all = "camelCase")]
    DownloadCancel { timestamp: i64, job_id: String },

    #[serde(rename = "GET_DOWNLOADS")]
    GetDownloads { timestamp: i64 },

    #[serde(rename = "DOWNLOADS_LIST")]
    DownloadsList {
        timestamp: i64,
        downloads: Vec<DownloadJob>,
    },

    #[serde(rename = "APP_STATUS", rename_all = "camelCase")]
    AppStatus {
        timestamp: i64,
        connected: bool,
        encoder_available: bool,
        version: String,
    },
}

impl Message {
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Ping { timestamp }
            | Self::Pong { timestamp, .. }
            | Self::StreamDetected { timestamp, .. }
            | Self::DownloadRequest { timestamp, .. }
            | Self::DownloadProgress { timestamp, .. }
            | Self::DownloadComplete { timestamp, .. }
            | Self::DownloadError { timestamp, .. }
            | Self::DownloadCancel { timestamp, .. }
            | Self::GetDownloads { timestamp }
            | Self::DownloadsList { timestamp, .. }
            | Self::AppStatus { timestamp, .. } => *timestamp,
        }
    }

    pub fn pong(version: impl Into<String>) -> Self {
        Self::Pong {
            timestamp: now_ms(),
            version: version.into(),
        }
    }

    pub fn progress(
        job_id: impl Into<String>,
        progress: DownloadProgress,
        status: DownloadStatus,
    ) -> Self {
        Self::DownloadProgress {
            timestamp: now_ms(),
            job_id: job_id.into(),
            progress,
            status,
        }
    }

    pub fn complete(job_id: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self::DownloadComplete {
            timestamp: now_ms(),
            job_id: job_id.into(),
            output_path: output_path.into(),
        }
    }

    pub fn error(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::DownloadError {
            timestamp: now_ms(),
            job_id: job_id.into(),
            error: error.into(),
        }
    }

    pub fn downloads_list(downloads: Vec<DownloadJob>) -> Self {
        Self::DownloadsList {
            timestamp: now_ms(),
            downloads,
        }
    }

    pub fn app_status(encoder_available: bool, version: impl Into<String>) -> Self {
        Self::AppStatus {
            timestamp: now_ms(),
            connected: true,
            encoder_available,
            version: version.into(),
        }
    }
}
