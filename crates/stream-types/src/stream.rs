use serde::{Deserialize, Serialize};

use crate::quality::{AudioTrack, VideoQuality};

/// How the stream was classified by the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Hls,
    Dash,
    Direct,
    Ytdlp,
    Unknown,
}

/// Content-protection classification.
///
/// `Drm` streams are refused before any network request; `Unknown` is treated
/// as downloadable until a parser says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protection {
    None,
    Drm,
    #[default]
    Unknown,
}

/// A stream observed by the browser extension and offered for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedStream {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    #[serde(default)]
    pub protection: Protection,
    #[serde(default)]
    pub qualities: Vec<VideoQuality>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Seconds, when the page player exposed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub page_url: String,
    pub page_title: String,
    /// Milliseconds since the UNIX epoch.
    pub detected_at: i64,
}

impl DetectedStream {
    /// Best human name for output files: stream title, else page title.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.page_title,
        }
    }
}
