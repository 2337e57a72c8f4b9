use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Video resolution as advertised by a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ();

    /// Parses the `WxH` form used by HLS `RESOLUTION` attributes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s.split_once(['x', 'X']).ok_or(())?;
        Ok(Self {
            width: w.trim().parse().map_err(|_| ())?,
            height: h.trim().parse().map_err(|_| ())?,
        })
    }
}

/// Human label for a rendition.
///
/// Named heights win; when the height is unknown the bitrate (bits/s) picks a
/// coarse tier, and with neither the label is `"Unknown"`.
pub fn quality_label(height: Option<u32>, bitrate: Option<u64>) -> String {
    if let Some(h) = height.filter(|h| *h > 0) {
        return match h {
            2160 => "4K".to_string(),
            1440 => "1440p".to_string(),
            1080 => "1080p".to_string(),
            720 => "720p".to_string(),
            480 => "480p".to_string(),
            360 => "360p".to_string(),
            other => format!("{other}p"),
        };
    }
    match bitrate {
        Some(b) if b >= 8_000_000 => "High".to_string(),
        Some(b) if b >= 4_000_000 => "Medium".to_string(),
        Some(_) => "Low".to_string(),
        None => "Unknown".to_string(),
    }
}

/// A selectable video rendition. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQuality {
    pub width: u32,
    pub height: u32,
    /// Bits per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<f64>,
    pub label: String,
}

impl VideoQuality {
    pub fn new(
        resolution: Option<Resolution>,
        bitrate: Option<u64>,
        framerate: Option<f64>,
    ) -> Self {
        let (width, height) = resolution.map(|r| (r.width, r.height)).unwrap_or((0, 0));
        Self {
            width,
            height,
            bitrate,
            framerate,
            label: quality_label(Some(height).filter(|h| *h > 0), bitrate),
        }
    }
}

/// A selectable audio rendition. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    /// BCP-47-ish language tag; `"und"` when the manifest does not say.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    pub label: String,
}

fn default_language() -> String {
    "und".to_string()
}

impl AudioTrack {
    pub fn new(language: Option<String>, bitrate: Option<u64>, label: impl Into<String>) -> Self {
        Self {
            language: language.unwrap_or_else(default_language),
            bitrate,
            label: label.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_heights_win_over_bitrate() {
        assert_eq!(quality_label(Some(2160), Some(20_000_000)), "4K");
        assert_eq!(quality_label(Some(1440), None), "1440p");
        assert_eq!(quality_label(Some(1080), Some(1)), "1080p");
        assert_eq!(quality_label(Some(720), None), "720p");
        assert_eq!(quality_label(Some(480), None), "480p");
        assert_eq!(quality_label(Some(360), None), "360p");
        assert_eq!(quality_label(Some(540), None), "540p");
    }

    #[test]
    fn bitrate_tiers_when_height_unknown() {
        assert_eq!(quality_label(None, Some(8_000_000)), "High");
        assert_eq!(quality_label(None, Some(4_000_000)), "Medium");
        assert_eq!(quality_label(None, Some(3_999_999)), "Low");
        assert_eq!(quality_label(None, None), "Unknown");
        assert_eq!(quality_label(Some(0), Some(9_000_000)), "High");
    }

    #[test]
    fn resolution_round_trips_through_display() {
        let r: Resolution = "1920x1080".parse().unwrap();
        assert_eq!(r, Resolution::new(1920, 1080));
        assert_eq!(r.to_string(), "1920x1080");
        assert!("1080p".parse::<Resolution>().is_err());
        assert!("x".parse::<Resolution>().is_err());
    }

    #[test]
    fn video_quality_serializes_camel_case() {
        let q = VideoQuality::new(Some(Resolution::new(1280, 720)), Some(2_500_000), None);
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["label"], "720p");
        assert_eq!(json["bitrate"], 2_500_000);
        assert!(json.get("framerate").is_none());
    }

    #[test]
    fn audio_track_defaults_language() {
        let t: AudioTrack = serde_json::from_str(r#"{"label":"English"}"#).unwrap();
        assert_eq!(t.language, "und");
    }
}
