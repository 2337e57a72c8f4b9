//! HLS playlist parser.
//!
//! One entry point, [`parse`]: the presence of `#EXT-X-STREAM-INF` selects
//! master mode, anything else is treated as a media playlist. Segment and
//! variant URIs are resolved against the manifest URL at parse time so the
//! downloader only ever sees absolute URLs.

use std::collections::HashMap;
use std::str::FromStr;

use stream_types::{AudioTrack, Resolution, VideoQuality};
use tracing::warn;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum HlsError {
    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },
}

impl HlsError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum HlsPlaylist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

/// A playlist of variant streams.
#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    /// Sorted by descending bandwidth.
    pub variants: Vec<Variant>,
    /// `GROUP-ID` → renditions, as declared by `#EXT-X-MEDIA:TYPE=AUDIO`.
    pub audio_groups: HashMap<String, Vec<AudioRendition>>,
    pub is_drm: bool,
}

#[derive(Debug, Clone)]
pub struct Variant {
    /// Absolute URL of the media playlist.
    pub url: String,
    /// Bits per second; 0 when the attribute was missing or malformed.
    pub bandwidth: u64,
    pub resolution: Option<Resolution>,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
    /// `AUDIO` group reference, if any.
    pub audio_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AudioRendition {
    pub group_id: String,
    pub name: String,
    pub language: Option<String>,
    /// Absolute URL, when the rendition is not muxed into the variant.
    pub uri: Option<String>,
    pub is_default: bool,
    pub autoselect: bool,
}

/// Key descriptor from `#EXT-X-KEY`; every segment after the tag inherits it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HlsKey {
    pub method: String,
    pub uri: Option<String>,
    pub iv: Option<String>,
    pub keyformat: Option<String>,
}

impl HlsKey {
    /// `AES-128` is deliberately NOT DRM: the key travels over plain HTTP and
    /// the stream stays downloadable. Everything else that is not `NONE`
    /// (`SAMPLE-AES` and friends), or any Widevine/FairPlay key format, is.
    pub fn is_drm(&self) -> bool {
        let method = self.method.trim().to_ascii_uppercase();
        if !method.is_empty() && method != "NONE" && method != "AES-128" {
            return true;
        }
        if let Some(fmt) = &self.keyformat {
            let fmt = fmt.to_ascii_lowercase();
            if fmt.contains("widevine") || fmt.contains("fairplay") {
                return true;
            }
        }
        false
    }
}

/// A sub-range of a segment URI, from `#EXT-X-BYTERANGE:<n>[@<o>]`.
///
/// Offsets omitted in the manifest are resolved during parse by continuing
/// after the previous range, per the HLS rules for ranges on the same URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    pub offset: u64,
}

impl ByteRange {
    /// Value for an HTTP `Range` header fetching exactly this span.
    pub fn to_http_range(self) -> String {
        format!("bytes={}-{}", self.offset, self.offset + self.length - 1)
    }
}

#[derive(Debug, Clone)]
pub struct MediaSegment {
    /// Absolute URL.
    pub uri: String,
    /// Seconds, from the preceding `#EXTINF`.
    pub duration: f64,
    pub byte_range: Option<ByteRange>,
    pub key: Option<HlsKey>,
}

/// Initialization section from `#EXT-X-MAP`, fetched before any segment.
#[derive(Debug, Clone)]
pub struct InitSection {
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

/// A playlist of media segments.
#[derive(Debug, Clone, Default)]
pub struct MediaPlaylist {
    pub target_duration: f64,
    pub segments: Vec<MediaSegment>,
    /// Sum of segment durations, seconds.
    pub total_duration: f64,
    pub is_drm: bool,
    /// Last key descriptor seen in the playlist.
    pub key: Option<HlsKey>,
    pub init: Option<InitSection>,
    /// `#EXT-X-ENDLIST` was present.
    pub ended: bool,
}

impl MasterPlaylist {
    /// Qualities in variant order (descending bandwidth).
    pub fn qualities(&self) -> Vec<VideoQuality> {
        self.variants
            .iter()
            .map(|v| {
                VideoQuality::new(
                    v.resolution,
                    Some(v.bandwidth).filter(|b| *b > 0),
                    v.frame_rate,
                )
            })
            .collect()
    }

    /// All audio renditions across groups as selectable tracks.
    pub fn audio_tracks(&self) -> Vec<AudioTrack> {
        let mut tracks: Vec<AudioTrack> = Vec::new();
        for renditions in self.audio_groups.values() {
            for r in renditions {
                let label = if r.name.is_empty() {
                    r.language.clone().unwrap_or_else(|| "und".to_string())
                } else {
                    r.name.clone()
                };
                tracks.push(AudioTrack::new(r.language.clone(), None, label));
            }
        }
        tracks
    }
}

/// Parse a playlist body fetched from `base`.
pub fn parse(body: &str, base: &Url) -> Result<HlsPlaylist, HlsError> {
    let body = body.trim_start_matches('\u{feff}');
    let mut lines = body.lines().map(str::trim);
    let header_ok = lines
        .find(|l| !l.is_empty())
        .is_some_and(|l| l.starts_with("#EXTM3U"));
    if !header_ok {
        return Err(HlsError::invalid("missing #EXTM3U header"));
    }

    if body.contains("#EXT-X-STREAM-INF") {
        Ok(HlsPlaylist::Master(parse_master(body, base)))
    } else {
        Ok(HlsPlaylist::Media(parse_media(body, base)))
    }
}

fn parse_master(body: &str, base: &Url) -> MasterPlaylist {
    let mut playlist = MasterPlaylist::default();
    let mut pending_variant: Option<HashMap<String, String>> = None;

    for line in body.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA:") {
            let attrs = parse_attributes(rest);
            if attrs.get("TYPE").map(String::as_str) == Some("AUDIO") {
                let group_id = attrs
                    .get("GROUP-ID")
                    .cloned()
                    .unwrap_or_else(|| "default".to_string());
                let rendition = AudioRendition {
                    group_id: group_id.clone(),
                    name: attrs.get("NAME").cloned().unwrap_or_default(),
                    language: attrs.get("LANGUAGE").cloned(),
                    uri: attrs.get("URI").and_then(|u| resolve(base, u)),
                    is_default: attrs.get("DEFAULT").map(String::as_str) == Some("YES"),
                    autoselect: attrs.get("AUTOSELECT").map(String::as_str) == Some("YES"),
                };
                playlist
                    .audio_groups
                    .entry(group_id)
                    .or_default()
                    .push(rendition);
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending_variant = Some(parse_attributes(rest));
        } else if let Some(rest) = line
            .strip_prefix("#EXT-X-SESSION-KEY:")
            .or_else(|| line.strip_prefix("#EXT-X-KEY:"))
        {
            if key_from_attributes(&parse_attributes(rest), base).is_drm() {
                playlist.is_drm = true;
            }
        } else if !line.starts_with('#') {
            // The first non-comment line after a STREAM-INF tag is its URI.
            if let Some(attrs) = pending_variant.take() {
                let Some(url) = resolve(base, line) else {
                    warn!(uri = line, "skipping variant with unresolvable URI");
                    continue;
                };
                playlist.variants.push(Variant {
                    url,
                    bandwidth: attrs
                        .get("BANDWIDTH")
                        .and_then(|b| b.parse().ok())
                        .unwrap_or(0),
                    resolution: attrs
                        .get("RESOLUTION")
                        .and_then(|r| Resolution::from_str(r).ok()),
                    codecs: attrs.get("CODECS").cloned(),
                    frame_rate: attrs.get("FRAME-RATE").and_then(|f| f.parse().ok()),
                    audio_group: attrs.get("AUDIO").cloned(),
                });
            }
        }
    }

    // Raw scheme markers count even outside a KEY tag.
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("com.widevine") || lowered.contains("com.apple.fps") {
        playlist.is_drm = true;
    }

    playlist
        .variants
        .sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
    playlist
}

fn parse_media(body: &str, base: &Url) -> MediaPlaylist {
    let mut playlist = MediaPlaylist::default();
    let mut current_key: Option<HlsKey> = None;
    let mut pending_duration: Option<f64> = None;
    let mut pending_range: Option<ByteRange> = None;
    // End of the last explicit range, for offset-less continuation ranges.
    let mut range_cursor: Option<u64> = None;

    for line in body.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let duration_part = rest.split(',').next().unwrap_or(rest);
            pending_duration = duration_part.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            let key = key_from_attributes(&parse_attributes(rest), base);
            if key.is_drm() {
                playlist.is_drm = true;
            }
            current_key = Some(key);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            pending_range = parse_byte_range(rest, range_cursor);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MAP:") {
            let attrs = parse_attributes(rest);
            if let Some(uri) = attrs.get("URI").and_then(|u| resolve(base, u)) {
                let byte_range = attrs
                    .get("BYTERANGE")
                    .and_then(|r| parse_byte_range(r, None));
                playlist.init = Some(InitSection { uri, byte_range });
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            playlist.target_duration = rest.trim().parse().unwrap_or(0.0);
        } else if line.starts_with("#EXT-X-ENDLIST") {
            playlist.ended = true;
        } else if !line.starts_with('#') {
            let Some(uri) = resolve(base, line) else {
                warn!(uri = line, "skipping segment with unresolvable URI");
                pending_duration = None;
                pending_range = None;
                continue;
            };
            let duration = pending_duration.take().unwrap_or(0.0);
            let byte_range = pending_range.take();
            range_cursor = byte_range.map(|r| r.offset + r.length);
            playlist.total_duration += duration;
            playlist.segments.push(MediaSegment {
                uri,
                duration,
                byte_range,
                key: current_key.clone(),
            });
        }
    }

    playlist.key = current_key;
    playlist
}

fn key_from_attributes(attrs: &HashMap<String, String>, base: &Url) -> HlsKey {
    HlsKey {
        method: attrs.get("METHOD").cloned().unwrap_or_default(),
        uri: attrs.get("URI").and_then(|u| resolve(base, u)),
        iv: attrs.get("IV").cloned(),
        keyformat: attrs.get("KEYFORMAT").cloned(),
    }
}

/// `<n>[@<o>]`; without `@<o>` the range continues at `cursor`.
fn parse_byte_range(value: &str, cursor: Option<u64>) -> Option<ByteRange> {
    let value = value.trim();
    let (length, offset) = match value.split_once('@') {
        Some((n, o)) => (n.parse().ok()?, o.parse().ok()?),
        None => (value.parse().ok()?, cursor?),
    };
    Some(ByteRange { length, offset })
}

/// Split `KEY=VALUE` pairs on commas that sit outside double quotes.
/// Quotes are stripped from values; commas inside them survive.
fn parse_attributes(input: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = input.as_bytes();

    let mut push = |piece: &str| {
        if let Some((key, value)) = piece.split_once('=') {
            attrs.insert(
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    };

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&input[start..]);
    attrs
}

fn resolve(base: &Url, uri: &str) -> Option<String> {
    base.join(uri).ok().map(|u| u.to_string())
}
