//! DASH MPD parser and segment-plan materialization.
//!
//! The document is consumed with `quick-xml`'s pull reader; element names are
//! matched by local name so `xmlns` prefixes never matter. Parsing collects a
//! typed tree ([`DashManifest`]); [`DashManifest::segment_plan`] later turns a
//! representation into the ordered list of absolute segment URLs, expanding
//! `$RepresentationID$` / `$Number$` / `$Time$` / `$Bandwidth$` placeholders
//! including the width-formatted `$Var%0Nd$` form.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;
use url::Url;

/// Content-protection scheme URIs that identify the common DRM systems.
const WIDEVINE_UUID: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";
const PLAYREADY_UUID: &str = "urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95";
const FAIRPLAY_UUID: &str = "urn:uuid:94ce86fb-07ff-4f43-adb8-93d2fa968ca2";

#[derive(Debug, thiserror::Error)]
pub enum DashError {
    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },
}

impl DashError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationMode {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Video,
    Audio,
    Text,
}

#[derive(Debug, Clone)]
pub struct ContentProtection {
    pub scheme_id_uri: String,
    /// Base64 PSSH box, when embedded.
    pub pssh: Option<String>,
}

impl ContentProtection {
    pub fn is_known_drm_scheme(&self) -> bool {
        let scheme = self.scheme_id_uri.to_ascii_lowercase();
        scheme == WIDEVINE_UUID || scheme == PLAYREADY_UUID || scheme == FAIRPLAY_UUID
    }
}

/// One `<S>` run of a `SegmentTimeline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineEntry {
    pub t: Option<u64>,
    pub d: u64,
    /// Additional repetitions; each entry yields `r + 1` segments.
    pub r: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentTemplate {
    pub media: Option<String>,
    pub initialization: Option<String>,
    pub start_number: u64,
    pub timescale: u64,
    /// Fixed segment duration in timescale units, for timelineless templates.
    pub duration: Option<u64>,
    pub timeline: Vec<TimelineEntry>,
}

impl SegmentTemplate {
    fn from_attrs(e: &BytesStart<'_>) -> Self {
        Self {
            media: attr(e, "media"),
            initialization: attr(e, "initialization"),
            start_number: attr(e, "startNumber").and_then(|v| v.parse().ok()).unwrap_or(1),
            timescale: attr(e, "timescale").and_then(|v| v.parse().ok()).unwrap_or(1),
            duration: attr(e, "duration").and_then(|v| v.parse().ok()),
            timeline: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentList {
    pub initialization: Option<String>,
    /// `SegmentURL/@media` values in document order.
    pub media: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Representation {
    pub id: String,
    /// Bits per second.
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub codecs: Option<String>,
    pub mime_type: Option<String>,
    pub base_url: Option<String>,
    pub segment_template: Option<SegmentTemplate>,
    pub segment_list: Option<SegmentList>,
}

#[derive(Debug, Clone, Default)]
pub struct AdaptationSet {
    pub content_type: ContentType,
    pub language: Option<String>,
    pub mime_type: Option<String>,
    pub protections: Vec<ContentProtection>,
    /// Inherited by representations that carry no template of their own.
    pub segment_template: Option<SegmentTemplate>,
    /// Video sets sort descending by bandwidth, audio sets ascending.
    pub representations: Vec<Representation>,
    pub is_drm: bool,
}

#[derive(Debug, Clone)]
pub struct DashManifest {
    pub mode: PresentationMode,
    /// `mediaPresentationDuration`, seconds.
    pub duration: Option<f64>,
    /// `minBufferTime`, seconds.
    pub min_buffer_time: Option<f64>,
    /// Top-level `BaseURL`, resolved against the manifest URL.
    pub base_url: Option<Url>,
    pub manifest_url: Url,
    pub adaptation_sets: Vec<AdaptationSet>,
    pub is_drm: bool,
}

/// The ordered fetch plan for one representation.
#[derive(Debug, Clone, Default)]
pub struct SegmentPlan {
    /// Initialization segment, fetched before any media segment.
    pub init: Option<String>,
    /// Absolute media segment URLs in presentation order.
    pub media: Vec<String>,
}

impl SegmentPlan {
    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}

/// Where the next text node belongs while walking the document.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum TextSink {
    #[default]
    Ignore,
    MpdBase,
    RepBase,
    Pssh,
}

/// Mutable walk state; turned into a [`DashManifest`] once `MPD` closes.
#[derive(Default)]
struct MpdBuilder {
    mpd_seen: bool,
    mode: PresentationMode,
    duration: Option<f64>,
    min_buffer_time: Option<f64>,
    base_url: Option<Url>,
    adaptation_sets: Vec<AdaptationSet>,
    current_set: Option<AdaptationSet>,
    current_set_explicit_type: bool,
    current_rep: Option<Representation>,
    current_protection: Option<ContentProtection>,
    in_segment_list: bool,
    text_sink: TextSink,
}

impl MpdBuilder {
    fn active_template(&mut self) -> Option<&mut SegmentTemplate> {
        self.current_rep
            .as_mut()
            .and_then(|r| r.segment_template.as_mut())
            .or_else(|| {
                self.current_set
                    .as_mut()
                    .and_then(|s| s.segment_template.as_mut())
            })
    }

    fn on_element(&mut self, e: &BytesStart<'_>, is_empty: bool) {
        match e.local_name().as_ref() {
            b"MPD" => {
                self.mpd_seen = true;
                if attr(e, "type").as_deref() == Some("dynamic") {
                    self.mode = PresentationMode::Dynamic;
                }
                self.duration = attr(e, "mediaPresentationDuration")
                    .as_deref()
                    .and_then(parse_iso8601_duration);
                self.min_buffer_time = attr(e, "minBufferTime")
                    .as_deref()
                    .and_then(parse_iso8601_duration);
            }
            b"BaseURL" if !is_empty => {
                self.text_sink = if self.current_rep.is_some() {
                    TextSink::RepBase
                } else if self.current_set.is_none() {
                    TextSink::MpdBase
                } else {
                    TextSink::Ignore
                };
            }
            b"AdaptationSet" => {
                let explicit = attr(e, "contentType")
                    .as_deref()
                    .and_then(content_type_from_str);
                self.current_set_explicit_type = explicit.is_some();
                self.current_set = Some(AdaptationSet {
                    content_type: explicit.unwrap_or_default(),
                    language: attr(e, "lang"),
                    mime_type: attr(e, "mimeType"),
                    ..Default::default()
                });
            }
            b"ContentProtection" => {
                let protection = ContentProtection {
                    scheme_id_uri: attr(e, "schemeIdUri").unwrap_or_default(),
                    pssh: None,
                };
                if is_empty {
                    if let Some(set) = self.current_set.as_mut() {
                        set.protections.push(protection);
                    }
                } else {
                    self.current_protection = Some(protection);
                }
            }
            b"pssh" if !is_empty => self.text_sink = TextSink::Pssh,
            b"SegmentTemplate" => {
                let template = SegmentTemplate::from_attrs(e);
                if let Some(rep) = self.current_rep.as_mut() {
                    rep.segment_template = Some(template);
                } else if let Some(set) = self.current_set.as_mut() {
                    set.segment_template = Some(template);
                }
            }
            b"S" => {
                let entry = TimelineEntry {
                    t: attr(e, "t").and_then(|v| v.parse().ok()),
                    d: attr(e, "d").and_then(|v| v.parse().ok()).unwrap_or(0),
                    // Negative repeat ("until end of period") is a live-stream
                    // construct; clamp to no repeats.
                    r: attr(e, "r")
                        .and_then(|v| v.parse::<i64>().ok())
                        .map(|r| r.max(0) as u64)
                        .unwrap_or(0),
                };
                if let Some(template) = self.active_template() {
                    template.timeline.push(entry);
                }
            }
            b"Representation" => {
                self.current_rep = Some(Representation {
                    id: attr(e, "id").unwrap_or_default(),
                    bandwidth: attr(e, "bandwidth").and_then(|v| v.parse().ok()).unwrap_or(0),
                    width: attr(e, "width").and_then(|v| v.parse().ok()),
                    height: attr(e, "height").and_then(|v| v.parse().ok()),
                    frame_rate: attr(e, "frameRate").as_deref().and_then(parse_frame_rate),
                    codecs: attr(e, "codecs"),
                    mime_type: attr(e, "mimeType"),
                    ..Default::default()
                });
            }
            b"SegmentList" => {
                if let Some(rep) = self.current_rep.as_mut() {
                    rep.segment_list = Some(SegmentList::default());
                    self.in_segment_list = !is_empty;
                }
            }
            b"Initialization" => {
                if self.in_segment_list {
                    if let Some(list) = self.current_rep.as_mut().and_then(|r| r.segment_list.as_mut())
                    {
                        list.initialization = attr(e, "sourceURL");
                    }
                }
            }
            b"SegmentURL" => {
                if let Some(list) = self.current_rep.as_mut().and_then(|r| r.segment_list.as_mut()) {
                    if let Some(media) = attr(e, "media") {
                        list.media.push(media);
                    }
                }
            }
            _ => {}
        }
    }

    fn on_text(&mut self, text: &str, manifest_url: &Url) {
        match self.text_sink {
            TextSink::MpdBase => self.base_url = manifest_url.join(text).ok(),
            TextSink::RepBase => {
                if let Some(rep) = self.current_rep.as_mut() {
                    rep.base_url = Some(text.to_string());
                }
            }
            TextSink::Pssh => {
                if let Some(p) = self.current_protection.as_mut() {
                    p.pssh = Some(text.to_string());
                }
            }
            TextSink::Ignore => {}
        }
    }

    fn on_close(&mut self, name: &[u8]) {
        match name {
            b"BaseURL" | b"pssh" => self.text_sink = TextSink::Ignore,
            b"ContentProtection" => {
                if let (Some(set), Some(p)) =
                    (self.current_set.as_mut(), self.current_protection.take())
                {
                    set.protections.push(p);
                }
            }
            b"SegmentList" => self.in_segment_list = false,
            b"Representation" => {
                if let (Some(set), Some(rep)) = (self.current_set.as_mut(), self.current_rep.take())
                {
                    set.representations.push(rep);
                }
            }
            b"AdaptationSet" => {
                if let Some(set) = self.current_set.take() {
                    self.adaptation_sets
                        .push(finalize_set(set, self.current_set_explicit_type));
                }
            }
            _ => {}
        }
    }
}

/// Parse an MPD document fetched from `manifest_url`.
pub fn parse(xml: &str, manifest_url: &Url) -> Result<DashManifest, DashError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = MpdBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.on_element(&e, false),
            Ok(Event::Empty(e)) => builder.on_element(&e, true),
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default();
                builder.on_text(text.trim(), manifest_url);
            }
            Ok(Event::End(e)) => builder.on_close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DashError::invalid(format!("XML error: {e}"))),
        }
    }

    if !builder.mpd_seen {
        return Err(DashError::invalid("no MPD root element"));
    }

    let is_drm = builder.adaptation_sets.iter().any(|s| s.is_drm);
    Ok(DashManifest {
        mode: builder.mode,
        duration: builder.duration,
        min_buffer_time: builder.min_buffer_time,
        base_url: builder.base_url,
        manifest_url: manifest_url.clone(),
        adaptation_sets: builder.adaptation_sets,
        is_drm,
    })
}

fn finalize_set(mut set: AdaptationSet, explicit_type: bool) -> AdaptationSet {
    // Content type: explicit attribute, else the mimeType prefix of the set
    // or its first representation.
    if set.mime_type.is_none() {
        set.mime_type = set
            .representations
            .iter()
            .find_map(|r| r.mime_type.clone());
    }
    if !explicit_type {
        if let Some(mime) = set.mime_type.as_deref() {
            set.content_type = content_type_from_mime(mime);
        }
    }

    set.is_drm = !set.protections.is_empty()
        || set.protections.iter().any(|p| p.is_known_drm_scheme());

    match set.content_type {
        ContentType::Video => set
            .representations
            .sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth)),
        ContentType::Audio => set
            .representations
            .sort_by(|a, b| a.bandwidth.cmp(&b.bandwidth)),
        ContentType::Text => {}
    }
    set
}

fn content_type_from_str(s: &str) -> Option<ContentType> {
    match s {
        "video" => Some(ContentType::Video),
        "audio" => Some(ContentType::Audio),
        "text" => Some(ContentType::Text),
        _ => None,
    }
}

fn content_type_from_mime(mime: &str) -> ContentType {
    if mime.starts_with("audio/") {
        ContentType::Audio
    } else if mime.starts_with("text/") {
        ContentType::Text
    } else {
        ContentType::Video
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        (a.key.local_name().as_ref() == name.as_bytes())
            .then(|| a.unescape_value().ok().map(|v| v.into_owned()))
            .flatten()
    })
}

/// `PT#H#M#S` style durations, with optional days and fractional seconds.
pub fn parse_iso8601_duration(s: &str) -> Option<f64> {
    let s = s.trim().strip_prefix('P')?;
    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => (d, t),
        None => (s, ""),
    };

    let mut total = 0.0_f64;
    let mut scan = |part: &str, units: &[(char, f64)]| -> Option<()> {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
            } else {
                let (_, scale) = units.iter().find(|(u, _)| *u == c)?;
                total += number.parse::<f64>().ok()? * scale;
                number.clear();
            }
        }
        number.is_empty().then_some(())
    };

    scan(date_part, &[('D', 86_400.0)])?;
    scan(time_part, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
    Some(total)
}

/// `"30"`, `"29.97"` or `"30000/1001"`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => s.trim().parse().ok(),
    }
}

struct TemplateVars<'a> {
    rep_id: &'a str,
    bandwidth: u64,
    number: Option<u64>,
    time: Option<u64>,
}

/// Expand `$RepresentationID$`, `$Number$`, `$Time$` and `$Bandwidth$`,
/// including the `$Var%0Nd$` zero-padded form. `$$` is a literal dollar;
/// unknown identifiers are left untouched.
fn expand_template(tpl: &str, vars: &TemplateVars<'_>) -> String {
    let mut out = String::with_capacity(tpl.len());
    let mut rest = tpl;

    while let Some(open) = rest.find('$') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let Some(close) = rest.find('$') else {
            out.push('$');
            out.push_str(rest);
            return out;
        };
        let token = &rest[..close];
        rest = &rest[close + 1..];

        if token.is_empty() {
            out.push('$');
            continue;
        }
        let (name, width) = match token.split_once('%') {
            Some((n, fmt)) => (n, parse_pad_width(fmt)),
            None => (token, None),
        };
        let numeric = match name {
            "RepresentationID" => {
                out.push_str(vars.rep_id);
                continue;
            }
            "Number" => vars.number,
            "Time" => vars.time,
            "Bandwidth" => Some(vars.bandwidth),
            _ => None,
        };
        match numeric {
            Some(value) => match width {
                Some(w) => out.push_str(&format!("{value:0w$}")),
                None => out.push_str(&value.to_string()),
            },
            // Unknown or unavailable variable: keep the token verbatim.
            None => {
                out.push('$');
                out.push_str(token);
                out.push('$');
            }
        }
    }
    out.push_str(rest);
    out
}

/// `"05d"` → `Some(5)`.
fn parse_pad_width(fmt: &str) -> Option<usize> {
    fmt.strip_suffix('d')?.parse().ok()
}

impl DashManifest {
    /// The base every relative URI in this manifest resolves against.
    fn effective_base(&self) -> &Url {
        self.base_url.as_ref().unwrap_or(&self.manifest_url)
    }

    fn representation_base(&self, rep: &Representation) -> Url {
        match rep.base_url.as_deref() {
            Some(b) => self
                .effective_base()
                .join(b)
                .unwrap_or_else(|_| self.effective_base().clone()),
            None => self.effective_base().clone(),
        }
    }

    /// Materialize the ordered segment URLs for `rep` within `set`.
    ///
    /// An empty plan means the representation's addressing could not be
    /// resolved; callers treat that as a fatal job error.
    pub fn segment_plan(&self, set: &AdaptationSet, rep: &Representation) -> SegmentPlan {
        let base = self.representation_base(rep);
        let resolve = |uri: &str| -> Option<String> {
            match base.join(uri) {
                Ok(u) => Some(u.to_string()),
                Err(_) => {
                    warn!(uri, "unresolvable segment URI");
                    None
                }
            }
        };

        // Explicit SegmentList overrides any template.
        if let Some(list) = &rep.segment_list {
            return SegmentPlan {
                init: list.initialization.as_deref().and_then(resolve),
                media: list.media.iter().filter_map(|m| resolve(m)).collect(),
            };
        }

        let Some(template) = rep.segment_template.as_ref().or(set.segment_template.as_ref())
        else {
            return SegmentPlan::default();
        };

        let init = template.initialization.as_deref().and_then(|tpl| {
            let expanded = expand_template(
                tpl,
                &TemplateVars {
                    rep_id: &rep.id,
                    bandwidth: rep.bandwidth,
                    number: None,
                    time: None,
                },
            );
            resolve(&expanded)
        });

        let Some(media_tpl) = template.media.as_deref() else {
            return SegmentPlan { init, media: Vec::new() };
        };

        let mut media = Vec::new();
        let mut push = |number: u64, time: u64| {
            let expanded = expand_template(
                media_tpl,
                &TemplateVars {
                    rep_id: &rep.id,
                    bandwidth: rep.bandwidth,
                    number: Some(number),
                    time: Some(time),
                },
            );
            if let Some(url) = resolve(&expanded) {
                media.push(url);
            }
        };

        if !template.timeline.is_empty() {
            let mut number = template.start_number;
            let mut time = 0u64;
            for entry in &template.timeline {
                if let Some(t) = entry.t {
                    time = t;
                }
                for _ in 0..=entry.r {
                    push(number, time);
                    number += 1;
                    time += entry.d;
                }
            }
        } else if let (Some(seg_duration), Some(total)) = (template.duration, self.duration) {
            // No timeline: derive the segment count from the presentation
            // duration and the fixed per-segment duration.
            if seg_duration > 0 && total > 0.0 {
                let seg_seconds = seg_duration as f64 / template.timescale.max(1) as f64;
                let count = (total / seg_seconds).ceil() as u64;
                for i in 0..count {
                    push(template.start_number + i, i * seg_duration);
                }
            }
        }

        SegmentPlan { init, media }
    }

    /// First adaptation set of the given content type, in document order.
    pub fn first_set_of(&self, content_type: ContentType) -> Option<&AdaptationSet> {
        self.adaptation_sets
            .iter()
            .find(|s| s.content_type == content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://cdn.example.com/vod/stream.mpd").unwrap()
    }

    #[test]
    fn rejects_non_mpd_document() {
        let err = parse("<html><body/></html>", &url()).unwrap_err();
        assert!(matches!(err, DashError::InvalidManifest { .. }));
    }

    #[test]
    fn parses_mode_and_durations() {
        let m = parse(
            r#"<MPD type="static" mediaPresentationDuration="PT1H2M3.5S" minBufferTime="PT1.5S"/>"#,
            &url(),
        )
        .unwrap();
        assert_eq!(m.mode, PresentationMode::Static);
        assert_eq!(m.duration, Some(3723.5));
        assert_eq!(m.min_buffer_time, Some(1.5));
    }

    #[test]
    fn iso_duration_forms() {
        assert_eq!(parse_iso8601_duration("PT30S"), Some(30.0));
        assert_eq!(parse_iso8601_duration("PT2M"), Some(120.0));
        assert_eq!(parse_iso8601_duration("PT1H"), Some(3600.0));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401.0));
        assert_eq!(parse_iso8601_duration("PT0.5S"), Some(0.5));
        assert_eq!(parse_iso8601_duration("nonsense"), None);
    }

    #[test]
    fn timeline_expansion_with_padded_number() {
        let m = parse(
            r#"<MPD mediaPresentationDuration="PT30S">
              <Period>
                <AdaptationSet contentType="video">
                  <SegmentTemplate media="v_$RepresentationID$_$Number%05d$.m4s"
                                   initialization="v_$RepresentationID$_init.mp4"
                                   startNumber="1" timescale="1000">
                    <SegmentTimeline><S d="100" r="2"/></SegmentTimeline>
                  </SegmentTemplate>
                  <Representation id="v1" bandwidth="3000000" width="1920" height="1080"/>
                </AdaptationSet>
              </Period>
            </MPD>"#,
            &url(),
        )
        .unwrap();
        let set = m.first_set_of(ContentType::Video).unwrap();
        let plan = m.segment_plan(set, &set.representations[0]);
        assert_eq!(
            plan.init.as_deref(),
            Some("https://cdn.example.com/vod/v_v1_init.mp4")
        );
        assert_eq!(
            plan.media,
            vec![
                "https://cdn.example.com/vod/v_v1_00001.m4s",
                "https://cdn.example.com/vod/v_v1_00002.m4s",
                "https://cdn.example.com/vod/v_v1_00003.m4s",
            ]
        );
    }

    #[test]
    fn timeline_time_placeholder_tracks_runs() {
        let m = parse(
            r#"<MPD>
              <Period><AdaptationSet contentType="video">
                <SegmentTemplate media="s_$Time$.m4s" startNumber="1">
                  <SegmentTimeline>
                    <S t="900" d="100" r="1"/>
                    <S t="2000" d="50"/>
                  </SegmentTimeline>
                </SegmentTemplate>
                <Representation id="v" bandwidth="1"/>
              </AdaptationSet></Period>
            </MPD>"#,
            &url(),
        )
        .unwrap();
        let set = &m.adaptation_sets[0];
        let plan = m.segment_plan(set, &set.representations[0]);
        assert_eq!(
            plan.media,
            vec![
                "https://cdn.example.com/vod/s_900.m4s",
                "https://cdn.example.com/vod/s_1000.m4s",
                "https://cdn.example.com/vod/s_2000.m4s",
            ]
        );
    }

    #[test]
    fn widevine_uuid_marks_drm() {
        let m = parse(
            r#"<MPD>
              <Period><AdaptationSet contentType="video">
                <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"/>
                <Representation id="v" bandwidth="1"/>
              </AdaptationSet></Period>
            </MPD>"#,
            &url(),
        )
        .unwrap();
        assert!(m.is_drm);
        assert!(m.adaptation_sets[0].is_drm);
    }

    #[test]
    fn pssh_text_is_captured() {
        let m = parse(
            r#"<MPD xmlns:cenc="urn:mpeg:cenc:2013">
              <Period><AdaptationSet contentType="video">
                <ContentProtection schemeIdUri="urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95">
                  <cenc:pssh>AAAAXHBzc2g=</cenc:pssh>
                </ContentProtection>
                <Representation id="v" bandwidth="1"/>
              </AdaptationSet></Period>
            </MPD>"#,
            &url(),
        )
        .unwrap();
        let p = &m.adaptation_sets[0].protections[0];
        assert!(p.is_known_drm_scheme());
        assert_eq!(p.pssh.as_deref(), Some("AAAAXHBzc2g="));
    }

    #[test]
    fn content_type_derived_from_mime() {
        let m = parse(
            r#"<MPD><Period>
              <AdaptationSet mimeType="audio/mp4">
                <Representation id="a1" bandwidth="64000"/>
                <Representation id="a0" bandwidth="32000"/>
              </AdaptationSet>
              <AdaptationSet>
                <Representation id="v" bandwidth="1" mimeType="video/mp4"/>
              </AdaptationSet>
            </Period></MPD>"#,
            &url(),
        )
        .unwrap();
        assert_eq!(m.adaptation_sets[0].content_type, ContentType::Audio);
        // Audio representations sort ascending by bandwidth.
        assert_eq!(m.adaptation_sets[0].representations[0].id, "a0");
        assert_eq!(m.adaptation_sets[1].content_type, ContentType::Video);
    }

    #[test]
    fn video_representations_sort_descending() {
        let m = parse(
            r#"<MPD><Period><AdaptationSet contentType="video">
              <Representation id="lo" bandwidth="1000000"/>
              <Representation id="hi" bandwidth="5000000"/>
            </AdaptationSet></Period></MPD>"#,
            &url(),
        )
        .unwrap();
        let ids: Vec<_> = m.adaptation_sets[0]
            .representations
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, ["hi", "lo"]);
    }

    #[test]
    fn segment_list_overrides_template() {
        let m = parse(
            r#"<MPD><Period><AdaptationSet contentType="video">
              <SegmentTemplate media="ignored_$Number$.m4s"/>
              <Representation id="v" bandwidth="1">
                <SegmentList>
                  <Initialization sourceURL="init.mp4"/>
                  <SegmentURL media="chunk1.m4s"/>
                  <SegmentURL media="chunk2.m4s"/>
                </SegmentList>
              </Representation>
            </AdaptationSet></Period></MPD>"#,
            &url(),
        )
        .unwrap();
        let set = &m.adaptation_sets[0];
        let plan = m.segment_plan(set, &set.representations[0]);
        assert_eq!(
            plan.init.as_deref(),
            Some("https://cdn.example.com/vod/init.mp4")
        );
        assert_eq!(
            plan.media,
            vec![
                "https://cdn.example.com/vod/chunk1.m4s",
                "https://cdn.example.com/vod/chunk2.m4s",
            ]
        );
    }

    #[test]
    fn fixed_duration_derives_count_from_presentation() {
        let m = parse(
            r#"<MPD mediaPresentationDuration="PT10S">
              <Period><AdaptationSet contentType="video">
                <SegmentTemplate media="c_$Number$.m4s" duration="4000" timescale="1000"
                                 startNumber="1"/>
                <Representation id="v" bandwidth="1"/>
              </AdaptationSet></Period>
            </MPD>"#,
            &url(),
        )
        .unwrap();
        let set = &m.adaptation_sets[0];
        let plan = m.segment_plan(set, &set.representations[0]);
        // ceil(10s / 4s) = 3 segments
        assert_eq!(
            plan.media,
            vec![
                "https://cdn.example.com/vod/c_1.m4s",
                "https://cdn.example.com/vod/c_2.m4s",
                "https://cdn.example.com/vod/c_3.m4s",
            ]
        );
    }

    #[test]
    fn no_addressing_yields_empty_plan() {
        let m = parse(
            r#"<MPD><Period><AdaptationSet contentType="video">
              <SegmentTemplate media="c_$Number$.m4s"/>
              <Representation id="v" bandwidth="1"/>
            </AdaptationSet></Period></MPD>"#,
            &url(),
        )
        .unwrap();
        let set = &m.adaptation_sets[0];
        assert!(m.segment_plan(set, &set.representations[0]).is_empty());
    }

    #[test]
    fn base_urls_override_in_order() {
        let m = parse(
            r#"<MPD>
              <BaseURL>https://media.example.net/root/</BaseURL>
              <Period><AdaptationSet contentType="video">
                <Representation id="v" bandwidth="1">
                  <BaseURL>rep/</BaseURL>
                  <SegmentList><SegmentURL media="s1.m4s"/></SegmentList>
                </Representation>
              </AdaptationSet></Period>
            </MPD>"#,
            &url(),
        )
        .unwrap();
        assert_eq!(
            m.base_url.as_ref().unwrap().as_str(),
            "https://media.example.net/root/"
        );
        let set = &m.adaptation_sets[0];
        let plan = m.segment_plan(set, &set.representations[0]);
        assert_eq!(plan.media, vec!["https://media.example.net/root/rep/s1.m4s"]);
    }

    #[test]
    fn bandwidth_and_fractional_frame_rate() {
        let m = parse(
            r#"<MPD><Period><AdaptationSet contentType="video">
              <SegmentTemplate media="v_$Bandwidth$_$Number$.m4s" duration="1" timescale="1"/>
              <Representation id="v" bandwidth="2500000" frameRate="30000/1001"/>
            </AdaptationSet></Period></MPD>"#,
            &url(),
        )
        .unwrap();
        let rep = &m.adaptation_sets[0].representations[0];
        assert!((rep.frame_rate.unwrap() - 29.97).abs() < 0.01);
        let expanded = expand_template(
            "v_$Bandwidth$_$Number%03d$.m4s",
            &TemplateVars {
                rep_id: "v",
                bandwidth: 2_500_000,
                number: Some(7),
                time: None,
            },
        );
        assert_eq!(expanded, "v_2500000_007.m4s");
    }

    #[test]
    fn double_dollar_is_literal() {
        let expanded = expand_template(
            "price$$_$Number$.m4s",
            &TemplateVars {
                rep_id: "r",
                bandwidth: 0,
                number: Some(1),
                time: None,
            },
        );
        assert_eq!(expanded, "price$_1.m4s");
    }
}
