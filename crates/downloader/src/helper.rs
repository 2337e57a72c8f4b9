//! Delegated-extractor adapter.
//!
//! Streams the engine cannot fetch natively are handed wholesale to a
//! yt-dlp-compatible helper process. The adapter owns the argument contract,
//! translates the helper's `--newline` progress lines into
//! [`DownloadProgress`] snapshots, and extracts the final output path from
//! its stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use stream_types::DownloadProgress;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::HelperConfig;
use crate::error::DownloadError;
use crate::process::{background_command, terminate};

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[download\]\s+([\d.]+)%\s+of\s+~?\s*([\d.]+)(B|KiB|MiB|GiB|KB|MB|GB)\s+at\s+([\d.]+)(B|KiB|MiB|GiB|KB|MB|GB)/s\s+ETA\s+((?:\d+:)?\d{1,2}:\d{2})",
    )
    .expect("progress regex")
});
static MERGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[Merger\] Merging formats into "(.+)""#).expect("merger regex")
});
static DESTINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\] Destination: (.+)").expect("destination regex"));
static ALREADY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\] (.+) has already been downloaded").expect("already regex")
});

pub struct HelperAdapter {
    config: HelperConfig,
}

impl HelperAdapter {
    pub fn new(config: HelperConfig) -> Self {
        Self { config }
    }

    /// Run the helper for `url`, forwarding progress snapshots to
    /// `on_progress`, and return the path of the file it produced.
    pub async fn run(
        &self,
        url: &str,
        height: Option<u32>,
        download_path: &Path,
        token: &CancellationToken,
        mut on_progress: impl FnMut(DownloadProgress),
    ) -> Result<PathBuf, DownloadError> {
        let template = download_path.join("%(title)s.%(ext)s");
        let args = build_args(url, height, &template.to_string_lossy(), &self.config.extra_args);
        debug!(program = %self.config.program.display(), ?args, "launching helper");

        let mut child = background_command(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| DownloadError::Internal {
            reason: "failed to capture helper stdout".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| DownloadError::Internal {
            reason: "failed to capture helper stderr".to_string(),
        })?;
        // Drain stderr concurrently so the child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut destination = DestinationTracker::default();

        loop {
            let line = tokio::select! {
                _ = token.cancelled() => {
                    terminate(&mut child).await;
                    let _ = child.wait().await;
                    stderr_task.abort();
                    return Err(DownloadError::Aborted);
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            trace!(line = line.as_str(), "helper output");
            destination.observe(&line);
            if let Some(progress) = parse_progress_line(&line) {
                on_progress(progress);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let stderr_buf = stderr_task.await.unwrap_or_default();
            let detail = String::from_utf8_lossy(&stderr_buf);
            warn!(detail = %detail.trim_end(), "helper failed");
            return Err(DownloadError::HelperFailed {
                exit_code: status.code().unwrap_or(-1),
            });
        }
        stderr_task.abort();

        destination.best.ok_or_else(|| DownloadError::Internal {
            reason: "helper finished without reporting an output path".to_string(),
        })
    }
}

/// Engine-owned helper arguments: format selector, container, output
/// template, line-buffered progress.
pub(crate) fn build_args(
    url: &str,
    height: Option<u32>,
    output_template: &str,
    extra: &[String],
) -> Vec<String> {
    let selector = match height.filter(|h| *h > 0) {
        Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
        None => "bestvideo+bestaudio/best".to_string(),
    };
    let mut args = vec![
        "-f".to_string(),
        selector,
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "-o".to_string(),
        output_template.to_string(),
        "--newline".to_string(),
        "--no-warnings".to_string(),
    ];
    args.extend(extra.iter().cloned());
    args.push(url.to_string());
    args
}

/// `[download]  42.0% of ~10.00MiB at 1.00MiB/s ETA 00:30`
pub(crate) fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let percentage: f64 = caps[1].parse().ok()?;
    let total_bytes = parse_size(&caps[2], &caps[3])?;
    let speed = parse_size(&caps[4], &caps[5])? as f64;
    let eta_seconds = parse_eta(&caps[6])? as f64;

    Some(DownloadProgress {
        downloaded_bytes: (total_bytes as f64 * percentage / 100.0) as u64,
        total_bytes,
        speed,
        eta_seconds,
        percentage: percentage.min(100.0),
        current_segment: None,
        total_segments: None,
    })
}

/// Binary units are 1024-based, decimal units 1000-based.
fn parse_size(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    let scale: f64 = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        _ => return None,
    };
    Some((value * scale) as u64)
}

/// `MM:SS` or `HH:MM:SS`.
fn parse_eta(value: &str) -> Option<u64> {
    let mut seconds = 0u64;
    for part in value.split(':') {
        seconds = seconds * 60 + part.parse::<u64>().ok()?;
    }
    Some(seconds)
}

/// Picks the best output-path report seen so far. The merger line wins over
/// the download destination, which wins over the already-downloaded notice,
/// because later pipeline stages rename the file.
#[derive(Default)]
struct DestinationTracker {
    best: Option<PathBuf>,
    best_rank: u8,
}

impl DestinationTracker {
    fn observe(&mut self, line: &str) {
        let candidate = if let Some(caps) = MERGER_RE.captures(line) {
            Some((3u8, caps[1].to_string()))
        } else if let Some(caps) = DESTINATION_RE.captures(line) {
            Some((2, caps[1].to_string()))
        } else {
            ALREADY_RE.captures(line).map(|caps| (1, caps[1].to_string()))
        };
        if let Some((rank, path)) = candidate {
            if rank > self.best_rank {
                self.best = Some(PathBuf::from(path.trim()));
                self.best_rank = rank;
            }
        }
    }
}
