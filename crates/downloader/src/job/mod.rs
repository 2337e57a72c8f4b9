//! Per-type job execution. Each runner takes a [`JobContext`] snapshot and
//! returns the finished output path; every error it can produce maps to one
//! terminal event at the scheduler boundary.

mod dash;
mod direct;
mod hls;

use std::path::{Path, PathBuf};

use stream_types::{DetectedStream, DownloadStatus, VideoQuality};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::error::DownloadError;
use crate::helper::HelperAdapter;
use crate::sanitize::sanitize_title;
use crate::scheduler::Scheduler;

/// Immutable per-job state handed to a runner. The token is the same one the
/// cancel API holds; nothing else is shared.
pub(crate) struct JobContext {
    pub id: String,
    pub stream: DetectedStream,
    pub quality: VideoQuality,
    pub download_dir: PathBuf,
    pub token: CancellationToken,
}

impl JobContext {
    pub fn scratch_dir(&self) -> PathBuf {
        self.download_dir.join(format!(".scratch-{}", self.id))
    }

    pub fn output_stem(&self) -> String {
        sanitize_title(self.stream.display_title())
    }

    pub fn source_url(&self) -> Result<Url, DownloadError> {
        Url::parse(&self.stream.url)
            .map_err(|e| DownloadError::invalid_manifest(format!("bad source URL: {e}")))
    }

    /// Requested height, when the rendition advertises one.
    pub fn requested_height(&self) -> Option<u32> {
        Some(self.quality.height).filter(|h| *h > 0)
    }
}

impl Scheduler {
    /// Delegated path: the helper process owns the entire transfer, the
    /// engine only relays its progress.
    pub(crate) async fn run_helper(&self, ctx: &JobContext) -> Result<PathBuf, DownloadError> {
        let Some(config) = self.helper_config() else {
            return Err(DownloadError::configuration(
                "no external helper configured for delegated downloads",
            ));
        };
        let adapter = HelperAdapter::new(config.clone());
        adapter
            .run(
                &ctx.stream.url,
                ctx.requested_height(),
                &ctx.download_dir,
                &ctx.token,
                |progress| self.publish_progress(&ctx.id, progress, DownloadStatus::Downloading),
            )
            .await
    }

    /// Merge segment files into the final container, falling back to raw
    /// concatenation when no encoder is available and `fallback_ext` allows
    /// it (transport streams survive concatenation; fragmented MP4 needs the
    /// encoder unless it is self-contained).
    pub(crate) async fn assemble_output(
        &self,
        ctx: &JobContext,
        files: &[PathBuf],
        fallback_ext: Option<&str>,
    ) -> Result<PathBuf, DownloadError> {
        let stem = ctx.output_stem();
        match &self.encoder {
            Some(encoder) => {
                let output = ctx.download_dir.join(format!("{stem}.mp4"));
                self.mark_merging(&ctx.id);
                encoder.merge(files, &output, &ctx.token).await?;
                Ok(output)
            }
            None => {
                let Some(ext) = fallback_ext else {
                    return Err(DownloadError::EncoderUnavailable);
                };
                warn!(job_id = %ctx.id, "no encoder available, concatenating segments");
                let output = ctx.download_dir.join(format!("{stem}.{ext}"));
                concat_files(files, &output).await?;
                Ok(output)
            }
        }
    }
}

/// Append every input to `output` in order.
pub(crate) async fn concat_files(files: &[PathBuf], output: &Path) -> Result<(), DownloadError> {
    let mut out = tokio::fs::File::create(output).await?;
    for file in files {
        let mut input = tokio::fs::File::open(file).await?;
        tokio::io::copy(&mut input, &mut out).await?;
    }
    Ok(())
}

/// Keep cancellation distinct; wrap everything else with the segment index.
pub(crate) fn segment_error(index: usize, err: DownloadError) -> DownloadError {
    match err {
        DownloadError::Aborted => DownloadError::Aborted,
        other => DownloadError::SegmentFetchFailed {
            index,
            source: Box::new(other),
        },
    }
}

/// Remove a scratch directory, best-effort.
pub(crate) async fn cleanup_scratch(scratch: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(scratch = %scratch.display(), error = %e, "failed to remove scratch directory");
        }
    }
}
