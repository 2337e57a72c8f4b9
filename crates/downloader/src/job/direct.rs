//! Direct-file job execution: one streamed GET into the output file.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use stream_types::DownloadStatus;
use tracing::info;

use super::JobContext;
use crate::error::DownloadError;
use crate::progress::ProgressTracker;
use crate::scheduler::Scheduler;

/// Progress snapshots are throttled so a fast transfer does not flood the
/// transport with per-chunk events.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

impl Scheduler {
    pub(crate) async fn run_direct(&self, ctx: &JobContext) -> Result<PathBuf, DownloadError> {
        let url = ctx.source_url()?;
        let output = ctx.download_dir.join(format!("{}.mp4", ctx.output_stem()));
        info!(job_id = %ctx.id, url = %url, output = %output.display(), "starting direct download");

        let mut tracker = ProgressTracker::new(0);
        let mut last_emit = Instant::now() - PROGRESS_INTERVAL;
        let mut last_counters = (0u64, 0u64);

        let result = self
            .fetcher
            .stream_to_file(&url, &output, &ctx.token, |downloaded, total| {
                last_counters = (downloaded, total);
                if last_emit.elapsed() >= PROGRESS_INTERVAL {
                    last_emit = Instant::now();
                    self.publish_progress(
                        &ctx.id,
                        tracker.record_stream(downloaded, total),
                        DownloadStatus::Downloading,
                    );
                }
            })
            .await;

        match result {
            Ok(_) => {
                let (downloaded, total) = last_counters;
                self.publish_progress(
                    &ctx.id,
                    tracker.record_stream(downloaded, total),
                    DownloadStatus::Downloading,
                );
                Ok(output)
            }
            Err(err) => {
                // Never leave a truncated file behind.
                let _ = tokio::fs::remove_file(&output).await;
                Err(err)
            }
        }
    }
}
