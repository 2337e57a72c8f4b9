//! HLS job execution: resolve the media playlist, fetch segments in manifest
//! order, merge.

use std::path::{Path, PathBuf};

use manifest::hls::{self, HlsPlaylist, MasterPlaylist, MediaPlaylist, Variant};
use stream_types::DownloadStatus;
use tracing::{debug, info};
use url::Url;

use super::{JobContext, cleanup_scratch, segment_error};
use crate::error::DownloadError;
use crate::progress::ProgressTracker;
use crate::scheduler::Scheduler;

impl Scheduler {
    pub(crate) async fn run_hls(&self, ctx: &JobContext) -> Result<PathBuf, DownloadError> {
        let url = ctx.source_url()?;
        let body = self.fetcher.fetch_manifest(&url, &ctx.token).await?;
        let media = match hls::parse(&body, &url)? {
            HlsPlaylist::Master(master) => self.resolve_media_playlist(ctx, master).await?,
            HlsPlaylist::Media(media) => media,
        };
        if media.is_drm {
            return Err(DownloadError::DrmRefused);
        }
        if media.segments.is_empty() {
            return Err(DownloadError::invalid_manifest(
                "media playlist has no segments",
            ));
        }
        info!(
            job_id = %ctx.id,
            segments = media.segments.len(),
            duration_secs = media.total_duration,
            "starting HLS download"
        );

        let scratch = ctx.scratch_dir();
        tokio::fs::create_dir_all(&scratch).await?;
        let result = self.download_and_merge(ctx, &media, &scratch).await;
        cleanup_scratch(&scratch).await;
        result
    }

    async fn resolve_media_playlist(
        &self,
        ctx: &JobContext,
        master: MasterPlaylist,
    ) -> Result<MediaPlaylist, DownloadError> {
        if master.is_drm {
            return Err(DownloadError::DrmRefused);
        }
        let variant = select_variant(&master, ctx.requested_height())
            .ok_or_else(|| DownloadError::invalid_manifest("master playlist has no variants"))?;
        debug!(
            job_id = %ctx.id,
            bandwidth = variant.bandwidth,
            resolution = ?variant.resolution,
            "variant selected"
        );

        let media_url = Url::parse(&variant.url)
            .map_err(|e| DownloadError::invalid_manifest(format!("bad variant URL: {e}")))?;
        let body = self.fetcher.fetch_manifest(&media_url, &ctx.token).await?;
        match hls::parse(&body, &media_url)? {
            HlsPlaylist::Media(media) => Ok(media),
            HlsPlaylist::Master(_) => Err(DownloadError::invalid_manifest(
                "variant resolved to another master playlist",
            )),
        }
    }

    async fn download_and_merge(
        &self,
        ctx: &JobContext,
        media: &MediaPlaylist,
        scratch: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let mut files = Vec::with_capacity(media.segments.len() + 1);

        if let Some(init) = &media.init {
            let url = Url::parse(&init.uri)
                .map_err(|e| DownloadError::invalid_manifest(format!("bad init URI: {e}")))?;
            let bytes = self
                .fetcher
                .fetch_bytes(&url, init.byte_range, &ctx.token)
                .await?;
            let path = scratch.join("init.mp4");
            tokio::fs::write(&path, &bytes).await?;
            files.push(path);
        }

        let mut tracker = ProgressTracker::new(media.segments.len());
        for (index, segment) in media.segments.iter().enumerate() {
            if ctx.token.is_cancelled() {
                return Err(DownloadError::Aborted);
            }
            let url = Url::parse(&segment.uri)
                .map_err(|e| segment_error(index, DownloadError::invalid_manifest(e.to_string())))?;
            let bytes = self
                .fetcher
                .fetch_bytes(&url, segment.byte_range, &ctx.token)
                .await
                .map_err(|e| segment_error(index, e))?;

            let path = scratch.join(format!("segment-{index:05}.ts"));
            tokio::fs::write(&path, &bytes).await?;
            files.push(path);

            self.publish_progress(
                &ctx.id,
                tracker.record_segment(bytes.len() as u64),
                DownloadStatus::Downloading,
            );
        }

        // Transport-stream segments survive raw concatenation, so an absent
        // encoder degrades to a playable `.ts`.
        self.assemble_output(ctx, &files, Some("ts")).await
    }
}

fn select_variant(master: &MasterPlaylist, height: Option<u32>) -> Option<&Variant> {
    if let Some(height) = height {
        if let Some(exact) = master
            .variants
            .iter()
            .find(|v| v.resolution.is_some_and(|r| r.height == height))
        {
            return Some(exact);
        }
    }
    // Variants are sorted descending by bandwidth; first is the best.
    master.variants.first()
}
