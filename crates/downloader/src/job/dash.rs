//! DASH job execution: materialize the segment plan for the chosen
//! representation, fetch in order, merge.

use std::path::{Path, PathBuf};

use manifest::dash::{self, AdaptationSet, ContentType, Representation, SegmentPlan};
use stream_types::DownloadStatus;
use tracing::{debug, info};
use url::Url;

use super::{JobContext, cleanup_scratch, segment_error};
use crate::error::DownloadError;
use crate::progress::ProgressTracker;
use crate::scheduler::Scheduler;

impl Scheduler {
    pub(crate) async fn run_dash(&self, ctx: &JobContext) -> Result<PathBuf, DownloadError> {
        let url = ctx.source_url()?;
        let body = self.fetcher.fetch_manifest(&url, &ctx.token).await?;
        let mpd = dash::parse(&body, &url)?;
        if mpd.is_drm {
            return Err(DownloadError::DrmRefused);
        }

        let set = mpd
            .first_set_of(ContentType::Video)
            .ok_or_else(|| DownloadError::invalid_manifest("no video adaptation set"))?;
        let representation = select_representation(set, ctx.requested_height())
            .ok_or_else(|| DownloadError::invalid_manifest("adaptation set has no representations"))?;
        debug!(
            job_id = %ctx.id,
            representation = %representation.id,
            bandwidth = representation.bandwidth,
            "representation selected"
        );

        let plan = mpd.segment_plan(set, representation);
        if plan.is_empty() {
            return Err(DownloadError::UnresolvableSegments);
        }
        info!(
            job_id = %ctx.id,
            segments = plan.media.len(),
            has_init = plan.init.is_some(),
            "starting DASH download"
        );

        let scratch = ctx.scratch_dir();
        tokio::fs::create_dir_all(&scratch).await?;
        let result = self.download_and_merge_dash(ctx, &plan, &scratch).await;
        cleanup_scratch(&scratch).await;
        result
    }

    async fn download_and_merge_dash(
        &self,
        ctx: &JobContext,
        plan: &SegmentPlan,
        scratch: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let mut files = Vec::with_capacity(plan.media.len() + 1);

        if let Some(init) = &plan.init {
            let url = Url::parse(init)
                .map_err(|e| DownloadError::invalid_manifest(format!("bad init URI: {e}")))?;
            let bytes = self.fetcher.fetch_bytes(&url, None, &ctx.token).await?;
            let path = scratch.join("init.mp4");
            tokio::fs::write(&path, &bytes).await?;
            files.push(path);
        }

        let mut tracker = ProgressTracker::new(plan.media.len());
        for (index, segment_url) in plan.media.iter().enumerate() {
            if ctx.token.is_cancelled() {
                return Err(DownloadError::Aborted);
            }
            let url = Url::parse(segment_url)
                .map_err(|e| segment_error(index, DownloadError::invalid_manifest(e.to_string())))?;
            let bytes = self
                .fetcher
                .fetch_bytes(&url, None, &ctx.token)
                .await
                .map_err(|e| segment_error(index, e))?;

            let path = scratch.join(format!("segment-{index:05}.m4s"));
            tokio::fs::write(&path, &bytes).await?;
            files.push(path);

            self.publish_progress(
                &ctx.id,
                tracker.record_segment(bytes.len() as u64),
                DownloadStatus::Downloading,
            );
        }

        // Fragmented segments with a separate initialization segment need a
        // real muxer; only self-contained segments may be concatenated raw.
        let fallback = if plan.init.is_none() { Some("mp4") } else { None };
        self.assemble_output(ctx, &files, fallback).await
    }
}

fn select_representation(set: &AdaptationSet, height: Option<u32>) -> Option<&Representation> {
    if let Some(height) = height {
        if let Some(exact) = set
            .representations
            .iter()
            .find(|r| r.height == Some(height))
        {
            return Some(exact);
        }
    }
    // Video representations are sorted descending by bandwidth.
    set.representations.first()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(id: &str, bandwidth: u64, height: Option<u32>) -> Representation {
        Representation {
            id: id.to_string(),
            bandwidth,
            height,
            ..Default::default()
        }
    }

    #[test]
    fn exact_height_match_wins() {
        let set = AdaptationSet {
            representations: vec![rep("hi", 5_000_000, Some(1080)), rep("lo", 1_000_000, Some(720))],
            ..Default::default()
        };
        assert_eq!(select_representation(&set, Some(720)).unwrap().id, "lo");
    }

    #[test]
    fn falls_back_to_first() {
        let set = AdaptationSet {
            representations: vec![rep("hi", 5_000_000, Some(1080)), rep("lo", 1_000_000, Some(720))],
            ..Default::default()
        };
        assert_eq!(select_representation(&set, Some(480)).unwrap().id, "hi");
        assert_eq!(select_representation(&set, None).unwrap().id, "hi");
        assert!(select_representation(&AdaptationSet::default(), None).is_none());
    }
}
