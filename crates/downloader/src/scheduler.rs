//! Job scheduling: admission, bounded concurrency, cancellation and the
//! event fan-out back to the transport.
//!
//! The job table is the only state shared with callers. Sinks are opaque
//! function values so nothing here ever holds a reference back into the
//! shell that owns the scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use stream_types::{
    AudioTrack, DetectedStream, DownloadJob, DownloadProgress, DownloadStatus, Protection,
    StreamType, VideoQuality, now_ms,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::encoder::EncoderAdapter;
use crate::error::DownloadError;
use crate::fetch::HttpFetcher;
use crate::job::JobContext;

pub type ProgressSink = Arc<dyn Fn(&str, &DownloadProgress, DownloadStatus) + Send + Sync>;
pub type CompleteSink = Arc<dyn Fn(&str, &Path) + Send + Sync>;
pub type ErrorSink = Arc<dyn Fn(&str, &DownloadError) + Send + Sync>;

/// Event outlets owned by the scheduler.
#[derive(Clone)]
pub struct EventSinks {
    pub progress: ProgressSink,
    pub complete: CompleteSink,
    pub error: ErrorSink,
}

impl EventSinks {
    pub fn new(progress: ProgressSink, complete: CompleteSink, error: ErrorSink) -> Self {
        Self {
            progress,
            complete,
            error,
        }
    }

    /// Sinks that drop every event; for embedders that only poll.
    pub fn noop() -> Self {
        Self {
            progress: Arc::new(|_, _, _| {}),
            complete: Arc::new(|_, _| {}),
            error: Arc::new(|_, _| {}),
        }
    }
}

struct JobEntry {
    job: DownloadJob,
    token: CancellationToken,
    download_dir: PathBuf,
}

enum Terminal {
    Completed(PathBuf),
    Failed(DownloadError),
    Cancelled,
}

pub struct Scheduler {
    config: EngineConfig,
    pub(crate) fetcher: Arc<HttpFetcher>,
    pub(crate) encoder: Option<Arc<EncoderAdapter>>,
    jobs: DashMap<String, JobEntry>,
    /// Job ids in creation order, for stable snapshots.
    order: Mutex<Vec<String>>,
    semaphore: Arc<Semaphore>,
    sinks: EventSinks,
    seq: AtomicU64,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<HttpFetcher>,
        encoder: Option<Arc<EncoderAdapter>>,
        sinks: EventSinks,
    ) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Arc::new(Self {
            config,
            fetcher,
            encoder,
            jobs: DashMap::new(),
            order: Mutex::new(Vec::new()),
            semaphore,
            sinks,
            seq: AtomicU64::new(0),
        })
    }

    pub(crate) fn helper_config(&self) -> Option<&crate::config::HelperConfig> {
        self.config.helper.as_ref()
    }

    /// Enqueue a download and return its job id immediately.
    ///
    /// DRM-marked streams are refused up front: the job lands in the table
    /// as `failed` and no network request is ever made for it.
    pub fn start_download(
        self: &Arc<Self>,
        stream: DetectedStream,
        quality: VideoQuality,
        audio: Option<AudioTrack>,
    ) -> String {
        self.start_download_to(stream, quality, audio, None)
    }

    /// Like [`Self::start_download`] with a per-job output directory.
    pub fn start_download_to(
        self: &Arc<Self>,
        stream: DetectedStream,
        quality: VideoQuality,
        audio: Option<AudioTrack>,
        output_dir: Option<PathBuf>,
    ) -> String {
        let id = format!("job-{}-{}", now_ms(), self.seq.fetch_add(1, Ordering::Relaxed));
        let drm = stream.protection == Protection::Drm;
        let stream_type = stream.stream_type;

        let entry = JobEntry {
            job: DownloadJob::new(id.clone(), stream, quality, audio),
            token: CancellationToken::new(),
            download_dir: output_dir.unwrap_or_else(|| self.config.download_path.clone()),
        };
        self.jobs.insert(id.clone(), entry);
        self.order.lock().push(id.clone());
        info!(job_id = %id, ?stream_type, "download requested");

        if drm {
            self.finish(&id, Terminal::Failed(DownloadError::DrmRefused));
            return id;
        }
        if stream_type == StreamType::Unknown {
            self.finish(
                &id,
                Terminal::Failed(DownloadError::configuration(
                    "stream type could not be classified",
                )),
            );
            return id;
        }

        let scheduler = Arc::clone(self);
        let job_id = id.clone();
        tokio::spawn(async move { scheduler.run_job(job_id).await });
        id
    }

    /// Cancel a job. Pending jobs terminate immediately; running jobs
    /// observe the token at their next suspension point. Idempotent, and a
    /// no-op for unknown ids and jobs already in a terminal state.
    pub fn cancel_download(&self, id: &str) {
        let Some(entry) = self.jobs.get(id) else {
            warn!(job_id = id, "cancel requested for unknown job");
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }
        let token = entry.token.clone();
        let was_pending = entry.job.status == DownloadStatus::Pending;
        drop(entry);

        info!(job_id = id, was_pending, "cancelling download");
        token.cancel();
        if was_pending {
            self.finish(id, Terminal::Cancelled);
        }
    }

    /// Snapshot of every job the scheduler has seen, in creation order.
    /// Terminal jobs are retained for the process lifetime.
    pub fn get_downloads(&self) -> Vec<DownloadJob> {
        let order = self.order.lock();
        order
            .iter()
            .filter_map(|id| self.jobs.get(id).map(|e| e.job.clone()))
            .collect()
    }

    async fn run_job(self: Arc<Self>, id: String) {
        let Some(entry) = self.jobs.get(&id) else { return };
        let token = entry.token.clone();
        let ctx = JobContext {
            id: id.clone(),
            stream: entry.job.stream.clone(),
            quality: entry.job.quality.clone(),
            download_dir: entry.download_dir.clone(),
            token: token.clone(),
        };
        drop(entry);

        // The permit gates pending → downloading; a cancel while queued wins.
        let permit = tokio::select! {
            _ = token.cancelled() => {
                self.finish(&id, Terminal::Cancelled);
                return;
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        if token.is_cancelled() {
            self.finish(&id, Terminal::Cancelled);
            return;
        }

        self.publish_progress(&id, DownloadProgress::default(), DownloadStatus::Downloading);

        let result = match ctx.stream.stream_type {
            StreamType::Hls => self.run_hls(&ctx).await,
            StreamType::Dash => self.run_dash(&ctx).await,
            StreamType::Direct => self.run_direct(&ctx).await,
            StreamType::Ytdlp => self.run_helper(&ctx).await,
            StreamType::Unknown => Err(DownloadError::configuration(
                "stream type could not be classified",
            )),
        };

        match result {
            Ok(output) => self.finish(&id, Terminal::Completed(output)),
            Err(DownloadError::Aborted) => self.finish(&id, Terminal::Cancelled),
            Err(err) => self.finish(&id, Terminal::Failed(err)),
        }
        drop(permit);
    }

    /// Record a progress update and forward it to the sink. Ignored once the
    /// job is terminal so late updates from a cancelled task cannot resurface.
    pub(crate) fn publish_progress(
        &self,
        id: &str,
        progress: DownloadProgress,
        status: DownloadStatus,
    ) {
        {
            let Some(mut entry) = self.jobs.get_mut(id) else { return };
            if entry.job.status.is_terminal() {
                return;
            }
            entry.job.status = status;
            entry.job.progress = progress.clone();
        }
        // Sink runs without the table lock: handlers may call back in.
        (self.sinks.progress)(id, &progress, status);
    }

    pub(crate) fn mark_merging(&self, id: &str) {
        let progress = {
            let Some(mut entry) = self.jobs.get_mut(id) else { return };
            if entry.job.status.is_terminal() {
                return;
            }
            entry.job.status = DownloadStatus::Merging;
            entry.job.progress.clone()
        };
        (self.sinks.progress)(id, &progress, DownloadStatus::Merging);
    }

    /// The single door into a terminal state. Exactly one terminal event is
    /// emitted per job; anything after the first transition is dropped.
    fn finish(&self, id: &str, terminal: Terminal) {
        let emitted = {
            let Some(mut entry) = self.jobs.get_mut(id) else { return };
            if entry.job.status.is_terminal() {
                return;
            }
            entry.job.completed_at = Some(now_ms());
            match &terminal {
                Terminal::Completed(output) => {
                    entry.job.status = DownloadStatus::Completed;
                    entry.job.progress.percentage = 100.0;
                    entry.job.output_path = Some(output.display().to_string());
                }
                Terminal::Failed(err) => {
                    entry.job.status = DownloadStatus::Failed;
                    entry.job.error = Some(err.to_string());
                }
                Terminal::Cancelled => {
                    entry.job.status = DownloadStatus::Cancelled;
                }
            }
            entry.job.progress.clone()
        };

        match terminal {
            Terminal::Completed(output) => {
                info!(job_id = id, output = %output.display(), "download complete");
                (self.sinks.complete)(id, &output);
            }
            Terminal::Failed(err) => {
                warn!(job_id = id, error = %err, "download failed");
                (self.sinks.error)(id, &err);
            }
            Terminal::Cancelled => {
                debug!(job_id = id, "download cancelled");
                (self.sinks.progress)(id, &emitted, DownloadStatus::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use std::sync::atomic::AtomicUsize;

    fn stream(stream_type: StreamType, protection: Protection) -> DetectedStream {
        DetectedStream {
            id: "s1".to_string(),
            url: "https://cdn.example.com/v.m3u8".to_string(),
            stream_type,
            protection,
            qualities: Vec::new(),
            audio_tracks: Vec::new(),
            title: Some("Clip".to_string()),
            duration: None,
            thumbnail: None,
            page_url: "https://example.com/watch".to_string(),
            page_title: "Watch".to_string(),
            detected_at: 0,
        }
    }

    fn quality() -> VideoQuality {
        VideoQuality::new(Some(stream_types::Resolution::new(1920, 1080)), None, None)
    }

    fn scheduler_with_sinks(sinks: EventSinks) -> Arc<Scheduler> {
        let fetcher = Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        Scheduler::new(EngineConfig::new("/tmp/dl-test"), fetcher, None, sinks)
    }

    #[tokio::test]
    async fn drm_stream_is_refused_without_fetching() {
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_seen = Arc::clone(&errors);
        let sinks = EventSinks::new(
            Arc::new(|_, _, _| {}),
            Arc::new(|_, _| panic!("DRM job must not complete")),
            Arc::new(move |_, err| {
                assert!(matches!(err, DownloadError::DrmRefused));
                errors_seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let scheduler = scheduler_with_sinks(sinks);
        let id = scheduler.start_download(stream(StreamType::Hls, Protection::Drm), quality(), None);

        let jobs = scheduler.get_downloads();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].status, DownloadStatus::Failed);
        assert!(jobs[0].error.as_deref().unwrap().contains("DRM"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_stream_type_fails_immediately() {
        let scheduler = scheduler_with_sinks(EventSinks::noop());
        let id =
            scheduler.start_download(stream(StreamType::Unknown, Protection::None), quality(), None);
        let jobs = scheduler.get_downloads();
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].status, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_terminal_events_unique() {
        let cancelled_events = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cancelled_events);
        let sinks = EventSinks::new(
            Arc::new(move |_, _, status| {
                if status == DownloadStatus::Cancelled {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Arc::new(|_, _| panic!("cancelled job must not complete")),
            Arc::new(|_, err| panic!("cancelled job must not error: {err}")),
        );
        let scheduler = scheduler_with_sinks(sinks);

        // The unreachable host keeps the job inside its retry loop long
        // enough for the cancel to land first.
        let mut s = stream(StreamType::Hls, Protection::None);
        s.url = "https://192.0.2.1/v.m3u8".to_string();
        let id = scheduler.start_download(s, quality(), None);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        scheduler.cancel_download(&id);
        scheduler.cancel_download(&id);
        scheduler.cancel_download("no-such-job");

        // Wait for the job task to observe the token.
        for _ in 0..100 {
            if scheduler.get_downloads()[0].status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(
            scheduler.get_downloads()[0].status,
            DownloadStatus::Cancelled
        );
        assert_eq!(cancelled_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn snapshots_are_creation_ordered() {
        let scheduler = scheduler_with_sinks(EventSinks::noop());
        let a = scheduler.start_download(stream(StreamType::Hls, Protection::Drm), quality(), None);
        let b = scheduler.start_download(stream(StreamType::Dash, Protection::Drm), quality(), None);
        let c = scheduler.start_download(stream(StreamType::Hls, Protection::Drm), quality(), None);
        let ids: Vec<_> = scheduler.get_downloads().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test]
    async fn late_progress_after_terminal_is_dropped() {
        let scheduler = scheduler_with_sinks(EventSinks::noop());
        let id = scheduler.start_download(stream(StreamType::Hls, Protection::Drm), quality(), None);
        // Job is already failed; a straggling update must not revive it.
        scheduler.publish_progress(&id, DownloadProgress::default(), DownloadStatus::Downloading);
        assert_eq!(scheduler.get_downloads()[0].status, DownloadStatus::Failed);
    }
}
