//! Progress arithmetic for segmented and streamed transfers.

use std::time::Instant;

use stream_types::DownloadProgress;

/// Accumulates transfer counters for one job and derives speed, ETA and
/// percentage from them. Emitted snapshots are monotone in bytes and
/// percentage because counters only ever grow.
pub struct ProgressTracker {
    started: Instant,
    downloaded: u64,
    total_segments: usize,
    completed_segments: usize,
}

impl ProgressTracker {
    pub fn new(total_segments: usize) -> Self {
        Self {
            started: Instant::now(),
            downloaded: 0,
            total_segments,
            completed_segments: 0,
        }
    }

    /// Record one finished segment and produce the snapshot to publish.
    pub fn record_segment(&mut self, bytes: u64) -> DownloadProgress {
        self.downloaded += bytes;
        self.completed_segments += 1;

        let elapsed = self.started.elapsed().as_secs_f64().max(1e-3);
        let speed = self.downloaded as f64 / elapsed;
        let average = self.downloaded as f64 / self.completed_segments as f64;
        let estimated_total = (average * self.total_segments as f64) as u64;
        let remaining = self.total_segments.saturating_sub(self.completed_segments);
        let eta_seconds = if speed > 0.0 {
            remaining as f64 * average / speed
        } else {
            0.0
        };
        let percentage = if self.total_segments > 0 {
            (self.completed_segments as f64 / self.total_segments as f64 * 100.0).min(100.0)
        } else {
            0.0
        };

        DownloadProgress {
            downloaded_bytes: self.downloaded,
            total_bytes: estimated_total.max(self.downloaded),
            speed,
            eta_seconds,
            percentage,
            current_segment: Some(self.completed_segments as u32),
            total_segments: Some(self.total_segments as u32),
        }
    }

    /// Snapshot for a byte-streamed transfer where only running counters and
    /// an optional `Content-Length` exist.
    pub fn record_stream(&mut self, downloaded: u64, content_length: u64) -> DownloadProgress {
        self.downloaded = self.downloaded.max(downloaded);

        let elapsed = self.started.elapsed().as_secs_f64().max(1e-3);
        let speed = self.downloaded as f64 / elapsed;
        let (percentage, eta_seconds) = if content_length > 0 {
            let pct = (self.downloaded as f64 / content_length as f64 * 100.0).min(100.0);
            let remaining = content_length.saturating_sub(self.downloaded) as f64;
            let eta = if speed > 0.0 { remaining / speed } else { 0.0 };
            (pct, eta)
        } else {
            (0.0, 0.0)
        };

        DownloadProgress {
            downloaded_bytes: self.downloaded,
            total_bytes: content_length,
            speed,
            eta_seconds,
            percentage,
            current_segment: None,
            total_segments: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_progress_is_monotone() {
        let mut tracker = ProgressTracker::new(4);
        let mut last_bytes = 0;
        let mut last_pct = 0.0;
        for bytes in [100u64, 50, 200, 150] {
            let p = tracker.record_segment(bytes);
            assert!(p.downloaded_bytes >= last_bytes);
            assert!(p.percentage >= last_pct);
            assert!(p.percentage <= 100.0);
            assert!(p.total_bytes >= p.downloaded_bytes);
            last_bytes = p.downloaded_bytes;
            last_pct = p.percentage;
        }
        assert_eq!(last_bytes, 500);
        assert_eq!(last_pct, 100.0);
    }

    #[test]
    fn segment_counters_are_reported() {
        let mut tracker = ProgressTracker::new(10);
        let p = tracker.record_segment(1000);
        assert_eq!(p.current_segment, Some(1));
        assert_eq!(p.total_segments, Some(10));
        assert!((p.percentage - 10.0).abs() < 1e-9);
        // Estimated total assumes every segment averages like the first.
        assert_eq!(p.total_bytes, 10_000);
    }

    #[test]
    fn stream_progress_with_known_length() {
        let mut tracker = ProgressTracker::new(0);
        let p = tracker.record_stream(2_500, 10_000);
        assert_eq!(p.total_bytes, 10_000);
        assert!((p.percentage - 25.0).abs() < 1e-9);
        assert!(p.speed > 0.0);
    }

    #[test]
    fn stream_progress_without_length_reports_zero_percent() {
        let mut tracker = ProgressTracker::new(0);
        let p = tracker.record_stream(5_000, 0);
        assert_eq!(p.total_bytes, 0);
        assert_eq!(p.percentage, 0.0);
        assert_eq!(p.eta_seconds, 0.0);
    }
}
