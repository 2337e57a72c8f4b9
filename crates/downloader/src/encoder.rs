//! External encoder adapter.
//!
//! Locates an ffmpeg-compatible binary and drives its concat demuxer to mux
//! downloaded segments into a single container without re-encoding.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::process::{background_command, terminate};

#[cfg(windows)]
const BINARY_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "ffmpeg";

/// How long a candidate binary gets to answer `--version`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Kept from the end of stderr when a merge fails.
const STDERR_TAIL_LEN: usize = 2000;

pub struct EncoderAdapter {
    binary: PathBuf,
}

impl EncoderAdapter {
    /// Probe for a usable encoder: an explicit override first, then the
    /// standard install prefixes, then everything on `PATH`.
    pub async fn discover(override_path: Option<&Path>) -> Option<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = override_path {
            candidates.push(path.to_path_buf());
        }
        for prefix in ["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin"] {
            candidates.push(Path::new(prefix).join(BINARY_NAME));
        }
        candidates.push(PathBuf::from(r"C:\ffmpeg\bin").join(BINARY_NAME));
        if let Some(path_var) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path_var) {
                candidates.push(dir.join(BINARY_NAME));
            }
        }

        for candidate in candidates {
            if Self::validate(&candidate).await {
                info!(binary = %candidate.display(), "encoder found");
                return Some(Self { binary: candidate });
            }
        }
        warn!("no usable encoder found; merges will fall back or fail");
        None
    }

    async fn validate(path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let probe = background_command(path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, probe).await,
            Ok(Ok(status)) if status.success()
        )
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Mux `inputs` into `output` via the concat demuxer (`-c copy`).
    ///
    /// The list file is written next to the inputs and removed regardless of
    /// outcome; a non-zero exit carries the tail of stderr.
    pub async fn merge(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        token: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let list_dir = inputs
            .first()
            .and_then(|p| p.parent())
            .ok_or_else(|| DownloadError::Internal {
                reason: "merge invoked with no inputs".to_string(),
            })?;
        let list_path = list_dir.join("concat.txt");
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        let result = self.run_merge(&list_path, output, token).await;
        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            warn!(error = %e, "failed to remove concat list file");
        }
        result
    }

    async fn run_merge(
        &self,
        list_path: &Path,
        output: &Path,
        token: &CancellationToken,
    ) -> Result<(), DownloadError> {
        debug!(
            binary = %self.binary.display(),
            output = %output.display(),
            "starting concat merge"
        );
        let mut child = background_command(&self.binary)
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(list_path)
            .arg("-c")
            .arg("copy")
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stderr = child.stderr.take().ok_or_else(|| DownloadError::Internal {
            reason: "failed to capture encoder stderr".to_string(),
        })?;
        let mut stderr_buf = Vec::new();

        let status = tokio::select! {
            _ = token.cancelled() => {
                terminate(&mut child).await;
                let _ = child.wait().await;
                return Err(DownloadError::Aborted);
            }
            result = async {
                stderr.read_to_end(&mut stderr_buf).await?;
                child.wait().await
            } => result?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(DownloadError::MergeFailed {
                stderr_tail: stderr_tail(&stderr_buf),
            })
        }
    }
}

/// Concat-demuxer list body: one `file '<absolute path>'` line per input,
/// single quotes escaped the way the demuxer expects.
fn concat_list(inputs: &[PathBuf]) -> String {
    let mut body = String::new();
    for input in inputs {
        let path = input.display().to_string().replace('\'', r"'\''");
        body.push_str("file '");
        body.push_str(&path);
        body.push_str("'\n");
    }
    body
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim_end();
    match text.char_indices().nth_back(STDERR_TAIL_LEN - 1) {
        Some((idx, _)) => text[idx..].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_quotes_paths() {
        let inputs = vec![
            PathBuf::from("/tmp/scratch/segment-00000.ts"),
            PathBuf::from("/tmp/scratch/it's here.ts"),
        ];
        let list = concat_list(&inputs);
        assert_eq!(
            list,
            "file '/tmp/scratch/segment-00000.ts'\nfile '/tmp/scratch/it'\\''s here.ts'\n"
        );
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = format!("{}IMPORTANT", "x".repeat(5000));
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.chars().count(), STDERR_TAIL_LEN);
        assert!(tail.ends_with("IMPORTANT"));

        assert_eq!(stderr_tail(b"short error\n"), "short error");
    }

    #[tokio::test]
    async fn discover_skips_missing_candidates() {
        // A nonexistent override must not be reported as usable.
        let missing = Path::new("/nonexistent/definitely/ffmpeg");
        assert!(!EncoderAdapter::validate(missing).await);
    }
}
