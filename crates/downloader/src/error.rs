use reqwest::StatusCode;

/// Everything that can terminate a job. Errors never cross between jobs:
/// each is caught at the job task boundary and turned into exactly one
/// terminal event.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("manifest addressing yielded no segment URIs")]
    UnresolvableSegments,

    #[error("stream is DRM-protected; download refused")]
    DrmRefused,

    #[error("segment {index} failed after retries: {source}")]
    SegmentFetchFailed {
        index: usize,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("merge failed: {stderr_tail}")]
    MergeFailed { stderr_tail: String },

    #[error("encoder is required to merge this stream but none was found")]
    EncoderUnavailable,

    #[error("download cancelled")]
    Aborted,

    #[error("external helper exited with code {exit_code}")]
    HelperFailed { exit_code: i32 },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DownloadError {
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether a retry could plausibly succeed. Transport-level failures and
    /// server errors retry; structural and policy failures do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { source } => {
                source.is_connect()
                    || source.is_timeout()
                    || source.is_request()
                    || source.is_body()
                    || source.is_decode()
            }
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Io { .. } => true,
            _ => false,
        }
    }
}

impl From<manifest::hls::HlsError> for DownloadError {
    fn from(err: manifest::hls::HlsError) -> Self {
        Self::InvalidManifest {
            reason: err.to_string(),
        }
    }
}

impl From<manifest::dash::DashError> for DownloadError {
    fn from(err: manifest::dash::DashError) -> Self {
        Self::InvalidManifest {
            reason: err.to_string(),
        }
    }
}
