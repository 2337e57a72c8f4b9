use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// HTTP client options shared by every job.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall per-request timeout; zero disables it (large segment bodies).
    pub timeout: Duration,
    /// Connection-establishment timeout.
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub follow_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            follow_redirects: true,
        }
    }
}

/// The delegated-extractor child process for `ytdlp` streams.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    pub program: PathBuf,
    /// Appended after the engine-owned arguments.
    pub extra_args: Vec<String>,
}

impl HelperConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }
}

/// Engine-wide configuration owned by the [`crate::Scheduler`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where finished files land; scratch directories live underneath.
    pub download_path: PathBuf,
    /// Jobs allowed in `downloading` at once.
    pub max_concurrent: usize,
    pub http: HttpConfig,
    pub helper: Option<HelperConfig>,
}

impl EngineConfig {
    pub fn new(download_path: impl Into<PathBuf>) -> Self {
        Self {
            download_path: download_path.into(),
            max_concurrent: 3,
            http: HttpConfig::default(),
            helper: None,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_helper(mut self, helper: HelperConfig) -> Self {
        self.helper = Some(helper);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::new("/tmp/downloads");
        assert_eq!(config.max_concurrent, 3);
        assert!(config.helper.is_none());
        assert!(config.http.follow_redirects);
    }

    #[test]
    fn max_concurrent_floor_is_one() {
        let config = EngineConfig::new("/tmp").with_max_concurrent(0);
        assert_eq!(config.max_concurrent, 1);
    }
}
