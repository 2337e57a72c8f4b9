//! Shared HTTP fetcher: one connection pool per engine, a small LRU cache
//! for manifest bodies, and retry/cancellation on every request.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RANGE};
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use manifest::hls::ByteRange;

use crate::config::HttpConfig;
use crate::error::DownloadError;
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Manifests are small and frequently re-fetched while the user is picking a
/// quality; cap the cache well below anything that could matter for memory.
const MANIFEST_CACHE_CAPACITY: u64 = 100;

pub struct HttpFetcher {
    client: Client,
    manifest_cache: Cache<String, Arc<str>>,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            });
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }

        Ok(Self {
            client: builder.build()?,
            manifest_cache: Cache::builder()
                .max_capacity(MANIFEST_CACHE_CAPACITY)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            retry: RetryPolicy::default(),
        })
    }

    /// Fetch a manifest body, serving repeats from the LRU cache.
    pub async fn fetch_manifest(
        &self,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<Arc<str>, DownloadError> {
        if let Some(cached) = self.manifest_cache.get(url.as_str()).await {
            trace!(url = %url, "manifest cache hit");
            return Ok(cached);
        }

        let body = retry_with_backoff(&self.retry, token, |_| async {
            let response = self.checked_get(url, None, token).await?;
            let text = cancellable(token, response.text()).await??;
            Ok(text)
        })
        .await?;

        let body: Arc<str> = body.into();
        self.manifest_cache
            .insert(url.to_string(), body.clone())
            .await;
        debug!(url = %url, bytes = body.len(), "manifest fetched");
        Ok(body)
    }

    /// Fetch a whole segment into memory, optionally restricted to a byte
    /// range, with the engine retry policy applied.
    pub async fn fetch_bytes(
        &self,
        url: &Url,
        range: Option<ByteRange>,
        token: &CancellationToken,
    ) -> Result<Bytes, DownloadError> {
        retry_with_backoff(&self.retry, token, |_| async {
            let response = self.checked_get(url, range, token).await?;
            let bytes = cancellable(token, response.bytes()).await??;
            Ok(bytes)
        })
        .await
    }

    /// Stream a response body straight to disk, reporting running counters
    /// through `on_progress(downloaded, content_length)`.
    pub async fn stream_to_file(
        &self,
        url: &Url,
        dest: &Path,
        token: &CancellationToken,
        mut on_progress: impl FnMut(u64, u64),
    ) -> Result<u64, DownloadError> {
        let response = self.checked_get(url, None, token).await?;
        let total = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Err(DownloadError::Aborted),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    downloaded += chunk.len() as u64;
                    on_progress(downloaded, total);
                }
                None => break,
            }
        }
        file.flush().await?;
        Ok(downloaded)
    }

    async fn checked_get(
        &self,
        url: &Url,
        range: Option<ByteRange>,
        token: &CancellationToken,
    ) -> Result<Response, DownloadError> {
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range.to_http_range());
        }
        let response = cancellable(token, request.send()).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

/// Await `fut` unless the token fires first.
async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, DownloadError>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        _ = token.cancelled() => Err(DownloadError::Aborted),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manifest_cache_serves_inserted_bodies() {
        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let url = Url::parse("https://cdn.example.com/a.m3u8").unwrap();
        let body: Arc<str> = "#EXTM3U\n".into();
        fetcher
            .manifest_cache
            .insert(url.to_string(), body.clone())
            .await;

        let token = CancellationToken::new();
        let fetched = fetcher.fetch_manifest(&url, &token).await.unwrap();
        assert_eq!(&*fetched, "#EXTM3U\n");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_network() {
        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let url = Url::parse("https://cdn.example.com/never.m3u8").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = fetcher.fetch_manifest(&url, &token).await.unwrap_err();
        assert!(matches!(err, DownloadError::Aborted));
    }
}
