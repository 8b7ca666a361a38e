//! HTTP access to upstream services, always routed through the [`CacheStore`].

use crate::cache::error::CacheError;
use crate::cache::expiry::ExpiryClass;
use crate::cache::store::{CacheKey, CacheStore};
use crate::files::remote_file::RemoteFileRef;
use crate::network::error::NetworkError;
use crate::settings::Settings;
use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use url::Url;

#[derive(Debug)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    cache: Arc<CacheStore>,
    timeout: Duration,
}

impl RemoteFetcher {
    /// Creates a fetcher identifying itself with the settings' user agent.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ClientBuild`] if the HTTP client cannot be set up,
    /// e.g. because the user agent is not a valid header value.
    pub fn new(settings: &Settings, cache: Arc<CacheStore>) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent())
            .timeout(settings.timeout())
            .build()
            .map_err(NetworkError::ClientBuild)?;
        Ok(Self {
            client,
            cache,
            timeout: settings.timeout(),
        })
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Returns the bytes behind `url`, served from the cache while the entry is
    /// live under `expiry`.
    pub async fn fetch(&self, url: &Url, expiry: ExpiryClass) -> Result<Vec<u8>, NetworkError> {
        self.fetch_keyed(url, &CacheKey::from_url(url), expiry)
            .await
    }

    /// Like [`RemoteFetcher::fetch`] for an indexed data file. The cache key
    /// carries the file's last-modified hint and the expiry follows its period.
    pub async fn fetch_file(&self, file: &RemoteFileRef) -> Result<Vec<u8>, NetworkError> {
        self.fetch_keyed(&file.url, &file.cache_key(), file.expiry())
            .await
    }

    async fn fetch_keyed(
        &self,
        url: &Url,
        key: &CacheKey,
        expiry: ExpiryClass,
    ) -> Result<Vec<u8>, NetworkError> {
        self.cache
            .get_or_fetch(key, expiry, || self.download(url))
            .await
            .map_err(surface_network_error)
    }

    /// Downloads `url` bypassing the cache. `.gz` resources are decompressed
    /// while streaming.
    pub async fn download(&self, url: &Url) -> Result<Vec<u8>, NetworkError> {
        info!("Downloading {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(match e.status() {
                    Some(status) => NetworkError::RemoteUnavailable {
                        url: url.to_string(),
                        status,
                    },
                    None => self.request_error(url, e),
                });
            }
        };

        if !url.path().ends_with(".gz") {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| self.request_error(url, e))?;
            return Ok(bytes.to_vec());
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut decoder = GzipDecoder::new(StreamReader::new(stream));
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .await
            .map_err(|e| NetworkError::DownloadIo(url.to_string(), e))?;
        info!(
            "Decompressed {} bytes from {}",
            decompressed.len(),
            url
        );
        Ok(decompressed)
    }

    fn request_error(&self, url: &Url, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            NetworkError::NetworkRequest(url.to_string(), e)
        }
    }
}

/// Unwraps a failed fetch closure so callers see the original network error.
fn surface_network_error(error: CacheError) -> NetworkError {
    match error {
        CacheError::FetchFailed { key, source } => match source.downcast::<NetworkError>() {
            Ok(network) => *network,
            Err(source) => NetworkError::FetchFailed(CacheError::FetchFailed { key, source }),
        },
        other => NetworkError::FetchFailed(other),
    }
}
