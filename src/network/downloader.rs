use crate::files::remote_file::RemoteFileRef;
use crate::network::error::NetworkError;
use crate::network::fetcher::RemoteFetcher;
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::Arc;

/// Outcome of one file of a batch.
#[derive(Debug)]
pub struct Download {
    pub file: RemoteFileRef,
    pub result: Result<Vec<u8>, NetworkError>,
}

/// Fetches batches of files on spawned tasks with a bounded number in flight.
#[derive(Debug, Clone)]
pub struct ParallelDownloader {
    fetcher: Arc<RemoteFetcher>,
    concurrency: usize,
}

impl ParallelDownloader {
    pub fn new(fetcher: Arc<RemoteFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Downloads every file with the configured concurrency.
    pub async fn fetch_many(&self, files: Vec<RemoteFileRef>) -> Vec<Download> {
        self.fetch_many_with_limit(files, self.concurrency).await
    }

    /// Downloads every file, at most `limit` at a time. Results come back in
    /// input order and a failing file never affects the others. Dropping the
    /// returned future stops new downloads from starting.
    pub async fn fetch_many_with_limit(
        &self,
        files: Vec<RemoteFileRef>,
        limit: usize,
    ) -> Vec<Download> {
        debug!("Fetching {} files, {} at a time", files.len(), limit.max(1));
        stream::iter(files)
            .map(|file| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let task_file = file.clone();
                    let handle =
                        tokio::spawn(async move { fetcher.fetch_file(&task_file).await });
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(NetworkError::TaskJoin(e)),
                    };
                    if let Err(e) = &result {
                        warn!("Download of {} failed: {}", file.url, e);
                    }
                    Download { file, result }
                }
            })
            .buffered(limit.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::CacheStore;
    use crate::files::remote_file::FileTarget;
    use crate::parsing::RawParser;
    use crate::settings::Settings;
    use crate::types::period::Period;
    use crate::types::resolution::Resolution;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file(server: &MockServer, name: &str) -> RemoteFileRef {
        RemoteFileRef {
            url: Url::parse(&format!("{}/files/{}", server.uri(), name)).unwrap(),
            target: FileTarget::Station(name.to_string()),
            dataset: "air_temperature".into(),
            resolution: Resolution::Daily,
            period: Period::Recent,
            last_modified: None,
            date_range: None,
            format: RawParser::default(),
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let server = MockServer::start().await;
        for name in ["a", "c", "d"] {
            Mock::given(method("GET"))
                .and(path(format!("/files/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(name))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/files/b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = RemoteFetcher::new(
            &Settings::default(),
            Arc::new(CacheStore::disabled()),
        )
        .unwrap();
        let downloader = ParallelDownloader::new(Arc::new(fetcher), 2);
        let files = ["a", "b", "c", "d"].map(|n| file(&server, n)).to_vec();

        let downloads = downloader.fetch_many(files).await;

        assert_eq!(downloads.len(), 4);
        let names: Vec<&str> = downloads.iter().map(|d| d.file.file_name()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(downloads.iter().filter(|d| d.result.is_err()).count(), 1);
        assert!(matches!(
            downloads[1].result,
            Err(NetworkError::RemoteUnavailable { .. })
        ));
        assert_eq!(downloads[3].result.as_deref().unwrap(), b"d");
    }

    #[tokio::test]
    async fn zero_limit_still_makes_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .mount(&server)
            .await;
        let fetcher = RemoteFetcher::new(
            &Settings::default(),
            Arc::new(CacheStore::disabled()),
        )
        .unwrap();
        let downloader = ParallelDownloader::new(Arc::new(fetcher), 8);

        let downloads = downloader
            .fetch_many_with_limit(vec![file(&server, "only")], 0)
            .await;
        assert!(downloads[0].result.is_ok());
    }
}
