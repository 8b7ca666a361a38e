//! Expiry-aware on-disk cache for remote bytes.
//!
//! Every entry is a single file named after the SHA-256 of its [`CacheKey`],
//! holding a bincode envelope with the fetch time, the expiry class the entry
//! was written with and the payload. Entries are replaced atomically by
//! writing a temporary file in the same directory and renaming it.

use crate::cache::error::CacheError;
use crate::cache::expiry::ExpiryClass;
use bincode::config::{Configuration, Fixint, LittleEndian};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::{fs, task};
use url::Url;

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();
const ENTRY_EXTENSION: &str = "bin";

/// Identifies a cached artifact: a normalized URL plus an optional version tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builds a key from a URL. The fragment is dropped and query pairs are
    /// sorted so equivalent requests share one entry.
    pub fn from_url(url: &Url) -> Self {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        let mut pairs: Vec<(String, String)> = normalized.query_pairs().into_owned().collect();
        if pairs.is_empty() {
            normalized.set_query(None);
        } else {
            pairs.sort();
            normalized.query_pairs_mut().clear().extend_pairs(pairs);
        }
        Self(normalized.into())
    }

    /// Appends a version tag, e.g. the upstream last-modified time, so a
    /// re-published file does not hit the entry of its predecessor.
    pub fn with_version(self, version: impl fmt::Display) -> Self {
        Self(format!("{}#v={}", self.0, version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn file_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}.{}", hasher.finalize(), ENTRY_EXTENSION)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    fetched_at_ms: i64,
    expiry: ExpiryClass,
    payload: Vec<u8>,
}

impl CacheEnvelope {
    fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis() - self.fetched_at_ms;
        Duration::from_millis(elapsed.max(0) as u64)
    }
}

/// Content cache shared by everything that talks to remote services.
///
/// Concurrent callers asking for the same key wait for each other, so within
/// one process a live key is fetched at most once per expiry window.
#[derive(Debug)]
pub struct CacheStore {
    directory: Option<PathBuf>,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory: Some(directory),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// A store that never persists anything; every lookup is a miss.
    pub fn disabled() -> Self {
        Self {
            directory: None,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Returns the live entry for `key` or runs `fetch`, stores its result and
    /// returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::FetchFailed`] wrapping the error of `fetch`. The
    /// cache is not modified in that case. Failing to write a fetched payload
    /// is logged and does not fail the call.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &CacheKey,
        expiry: ExpiryClass,
        fetch: F,
    ) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let lock = self.key_lock(key).await;
        let guard = lock.lock().await;
        let result = self.fetch_locked(key, expiry, fetch).await;
        drop(guard);
        self.release_key_lock(key, lock).await;
        result
    }

    async fn fetch_locked<F, Fut, E>(
        &self,
        key: &CacheKey,
        expiry: ExpiryClass,
        fetch: F,
    ) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(payload) = self.get(key, expiry).await {
            debug!("Cache hit for {}", key);
            return Ok(payload);
        }
        debug!("Cache miss for {}", key);

        let payload = fetch().await.map_err(|e| CacheError::FetchFailed {
            key: key.to_string(),
            source: Box::new(e),
        })?;

        if expiry.is_cacheable() {
            if let Err(e) = self.put(key, expiry, &payload).await {
                warn!("Could not cache {}: {}", key, e);
            }
        }
        Ok(payload)
    }

    /// Returns the payload for `key` if an entry exists and is fresh under `expiry`.
    pub async fn get(&self, key: &CacheKey, expiry: ExpiryClass) -> Option<Vec<u8>> {
        if !expiry.is_cacheable() {
            return None;
        }
        let path = self.entry_path(key)?;
        let envelope = Self::read_envelope(path).await?;
        let age = envelope.age();
        if expiry.is_fresh(age) {
            Some(envelope.payload)
        } else {
            debug!("Cache entry for {} is stale ({:?} old)", key, age);
            None
        }
    }

    /// Stores `payload` under `key`, replacing any previous entry atomically.
    pub async fn put(
        &self,
        key: &CacheKey,
        expiry: ExpiryClass,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        let envelope = CacheEnvelope {
            fetched_at_ms: Utc::now().timestamp_millis(),
            expiry,
            payload: payload.to_vec(),
        };
        self.write_envelope(key, envelope).await
    }

    /// Age of the entry for `key`, as recorded when it was fetched.
    pub async fn entry_age(&self, key: &CacheKey) -> Option<Duration> {
        let path = self.entry_path(key)?;
        Some(Self::read_envelope(path).await?.age())
    }

    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        let Some(path) = self.entry_path(key) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::CacheDeletion(path, e)),
        }
    }

    /// Removes every cache entry, leaving unrelated files in the directory alone.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.remove_entries(|_| true).await
    }

    /// Removes entries that are stale under the expiry class they were written with.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        self.remove_entries(|envelope| !envelope.expiry.is_fresh(envelope.age()))
            .await
    }

    async fn remove_entries(
        &self,
        should_remove: impl Fn(&CacheEnvelope) -> bool,
    ) -> Result<usize, CacheError> {
        let Some(directory) = &self.directory else {
            return Ok(0);
        };
        let mut entries = match fs::read_dir(directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::CacheDeletion(directory.clone(), e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::CacheDeletion(directory.clone(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let remove = match Self::read_envelope(path.clone()).await {
                Some(envelope) => should_remove(&envelope),
                None => true,
            };
            if remove {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| CacheError::CacheDeletion(path.clone(), e))?;
                removed += 1;
            }
        }
        info!("Removed {} cache entries from {:?}", removed, directory);
        Ok(removed)
    }

    fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|directory| directory.join(key.file_name()))
    }

    async fn read_envelope(path: PathBuf) -> Option<CacheEnvelope> {
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read cache file {:?}: {}", path, e);
                return None;
            }
        };
        let decoded = task::spawn_blocking(move || {
            bincode::serde::decode_from_slice::<CacheEnvelope, _>(&bytes, BINCODE_CONFIG)
        })
        .await;
        match decoded {
            Ok(Ok((envelope, _))) => Some(envelope),
            Ok(Err(e)) => {
                warn!("Discarding unreadable cache file {:?}: {}", path, e);
                None
            }
            Err(e) => {
                warn!("Decoding cache file {:?} did not complete: {}", path, e);
                None
            }
        }
    }

    async fn write_envelope(
        &self,
        key: &CacheKey,
        envelope: CacheEnvelope,
    ) -> Result<(), CacheError> {
        let Some(directory) = self.directory.clone() else {
            return Ok(());
        };
        let path = directory.join(key.file_name());
        task::spawn_blocking(move || {
            let encoded = bincode::serde::encode_to_vec(&envelope, BINCODE_CONFIG)
                .map_err(|e| CacheError::CacheEncode(Box::new(e)))?;
            std::fs::create_dir_all(&directory)
                .map_err(|e| CacheError::CacheDirCreation(directory.clone(), e))?;
            let mut temp_file = NamedTempFile::new_in(&directory)
                .map_err(|e| CacheError::CacheWrite(path.clone(), e))?;
            temp_file
                .write_all(&encoded)
                .map_err(|e| CacheError::CacheWrite(path.clone(), e))?;
            temp_file
                .persist(&path)
                .map_err(|e| CacheError::CacheWrite(path.clone(), e.error))?;
            Ok::<(), CacheError>(())
        })
        .await??;
        Ok(())
    }

    async fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight.entry(key.clone()).or_default().clone()
    }

    async fn release_key_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut inflight = self.inflight.lock().await;
        // The map and `lock` are the last two owners when nobody else is waiting.
        if Arc::strong_count(&lock) <= 2 {
            inflight.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> CacheKey {
        CacheKey::new("https://example.org/data/file.zip")
    }

    async fn counting_fetch(
        counter: &AtomicUsize,
        payload: &'static [u8],
    ) -> Result<Vec<u8>, io::Error> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(payload.to_vec())
    }

    #[tokio::test]
    async fn live_entry_is_fetched_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        let calls = AtomicUsize::new(0);

        let first = store
            .get_or_fetch(&key(), ExpiryClass::FiveMinutes, || {
                counting_fetch(&calls, b"payload")
            })
            .await
            .unwrap();
        let second = store
            .get_or_fetch(&key(), ExpiryClass::FiveMinutes, || {
                counting_fetch(&calls, b"other")
            })
            .await
            .unwrap();

        assert_eq!(first, b"payload");
        assert_eq!(second, b"payload");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        let calls = AtomicUsize::new(0);
        let k = key();

        let (a, b) = tokio::join!(
            store.get_or_fetch(&k, ExpiryClass::OneHour, || counting_fetch(&calls, b"x")),
            store.get_or_fetch(&k, ExpiryClass::OneHour, || counting_fetch(&calls, b"x")),
        );

        assert_eq!(a.unwrap(), b"x");
        assert_eq!(b.unwrap(), b"x");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.inflight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn no_cache_always_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            store
                .get_or_fetch(&key(), ExpiryClass::NoCache, || counting_fetch(&calls, b"x"))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.entry_age(&key()).await.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());

        let result = store
            .get_or_fetch(&key(), ExpiryClass::Never, || async {
                Err::<Vec<u8>, _>(io::Error::new(io::ErrorKind::Other, "boom"))
            })
            .await;

        assert!(matches!(result, Err(CacheError::FetchFailed { .. })));
        assert!(store.get(&key(), ExpiryClass::Never).await.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stale_entries_are_refetched_and_purged() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        let stale = CacheEnvelope {
            fetched_at_ms: Utc::now().timestamp_millis() - 10 * 60 * 1000,
            expiry: ExpiryClass::FiveMinutes,
            payload: b"old".to_vec(),
        };
        store.write_envelope(&key(), stale).await.unwrap();

        assert!(store.get(&key(), ExpiryClass::FiveMinutes).await.is_none());
        assert_eq!(
            store.get(&key(), ExpiryClass::OneHour).await.as_deref(),
            Some(&b"old"[..])
        );
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get(&key(), ExpiryClass::Never).await.is_none());
    }

    #[tokio::test]
    async fn entry_age_comes_from_the_fetch_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        let envelope = CacheEnvelope {
            fetched_at_ms: Utc::now().timestamp_millis() - 2 * 60 * 60 * 1000,
            expiry: ExpiryClass::TwelveHours,
            payload: b"old".to_vec(),
        };
        store.write_envelope(&key(), envelope).await.unwrap();

        let age = store.entry_age(&key()).await.unwrap();
        assert!(age >= Duration::from_secs(2 * 60 * 60));
        assert!(age < Duration::from_secs(3 * 60 * 60));
    }

    #[tokio::test]
    async fn corrupt_entries_count_as_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join(key().file_name()), b"\x01garbage").unwrap();

        let calls = AtomicUsize::new(0);
        let payload = store
            .get_or_fetch(&key(), ExpiryClass::Never, || counting_fetch(&calls, b"fresh"))
            .await
            .unwrap();
        assert_eq!(payload, b"fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_store_never_persists() {
        let store = CacheStore::disabled();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            store
                .get_or_fetch(&key(), ExpiryClass::Never, || counting_fetch(&calls, b"x"))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[test]
    fn url_keys_ignore_query_order_and_fragment() {
        let a = Url::parse("https://Example.org/list?b=2&a=1#top").unwrap();
        let b = Url::parse("https://example.org/list?a=1&b=2").unwrap();
        assert_eq!(CacheKey::from_url(&a), CacheKey::from_url(&b));
        assert_eq!(
            CacheKey::from_url(&b).as_str(),
            "https://example.org/list?a=1&b=2"
        );

        let versioned = CacheKey::from_url(&b).with_version("2024-01-01");
        assert_ne!(versioned.file_name(), CacheKey::from_url(&b).file_name());
    }
}
