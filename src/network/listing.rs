//! Discovery of remote files through HTML autoindex pages.

use crate::cache::expiry::ExpiryClass;
use crate::network::error::NetworkError;
use crate::network::fetcher::RemoteFetcher;
use chrono::NaiveDateTime;
use log::debug;
use regex::Regex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::LazyLock;
use url::Url;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a href="(?P<href>[^"]+)"[^>]*>[^<]*</a>(?P<rest>[^\n<]*)"#)
        .expect("valid listing pattern")
});

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}-[A-Za-z]{3}-\d{4}|\d{4}-\d{2}-\d{2}) \d{2}:\d{2}")
        .expect("valid listing date pattern")
});

const LISTING_DATE_FORMATS: [&str; 2] = ["%d-%b-%Y %H:%M", "%Y-%m-%d %H:%M"];

/// One link found on a directory listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub url: Url,
    pub is_directory: bool,
    pub last_modified: Option<NaiveDateTime>,
}

impl ListingEntry {
    pub fn file_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .unwrap_or_default()
    }
}

impl RemoteFetcher {
    /// Lists `url` and its subdirectories down to `max_depth` levels, with the
    /// pages cached as meta indexes. The base page always counts as level one.
    pub async fn list_directory(
        &self,
        url: &Url,
        max_depth: usize,
    ) -> Result<Vec<ListingEntry>, NetworkError> {
        self.list_directory_with(url, max_depth, ExpiryClass::MetaIndex)
            .await
    }

    /// Like [`RemoteFetcher::list_directory`] with an explicit expiry for the
    /// listing pages. Links never lead outside of `url`.
    pub async fn list_directory_with(
        &self,
        url: &Url,
        max_depth: usize,
        expiry: ExpiryClass,
    ) -> Result<Vec<ListingEntry>, NetworkError> {
        let base = directory_url(url);
        let mut pending = VecDeque::from([(base.clone(), 1usize)]);
        let mut visited = BTreeSet::new();
        let mut entries = Vec::new();

        while let Some((page, depth)) = pending.pop_front() {
            if !visited.insert(page.to_string()) {
                continue;
            }
            let bytes = self.fetch(&page, expiry).await?;
            let html = String::from_utf8_lossy(&bytes);
            let found = parse_listing(&page, &html);
            debug!("Listing {} yielded {} entries", page, found.len());

            for entry in found {
                if !entry.url.as_str().starts_with(base.as_str()) {
                    continue;
                }
                if entry.is_directory && depth < max_depth {
                    pending.push_back((entry.url.clone(), depth + 1));
                }
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.url.as_str().cmp(b.url.as_str()));
        entries.dedup_by(|a, b| a.url == b.url);
        Ok(entries)
    }
}

fn directory_url(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut directory = url.clone();
    directory.set_path(&format!("{}/", url.path()));
    directory
}

/// Extracts the links of one autoindex page, resolved against `page`.
/// Sort links, parent links and absolute paths are skipped.
pub fn parse_listing(page: &Url, html: &str) -> Vec<ListingEntry> {
    LINK_PATTERN
        .captures_iter(html)
        .filter_map(|caps| {
            let href = caps.name("href")?.as_str();
            if href.starts_with('?') || href.starts_with('/') || href.starts_with("..") {
                return None;
            }
            let url = page.join(href).ok()?;
            if url == *page {
                return None;
            }
            let last_modified = caps
                .name("rest")
                .and_then(|rest| DATE_PATTERN.find(rest.as_str()))
                .and_then(|m| parse_listing_date(m.as_str()));
            Some(ListingEntry {
                is_directory: href.ends_with('/'),
                url,
                last_modified,
            })
        })
        .collect()
}

fn parse_listing_date(raw: &str) -> Option<NaiveDateTime> {
    LISTING_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}
