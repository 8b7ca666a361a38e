//! Finds the remote files of a dataset for a station, a group or everyone.

use crate::cache::expiry::ExpiryClass;
use crate::files::error::FileIndexError;
use crate::files::remote_file::{FileTarget, RemoteFileRef};
use crate::network::fetcher::RemoteFetcher;
use crate::network::listing::ListingEntry;
use crate::parsing::schema::parse_with_format;
use crate::provider::{
    compile_pattern, DatasetSource, FileLayout, ProviderConfig, STATION_PLACEHOLDER,
};
use crate::stations::{same_station_id, StationIndex};
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use chrono::NaiveDate;
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

const FILE_NAME_DATE_FORMATS: [&str; 3] = ["%Y%m%d", "%Y%m%d%H", "%Y-%m-%d"];

#[derive(Debug, Clone)]
pub struct RemoteFileIndexer {
    fetcher: Arc<RemoteFetcher>,
}

impl RemoteFileIndexer {
    pub fn new(fetcher: Arc<RemoteFetcher>) -> Self {
        Self { fetcher }
    }

    /// Files of `dataset` at `resolution`/`period` for `target`, ordered by the
    /// time they cover (or their modification time) and then by URL.
    ///
    /// An empty result means the provider has no data for the target; a
    /// combination the provider does not publish is an error.
    ///
    /// # Errors
    ///
    /// * [`FileIndexError::UnsupportedCombination`] if the provider has no
    ///   source for the combination.
    /// * [`FileIndexError::UnknownStation`] / [`FileIndexError::NoGroup`] if a
    ///   station target cannot be mapped to its group.
    /// * [`FileIndexError::Listing`] if a directory listing cannot be fetched.
    pub async fn index(
        &self,
        provider: &ProviderConfig,
        dataset: &str,
        target: &FileTarget,
        resolution: Resolution,
        period: Period,
        stations: &StationIndex,
    ) -> Result<Vec<RemoteFileRef>, FileIndexError> {
        let source = provider
            .source(dataset, resolution, period)
            .ok_or_else(|| FileIndexError::UnsupportedCombination {
                provider: provider.name.clone(),
                dataset: dataset.to_string(),
                resolution: resolution.to_string(),
                period: period.to_string(),
            })?;

        let mut files = match &source.layout {
            FileLayout::PerStation { pattern } => {
                let regex = compile_pattern(pattern, "station")?;
                let wanted = station_filter(target, stations);
                self.listed_files(source, &regex, |captured| {
                    wanted(captured).then(|| FileTarget::Station(captured.to_string()))
                })
                .await?
            }
            FileLayout::PerGroup { pattern } => {
                let regex = compile_pattern(pattern, "group")?;
                let wanted = wanted_group(target, stations)?;
                self.listed_files(source, &regex, |captured| {
                    let matches = wanted.as_deref().map_or(true, |group| group == captured);
                    matches.then(|| FileTarget::Group(captured.to_string()))
                })
                .await?
            }
            FileLayout::Fixed { path } => {
                let url = join(&source.base_url, path)?;
                vec![file_ref(source, url, FileTarget::AllStations, None, None)]
            }
            FileLayout::StationTemplate { template } => {
                template_files(source, template, target, stations)?
            }
        };

        files.sort_by(|a, b| {
            a.sort_time()
                .cmp(&b.sort_time())
                .then_with(|| a.url.as_str().cmp(b.url.as_str()))
        });
        if source.latest_only {
            keep_latest(&mut files);
        }
        debug!(
            "Indexed {} files of {}/{}/{} for {}",
            files.len(),
            dataset,
            resolution,
            period,
            target
        );
        Ok(files)
    }

    async fn listed_files(
        &self,
        source: &DatasetSource,
        pattern: &Regex,
        classify: impl Fn(&str) -> Option<FileTarget>,
    ) -> Result<Vec<RemoteFileRef>, FileIndexError> {
        let expiry = match source.period {
            Period::Now => ExpiryClass::FileIndex,
            Period::Historical | Period::Recent | Period::Fixed => ExpiryClass::MetaIndex,
        };
        let entries = self
            .fetcher
            .list_directory_with(&source.base_url, source.max_depth, expiry)
            .await
            .map_err(|source_error| FileIndexError::Listing {
                url: source.base_url.to_string(),
                source: source_error,
            })?;

        let capture = match source.layout {
            FileLayout::PerGroup { .. } => "group",
            _ => "station",
        };
        let base = source.base_url.as_str();
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_directory)
            .filter_map(|entry| {
                let relative = relative_path(base, &entry)?;
                let caps = pattern.captures(relative)?;
                let target = classify(caps.name(capture)?.as_str())?;
                let date_range = caps
                    .name("from")
                    .zip(caps.name("to"))
                    .and_then(|(from, to)| Some((file_date(from.as_str())?, file_date(to.as_str())?)));
                Some(file_ref(
                    source,
                    entry.url.clone(),
                    target,
                    entry.last_modified,
                    date_range,
                ))
            })
            .collect())
    }
}

fn relative_path<'a>(base: &str, entry: &'a ListingEntry) -> Option<&'a str> {
    let url = entry.url.as_str();
    let base = base.strip_suffix('/').unwrap_or(base);
    url.strip_prefix(base)
        .map(|rest| rest.trim_start_matches('/'))
}

fn file_date(raw: &str) -> Option<NaiveDate> {
    FILE_NAME_DATE_FORMATS
        .iter()
        .find_map(|format| parse_with_format(raw, format))
        .map(|datetime| datetime.date())
}

fn file_ref(
    source: &DatasetSource,
    url: Url,
    target: FileTarget,
    last_modified: Option<chrono::NaiveDateTime>,
    date_range: Option<(NaiveDate, NaiveDate)>,
) -> RemoteFileRef {
    RemoteFileRef {
        url,
        target,
        dataset: source.dataset.clone(),
        resolution: source.resolution,
        period: source.period,
        last_modified,
        date_range,
        format: source.parser.clone(),
    }
}

fn join(base: &Url, path: &str) -> Result<Url, FileIndexError> {
    base.join(path)
        .map_err(|e| FileIndexError::InvalidUrl(path.to_string(), e))
}

/// Predicate over captured station ids for a target.
fn station_filter<'a>(
    target: &'a FileTarget,
    stations: &'a StationIndex,
) -> Box<dyn Fn(&str) -> bool + 'a> {
    match target {
        FileTarget::Station(id) => Box::new(move |captured: &str| same_station_id(captured, id)),
        FileTarget::Group(group) => {
            let members = stations.filter_by_group(group);
            Box::new(move |captured: &str| {
                members.iter().any(|s| same_station_id(&s.id, captured))
            })
        }
        FileTarget::AllStations => Box::new(|_: &str| true),
    }
}

/// The group whose files are wanted; `None` for every group.
fn wanted_group(
    target: &FileTarget,
    stations: &StationIndex,
) -> Result<Option<String>, FileIndexError> {
    match target {
        FileTarget::Station(id) => {
            let station = stations
                .iter()
                .find(|s| same_station_id(&s.id, id))
                .ok_or_else(|| FileIndexError::UnknownStation(id.clone()))?;
            station
                .group
                .clone()
                .map(Some)
                .ok_or_else(|| FileIndexError::NoGroup(id.clone()))
        }
        FileTarget::Group(group) => Ok(Some(group.clone())),
        FileTarget::AllStations => Ok(None),
    }
}

fn template_files(
    source: &DatasetSource,
    template: &str,
    target: &FileTarget,
    stations: &StationIndex,
) -> Result<Vec<RemoteFileRef>, FileIndexError> {
    let ids: Vec<String> = match target {
        FileTarget::Station(id) => vec![id.clone()],
        FileTarget::Group(group) => stations
            .filter_by_group(group)
            .iter()
            .map(|s| s.id.clone())
            .collect(),
        FileTarget::AllStations => stations.iter().map(|s| s.id.clone()).collect(),
    };
    ids.into_iter()
        .map(|id| {
            let url = join(&source.base_url, &template.replace(STATION_PLACEHOLDER, &id))?;
            Ok(file_ref(source, url, FileTarget::Station(id), None, None))
        })
        .collect()
}

/// Keeps the last file of every target; `files` must be sorted by time.
fn keep_latest(files: &mut Vec<RemoteFileRef>) {
    let mut seen = HashSet::new();
    let mut latest: Vec<RemoteFileRef> = files
        .drain(..)
        .rev()
        .filter(|file| seen.insert(file.target.clone()))
        .collect();
    latest.reverse();
    *files = latest;
}
