//! The session client: owns settings, cache, fetcher and the station index
//! memo, and turns [`Request`]s into lazy streams of per-station results.

use crate::cache::store::CacheStore;
use crate::error::WetterError;
use crate::files::indexer::RemoteFileIndexer;
use crate::files::remote_file::{FileTarget, RemoteFileRef};
use crate::network::downloader::ParallelDownloader;
use crate::network::fetcher::RemoteFetcher;
use crate::parsing::error::ParseError;
use crate::parsing::table::RawTable;
use crate::provider::{DatasetSource, FileLayout, ProviderConfig};
use crate::request::{Request, SelectedStation};
use crate::settings::Settings;
use crate::stations::resolver::{Inventory, StationIndexResolver};
use crate::stations::{Station, StationIndex};
use crate::tidy::frame::TidyFrame;
use crate::tidy::normalizer::{tidy, ScopedTable};
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use crate::utils::ensure_cache_dir_exists;
use futures_util::stream::{self, Stream};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio::task;
use url::Url;

/// A file of a station that could not be downloaded or parsed.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub station_id: String,
    pub url: Url,
    pub error: Arc<WetterError>,
}

/// Everything a query produced for one station.
#[derive(Debug, Clone)]
pub struct StationValues {
    pub metadata: Station,
    /// Distance to the queried location, for location based selections.
    pub distance_km: Option<f64>,
    pub data: TidyFrame,
    pub failures: Vec<FileFailure>,
}

/// Identifies one resolved station index within a session. Providers are
/// told apart by name and by the listings and exclusions they resolve from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    provider: String,
    listings: Vec<Url>,
    excluded_groups: Vec<String>,
    resolution: Option<Resolution>,
    periods: Vec<Period>,
    inventory: Inventory,
}

impl IndexKey {
    fn new(
        provider: &ProviderConfig,
        resolution: Option<Resolution>,
        periods: &[Period],
        inventory: Inventory,
    ) -> Self {
        Self {
            provider: provider.name.clone(),
            listings: provider.station_listings.iter().map(|l| l.url.clone()).collect(),
            excluded_groups: provider.excluded_groups.clone(),
            resolution,
            periods: periods.to_vec(),
            inventory,
        }
    }
}

type SharedTable = Result<Arc<RawTable>, Arc<WetterError>>;

/// The main client.
///
/// Create one per process or task group with [`Wetter::new()`] (settings from
/// the environment) or [`Wetter::with_settings()`], then run any number of
/// [`Request`]s through [`Wetter::query()`].
///
/// # Examples
///
/// ```rust,no_run
/// # use wetter::{Wetter, WetterError, Settings};
/// # async fn run() -> Result<(), WetterError> {
/// let client = Wetter::with_settings(Settings::builder().concurrency(4).build()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Wetter {
    settings: Settings,
    fetcher: Arc<RemoteFetcher>,
    resolver: StationIndexResolver,
    indexer: RemoteFileIndexer,
    downloader: ParallelDownloader,
    station_memo: Mutex<HashMap<IndexKey, Arc<OnceCell<StationIndex>>>>,
}

impl Wetter {
    /// Creates a client from [`Settings::from_env()`].
    ///
    /// # Errors
    ///
    /// Returns [`WetterError::Settings`] for malformed `WETTER_*` variables and
    /// the errors of [`Wetter::with_settings()`].
    pub async fn new() -> Result<Self, WetterError> {
        Self::with_settings(Settings::from_env()?).await
    }

    /// Creates a client, making sure the cache directory exists unless the
    /// cache is disabled.
    ///
    /// # Errors
    ///
    /// * [`WetterError::CacheDirResolution`] if no cache directory is configured
    ///   and the platform has none.
    /// * [`WetterError::CacheDirCreation`] if the directory cannot be created.
    /// * [`WetterError::Network`] if the HTTP client cannot be built.
    pub async fn with_settings(settings: Settings) -> Result<Self, WetterError> {
        let cache = if settings.cache_disabled() {
            info!("Content cache disabled");
            CacheStore::disabled()
        } else {
            let directory = settings
                .resolve_cache_dir()
                .map_err(WetterError::CacheDirResolution)?;
            ensure_cache_dir_exists(&directory)
                .await
                .map_err(|e| WetterError::CacheDirCreation(directory.clone(), e))?;
            CacheStore::new(directory)
        };
        let fetcher = Arc::new(RemoteFetcher::new(&settings, Arc::new(cache))?);
        Ok(Self {
            resolver: StationIndexResolver::new(Arc::clone(&fetcher)),
            indexer: RemoteFileIndexer::new(Arc::clone(&fetcher)),
            downloader: ParallelDownloader::new(Arc::clone(&fetcher), settings.concurrency()),
            fetcher,
            settings,
            station_memo: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.fetcher.cache()
    }

    /// Every operational station of `provider`, memoized for the session.
    pub async fn stations(&self, provider: &ProviderConfig) -> Result<StationIndex, WetterError> {
        self.memoized_index(provider, None, Vec::new(), Inventory::Operational)
            .await
    }

    async fn memoized_index(
        &self,
        provider: &ProviderConfig,
        resolution: Option<Resolution>,
        periods: Vec<Period>,
        inventory: Inventory,
    ) -> Result<StationIndex, WetterError> {
        let key = IndexKey::new(provider, resolution, &periods, inventory);
        let cell = Arc::clone(self.station_memo.lock().await.entry(key).or_default());
        if let Some(index) = cell.get() {
            debug!("Station index for '{}' served from session memo", provider.name);
            return Ok(index.clone());
        }
        let index = cell
            .get_or_try_init(|| async {
                let index = self
                    .resolver
                    .resolve_scoped(provider, resolution, &periods, inventory)
                    .await?;
                info!("Loaded {} stations of '{}'", index.len(), provider.name);
                Ok::<_, WetterError>(index)
            })
            .await?;
        Ok(index.clone())
    }

    async fn request_index(&self, request: &Request) -> Result<StationIndex, WetterError> {
        let index = request
            .station_index_cell()
            .get_or_try_init(|| {
                self.memoized_index(
                    request.provider(),
                    Some(request.resolution()),
                    request.all_periods(),
                    request.inventory(),
                )
            })
            .await?;
        Ok(index.clone())
    }

    /// Runs `request` lazily, yielding one item per selected station in
    /// selection order.
    ///
    /// Nothing happens until the stream is first polled. Station selection
    /// errors are yielded as the only item. Files that fail to download or
    /// parse are reported in [`StationValues::failures`] and never end the
    /// stream. Dropping the stream abandons any outstanding work. Calling
    /// `query` again starts over, reusing the content cache.
    pub fn query<'a>(
        &'a self,
        request: &'a Request,
    ) -> impl Stream<Item = Result<StationValues, WetterError>> + 'a {
        stream::unfold(QueryState::Pending, move |state| async move {
            let (plan, mut stations) = match state {
                QueryState::Pending => match self.plan(request).await {
                    Ok(planned) => planned,
                    Err(e) => return Some((Err(e), QueryState::Done)),
                },
                QueryState::Running { plan, stations } => (plan, stations),
                QueryState::Done => return None,
            };
            let selected = stations.next()?;
            let values = self.station_values(request, &plan, selected).await;
            Some((values, QueryState::Running { plan, stations }))
        })
    }

    async fn plan<'a>(
        &self,
        request: &'a Request,
    ) -> Result<(Arc<QueryPlan<'a>>, std::vec::IntoIter<SelectedStation>), WetterError> {
        let sources = request.sources()?;
        let index = self.request_index(request).await?;
        let selected = request.select(&index)?;
        info!(
            "Querying {} stations of '{}' across {} sources",
            selected.len(),
            request.provider().name,
            sources.len()
        );
        let plan = QueryPlan {
            sources,
            index,
            shared: Mutex::new(HashMap::new()),
        };
        Ok((Arc::new(plan), selected.into_iter()))
    }

    async fn station_values(
        &self,
        request: &Request,
        plan: &QueryPlan<'_>,
        selected: SelectedStation,
    ) -> Result<StationValues, WetterError> {
        let station = selected.station;
        let mut tables = Vec::new();
        let mut failures = Vec::new();

        for source in &plan.sources {
            let (target, shared) = match source.layout {
                FileLayout::PerStation { .. } | FileLayout::StationTemplate { .. } => {
                    (FileTarget::Station(station.id.clone()), false)
                }
                FileLayout::PerGroup { .. } => (FileTarget::Station(station.id.clone()), true),
                FileLayout::Fixed { .. } => (FileTarget::AllStations, true),
            };

            let files = match self
                .indexer
                .index(
                    request.provider(),
                    &source.dataset,
                    &target,
                    source.resolution,
                    source.period,
                    &plan.index,
                )
                .await
            {
                Ok(files) => files,
                Err(e) => {
                    warn!("Indexing {} for station {} failed: {}", source.dataset, station.id, e);
                    failures.push(FileFailure {
                        station_id: station.id.clone(),
                        url: source.base_url.clone(),
                        error: Arc::new(e.into()),
                    });
                    continue;
                }
            };
            let files: Vec<RemoteFileRef> = files
                .into_iter()
                .filter(|f| overlaps(f, request))
                .collect();
            if files.is_empty() {
                debug!("No {} files for station {}", source.dataset, station.id);
                continue;
            }

            for (file, parsed) in self.load_tables(plan, source, files, shared).await {
                let narrowed = parsed.and_then(|table| {
                    narrow(&table, &file.target, &station.id, request)
                        .map_err(|e| Arc::new(WetterError::from(e)))
                });
                match narrowed {
                    Ok(table) => {
                        tables.push(ScopedTable {
                            dataset: source.dataset.clone(),
                            resolution: source.resolution,
                            period: source.period,
                            default_station: Some(station.id.clone()),
                            table,
                        });
                    }
                    Err(error) => failures.push(FileFailure {
                        station_id: station.id.clone(),
                        url: file.url,
                        error,
                    }),
                }
            }
        }

        let rows = tidy(&tables, &request.provider().parameters, request.humanize());
        let mut data = TidyFrame::new(rows).filter_dates(request.start(), request.end());
        if request.drop_missing() {
            data = data.drop_missing();
        }
        debug!(
            "Station {}: {} rows, {} failed files",
            station.id,
            data.len(),
            failures.len()
        );
        Ok(StationValues {
            metadata: station,
            distance_km: selected.distance_km,
            data,
            failures,
        })
    }

    /// Downloads and parses `files` in order. Shared files (group and
    /// all-station files) are parsed once per query and reused, failures
    /// included.
    async fn load_tables(
        &self,
        plan: &QueryPlan<'_>,
        source: &DatasetSource,
        files: Vec<RemoteFileRef>,
        shared: bool,
    ) -> Vec<(RemoteFileRef, SharedTable)> {
        let mut results: Vec<Option<SharedTable>> = vec![None; files.len()];
        let mut missing = Vec::new();
        if shared {
            let memo = plan.shared.lock().await;
            for (i, file) in files.iter().enumerate() {
                match memo.get(&file.url) {
                    Some(hit) => results[i] = Some(hit.clone()),
                    None => missing.push(i),
                }
            }
        } else {
            missing.extend(0..files.len());
        }

        let batch = missing.iter().map(|&i| files[i].clone()).collect();
        let downloads = self.downloader.fetch_many(batch).await;
        for (i, download) in missing.into_iter().zip(downloads) {
            let parsed: SharedTable = match download.result {
                Ok(payload) => parse(source, payload)
                    .await
                    .map(Arc::new)
                    .map_err(|e| {
                        warn!("Parsing {} failed: {}", download.file.url, e);
                        Arc::new(e)
                    }),
                Err(e) => Err(Arc::new(e.into())),
            };
            if shared {
                plan.shared
                    .lock()
                    .await
                    .insert(download.file.url.clone(), parsed.clone());
            }
            results[i] = Some(parsed);
        }

        files
            .into_iter()
            .zip(results)
            .filter_map(|(file, result)| result.map(|r| (file, r)))
            .collect()
    }
}

enum QueryState<'a> {
    Pending,
    Running {
        plan: Arc<QueryPlan<'a>>,
        stations: std::vec::IntoIter<SelectedStation>,
    },
    Done,
}

struct QueryPlan<'a> {
    sources: Vec<&'a DatasetSource>,
    index: StationIndex,
    shared: Mutex<HashMap<Url, SharedTable>>,
}

async fn parse(source: &DatasetSource, payload: Vec<u8>) -> Result<RawTable, WetterError> {
    let parser = source.parser.clone();
    let hint = source.schema.clone();
    let table = task::spawn_blocking(move || parser.parse(&payload, &hint)).await??;
    Ok(table)
}

/// Rows of `station_id` restricted to the requested parameters, with the
/// file's spelling of the id replaced by the index's.
///
/// A table without station ids belongs wholly to the station of a
/// per-station file. Group and all-station files must name the station of
/// every row.
fn narrow(
    table: &RawTable,
    target: &FileTarget,
    station_id: &str,
    request: &Request,
) -> Result<RawTable, ParseError> {
    let mut narrowed = if table.stations.iter().any(Option::is_some) {
        table.retain_station(station_id)
    } else if matches!(target, FileTarget::Station(_)) {
        table.clone()
    } else {
        return Err(ParseError::malformed(format!(
            "file for {target} has no station column"
        )));
    };
    let wanted: Vec<String> = narrowed
        .columns
        .iter()
        .filter(|c| request.wants_parameter(&c.name))
        .map(|c| c.name.clone())
        .collect();
    narrowed.retain_columns(&wanted);
    narrowed.stations.iter_mut().for_each(|s| *s = None);
    narrowed.assign_station(station_id);
    Ok(narrowed)
}

/// Whether the file's covered dates can intersect the requested range.
fn overlaps(file: &RemoteFileRef, request: &Request) -> bool {
    let Some((from, to)) = file.date_range else {
        return true;
    };
    let after_start = request.start().map_or(true, |start| to >= start.date());
    let before_end = request.end().map_or(true, |end| from <= end.date());
    after_start && before_end
}
