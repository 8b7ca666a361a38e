//! Builds the [`StationIndex`] of a provider from its published listings.

use crate::cache::expiry::ExpiryClass;
use crate::network::fetcher::RemoteFetcher;
use crate::parsing::numeric::parse_locale_f64;
use crate::parsing::schema::{parse_with_format, DecimalSeparator};
use crate::parsing::text_table::TextTable;
use crate::provider::{ProviderConfig, StationListing};
use crate::stations::error::StationError;
use crate::stations::{Station, StationField, StationIndex};
use crate::types::coordinates::LatLon;
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task;

const NOT_DISCONTINUED: [&str; 6] = ["0", "false", "no", "nein", "n", "-"];

/// Which stations of a listing to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inventory {
    /// Only stations still in operation.
    #[default]
    Operational,
    /// Discontinued stations too, for historical requests.
    Historical,
}

#[derive(Debug, Clone)]
pub struct StationIndexResolver {
    fetcher: Arc<RemoteFetcher>,
}

impl StationIndexResolver {
    pub fn new(fetcher: Arc<RemoteFetcher>) -> Self {
        Self { fetcher }
    }

    /// Every operational station of every listing of `provider`.
    pub async fn resolve(&self, provider: &ProviderConfig) -> Result<StationIndex, StationError> {
        self.resolve_scoped(provider, None, &[], Inventory::Operational)
            .await
    }

    /// Stations of the listings describing `resolution` and `periods`.
    ///
    /// Listings are read in configuration order; when an id appears in more
    /// than one listing the first occurrence is kept.
    ///
    /// # Errors
    ///
    /// Fails with [`StationError::NoStationListing`] if no listing applies, and
    /// with download or parse errors of the first listing that fails.
    pub async fn resolve_scoped(
        &self,
        provider: &ProviderConfig,
        resolution: Option<Resolution>,
        periods: &[Period],
        inventory: Inventory,
    ) -> Result<StationIndex, StationError> {
        let listings: Vec<StationListing> =
            provider.listings_for(resolution, periods).cloned().collect();
        if listings.is_empty() {
            return Err(StationError::NoStationListing(provider.name.clone()));
        }

        let mut stations = Vec::new();
        for listing in listings {
            let payload = self
                .fetcher
                .fetch(&listing.url, ExpiryClass::MetaIndex)
                .await
                .map_err(|source| StationError::ListingDownload {
                    url: listing.url.to_string(),
                    source,
                })?;
            let excluded = provider.excluded_groups.clone();
            let parsed = task::spawn_blocking(move || {
                read_listing(&listing, &payload, inventory, &excluded)
            })
            .await??;
            stations.extend(parsed);
        }

        let index = StationIndex::new(stations);
        info!("Resolved {} stations for {}", index.len(), provider.name);
        Ok(index)
    }
}

/// Column positions of one listing, by station field.
struct ColumnMap {
    fields: BTreeMap<usize, StationField>,
    extra: Vec<usize>,
}

impl ColumnMap {
    fn new(listing: &StationListing, table: &TextTable) -> Result<Self, StationError> {
        let mut fields = BTreeMap::new();
        let mut extra = Vec::new();
        for (index, header) in table.headers.iter().enumerate() {
            let mapped = listing
                .columns
                .iter()
                .find(|(name, _)| name.trim() == header.trim())
                .map(|(_, field)| *field);
            match mapped {
                Some(StationField::Ignore) => {}
                Some(field) => {
                    fields.insert(index, field);
                }
                None if !header.trim().is_empty() => extra.push(index),
                None => {}
            }
        }

        for (field, label) in [
            (StationField::Id, "id"),
            (StationField::Latitude, "latitude"),
            (StationField::Longitude, "longitude"),
        ] {
            if !fields.values().any(|f| *f == field) {
                return Err(StationError::MissingField {
                    url: listing.url.to_string(),
                    field: label,
                });
            }
        }
        Ok(Self { fields, extra })
    }

    fn cell<'t>(&self, table: &'t TextTable, row: usize, field: StationField) -> Option<&'t str> {
        self.fields
            .iter()
            .find(|(_, f)| **f == field)
            .and_then(|(index, _)| table.cell(*index, row))
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
    }
}

fn read_listing(
    listing: &StationListing,
    payload: &[u8],
    inventory: Inventory,
    excluded_groups: &[String],
) -> Result<Vec<Station>, StationError> {
    let table = listing
        .parser
        .decode(payload, listing.archive_member.as_deref())
        .map_err(|source| StationError::ListingParse {
            url: listing.url.to_string(),
            source,
        })?;
    let columns = ColumnMap::new(listing, &table)?;

    let mut stations = Vec::with_capacity(table.row_count());
    let mut incomplete = 0;
    let mut discontinued = 0;
    let mut excluded = 0;
    for row in 0..table.row_count() {
        let Some(station) = station_from_row(listing, &table, &columns, row) else {
            incomplete += 1;
            continue;
        };
        if inventory == Inventory::Operational && is_discontinued(&table, &columns, row) {
            discontinued += 1;
            continue;
        }
        if station
            .group
            .as_ref()
            .is_some_and(|group| excluded_groups.contains(group))
        {
            excluded += 1;
            continue;
        }
        stations.push(station);
    }

    if incomplete > 0 {
        warn!(
            "Dropped {} rows without id or valid coordinates from {}",
            incomplete, listing.url
        );
    }
    debug!(
        "Listing {}: {} stations, {} discontinued, {} in excluded groups",
        listing.url,
        stations.len(),
        discontinued,
        excluded
    );
    Ok(stations)
}

fn station_from_row(
    listing: &StationListing,
    table: &TextTable,
    columns: &ColumnMap,
    row: usize,
) -> Option<Station> {
    let cell = |field| columns.cell(table, row, field);
    let number = |field| cell(field).and_then(|v| parse_locale_f64(v, DecimalSeparator::Auto));
    let date = |field| cell(field).and_then(|v| parse_date(v, &listing.date_formats));

    let id = pad_id(cell(StationField::Id)?, listing.id_width);
    let location = LatLon(number(StationField::Latitude)?, number(StationField::Longitude)?);
    if !location.is_valid() {
        return None;
    }

    let extra = columns
        .extra
        .iter()
        .filter_map(|&index| {
            let value = table.cell(index, row)?.trim();
            (!value.is_empty()).then(|| (table.headers[index].trim().to_string(), value.to_string()))
        })
        .collect();

    Some(Station {
        name: cell(StationField::Name).unwrap_or(&id).to_string(),
        id,
        latitude: location.latitude(),
        longitude: location.longitude(),
        height: number(StationField::Height),
        state: cell(StationField::State).map(str::to_string),
        from_date: date(StationField::FromDate),
        to_date: date(StationField::ToDate),
        group: cell(StationField::Group).map(str::to_string),
        extra,
    })
}

fn is_discontinued(table: &TextTable, columns: &ColumnMap, row: usize) -> bool {
    columns
        .cell(table, row, StationField::Discontinued)
        .is_some_and(|flag| {
            !NOT_DISCONTINUED
                .iter()
                .any(|no| no.eq_ignore_ascii_case(flag))
        })
}

/// Left-pads numeric ids to `width` digits.
fn pad_id(id: &str, width: Option<usize>) -> String {
    match width {
        Some(width) if id.len() < width && id.chars().all(|c| c.is_ascii_digit()) => {
            format!("{id:0>width$}")
        }
        _ => id.to_string(),
    }
}

fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|format| parse_with_format(raw, format))
        .map(|datetime| datetime.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::CacheStore;
    use crate::parsing::RawParser;
    use crate::settings::Settings;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROAD_STATIONS: &str = "Kennung;GMA-Name;Bundesland  ;Breite (Dezimalangabe);Länge (Dezimalangabe);Höhe in m über NN;GDS-Verzeichnis;außer Betrieb (gemeldet);Straße / Fahrtrichtung\n\
        A006;Schuby;SH;54,5167;9,4167;19;HS;;A7\n\
        A010;Ahrensburg;SH;53,6833;10,2333;41;HS;2021-04-01;A1\n\
        A020;Neu;NI;52,1;9,9;70;XX;;A2\n\
        ;Kein Kennung;NI;52,1;9,9;70;HS;;A2\n\
        A030;Ohne Lage;NI;;9,9;70;HS;;A2\n";

    fn listing(url: Url) -> StationListing {
        StationListing {
            url,
            parser: RawParser::Csv { separator: ';' },
            archive_member: None,
            columns: [
                ("Kennung", StationField::Id),
                ("GMA-Name", StationField::Name),
                ("Bundesland", StationField::State),
                ("Breite (Dezimalangabe)", StationField::Latitude),
                ("Länge (Dezimalangabe)", StationField::Longitude),
                ("Höhe in m über NN", StationField::Height),
                ("GDS-Verzeichnis", StationField::Group),
                ("außer Betrieb (gemeldet)", StationField::Discontinued),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            date_formats: vec!["%Y-%m-%d".into()],
            id_width: None,
            resolution: None,
            periods: vec![],
        }
    }

    fn provider(listings: Vec<StationListing>) -> ProviderConfig {
        ProviderConfig {
            name: "road".into(),
            station_listings: listings,
            datasets: vec![],
            parameters: Default::default(),
            excluded_groups: vec!["XX".into()],
        }
    }

    #[test]
    fn listing_rows_are_cleaned() {
        let listing = listing(Url::parse("https://example.org/stations.csv").unwrap());
        let stations =
            read_listing(&listing, ROAD_STATIONS.as_bytes(), Inventory::Operational, &["XX".into()])
                .unwrap();

        assert_eq!(stations.len(), 1);
        let schuby = &stations[0];
        assert_eq!(schuby.id, "A006");
        assert_eq!(schuby.latitude, 54.5167);
        assert_eq!(schuby.height, Some(19.0));
        assert_eq!(schuby.state.as_deref(), Some("SH"));
        assert_eq!(schuby.group.as_deref(), Some("HS"));
        assert_eq!(
            schuby.extra.get("Straße / Fahrtrichtung").map(String::as_str),
            Some("A7")
        );

        let historical =
            read_listing(&listing, ROAD_STATIONS.as_bytes(), Inventory::Historical, &["XX".into()])
                .unwrap();
        assert_eq!(historical.len(), 2);
    }

    #[test]
    fn ids_are_padded() {
        assert_eq!(pad_id("3", Some(5)), "00003");
        assert_eq!(pad_id("00003", Some(5)), "00003");
        assert_eq!(pad_id("A6", Some(5)), "A6");
        assert_eq!(pad_id("3", None), "3");
    }

    #[test]
    fn listings_need_id_and_coordinates() {
        let mut listing = listing(Url::parse("https://example.org/stations.csv").unwrap());
        listing.columns.remove("Kennung");
        assert!(matches!(
            read_listing(&listing, ROAD_STATIONS.as_bytes(), Inventory::Operational, &[]),
            Err(StationError::MissingField { field: "id", .. })
        ));
    }

    #[tokio::test]
    async fn first_listing_wins_on_duplicate_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROAD_STATIONS))
            .expect(1)
            .mount(&server)
            .await;
        let renamed = ROAD_STATIONS.replace("Schuby", "Schuby Nord").replace("A010", "A011");
        Mock::given(method("GET"))
            .and(path("/b.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(renamed))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = RemoteFetcher::new(
            &Settings::default(),
            Arc::new(CacheStore::new(dir.path().to_path_buf())),
        )
        .unwrap();
        let resolver = StationIndexResolver::new(Arc::new(fetcher));
        let base = server.uri();
        let config = provider(vec![
            listing(Url::parse(&format!("{base}/a.csv")).unwrap()),
            listing(Url::parse(&format!("{base}/b.csv")).unwrap()),
        ]);

        let index = resolver.resolve(&config).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.stations()[0].name, "Schuby");

        let historical = resolver
            .resolve_scoped(&config, None, &[], Inventory::Historical)
            .await
            .unwrap();
        let ids: Vec<&str> = historical.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["A006", "A010", "A011"]);
    }

    #[tokio::test]
    async fn providers_without_listings_are_rejected() {
        let fetcher =
            RemoteFetcher::new(&Settings::default(), Arc::new(CacheStore::disabled())).unwrap();
        let resolver = StationIndexResolver::new(Arc::new(fetcher));
        assert!(matches!(
            resolver.resolve(&provider(vec![])).await,
            Err(StationError::NoStationListing(_))
        ));
    }
}
