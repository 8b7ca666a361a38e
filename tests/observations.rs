use chrono::NaiveDate;
use futures_util::StreamExt;
use std::io::{Cursor, Write};
use wetter::{LatLon, ProviderConfig, Request, Resolution, Settings, StationSelection, Wetter};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

const STATIONS: &str = "Stations_id;von_datum;bis_datum;Stationshoehe;geoBreite;geoLaenge;Stationsname\n\
    433;19480101;;48;52,4676;13,4020;Berlin-Tempelhof\n\
    1048;19340101;;227;51,1278;13,7543;Dresden-Klotzsche\n";

const HISTORICAL_PAGE: &str = r#"<pre><a href="../">../</a>
<a href="stundenwerte_TU_00433_19480101_20231231_hist.zip">stundenwerte_TU_00433_19480101_20231231_hist.zip</a>  01-Mar-2024 10:00  1234
<a href="stundenwerte_TU_01048_19340101_20231231_hist.zip">stundenwerte_TU_01048_19340101_20231231_hist.zip</a>  01-Mar-2024 10:00  1234
</pre>"#;

const RECENT_PAGE: &str = r#"<pre><a href="../">../</a>
<a href="stundenwerte_TU_00433_akt.zip">stundenwerte_TU_00433_akt.zip</a>  02-Jan-2024 06:00  999
<a href="stundenwerte_TU_01048_akt.zip">stundenwerte_TU_01048_akt.zip</a>  02-Jan-2024 06:00  999
</pre>"#;

fn provider(base: &str) -> ProviderConfig {
    let json = format!(
        r#"{{
        "name": "dwd_observation",
        "station_listings": [{{
            "url": "{base}/stations.csv",
            "parser": {{"format": "csv", "separator": ";"}},
            "columns": {{
                "Stations_id": "id", "Stationsname": "name",
                "geoBreite": "latitude", "geoLaenge": "longitude",
                "Stationshoehe": "height", "von_datum": "from_date", "bis_datum": "to_date"
            }},
            "id_width": 5
        }}],
        "datasets": [{{
            "dataset": "temperature_air",
            "resolution": "hourly",
            "period": "historical",
            "base_url": "{base}/hourly/air_temperature/historical/",
            "layout": {{"layout": "per_station", "pattern": "stundenwerte_TU_(?P<station>\\d{{5}})_(?P<from>\\d{{8}})_(?P<to>\\d{{8}})_hist\\.zip$"}},
            "parser": {{"format": "csv", "separator": ";"}},
            "schema": {{
                "timestamp_column": "MESS_DATUM",
                "timestamp_formats": ["%Y%m%d%H"],
                "station_column": "STATIONS_ID",
                "quality_column": "QN_9",
                "ignore_columns": ["eor"],
                "archive_member": "^produkt"
            }}
        }}, {{
            "dataset": "temperature_air",
            "resolution": "hourly",
            "period": "recent",
            "base_url": "{base}/hourly/air_temperature/recent/",
            "layout": {{"layout": "per_station", "pattern": "stundenwerte_TU_(?P<station>\\d{{5}})_akt\\.zip$"}},
            "parser": {{"format": "csv", "separator": ";"}},
            "schema": {{
                "timestamp_column": "MESS_DATUM",
                "timestamp_formats": ["%Y%m%d%H"],
                "station_column": "STATIONS_ID",
                "quality_column": "QN_9",
                "ignore_columns": ["eor"],
                "archive_member": "^produkt"
            }}
        }}],
        "parameters": {{"TT_TU": "temperature_air_mean_2m", "RF_TU": "humidity"}}
    }}"#
    );
    ProviderConfig::from_json_str(&json).unwrap()
}

fn zipped(member: &str, content: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("Metadaten_Geographie.txt", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"not a data table").unwrap();
    writer
        .start_file(member, SimpleFileOptions::default())
        .unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

async fn mount(server: &MockServer, route: &str, body: Vec<u8>, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn merges_periods_of_the_nearest_station() {
    let server = MockServer::start().await;
    mount(&server, "/stations.csv", STATIONS.into(), 1).await;
    mount(&server, "/hourly/air_temperature/historical/", HISTORICAL_PAGE.into(), 1).await;
    mount(&server, "/hourly/air_temperature/recent/", RECENT_PAGE.into(), 1).await;
    mount(
        &server,
        "/hourly/air_temperature/historical/stundenwerte_TU_00433_19480101_20231231_hist.zip",
        zipped(
            "produkt_tu_stunde_19480101_20231231_00433.txt",
            "STATIONS_ID;MESS_DATUM;QN_9;TT_TU;RF_TU;eor\n\
             433;2023123122;    3;   1.5;  90.0;eor\n\
             433;2023123123;    3;   2.0;  91.0;eor\n",
        ),
        1,
    )
    .await;
    mount(
        &server,
        "/hourly/air_temperature/recent/stundenwerte_TU_00433_akt.zip",
        zipped(
            "produkt_tu_stunde_20220701_20240101_00433.txt",
            "STATIONS_ID;MESS_DATUM;QN_9;TT_TU;RF_TU;eor\n\
             433;2023123123;    1;   2.5;  92.0;eor\n\
             433;2024010100;    1;-999;  93.0;eor\n\
             433;2024010101;    1;   3.0;  94.0;eor\n",
        ),
        1,
    )
    .await;

    let cache = tempfile::tempdir().unwrap();
    let wetter = Wetter::with_settings(
        Settings::builder()
            .cache_dir(cache.path().to_path_buf())
            .concurrency(2)
            .build(),
    )
    .await
    .unwrap();

    let request = Request::builder()
        .provider(provider(&server.uri()))
        .datasets(vec!["temperature_air".into()])
        .resolution(Resolution::Hourly)
        .stations(StationSelection::Rank {
            location: LatLon(52.5, 13.4),
            rank: 1,
        })
        .parameters(vec!["temperature_air_mean_2m".into()])
        .start(
            NaiveDate::from_ymd_opt(2023, 12, 31)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap(),
        )
        .build()
        .unwrap();

    let results: Vec<_> = wetter.query(&request).collect().await;
    assert_eq!(results.len(), 1);
    let values = results.into_iter().next().unwrap().unwrap();
    assert_eq!(values.metadata.id, "00433");
    assert!(values.distance_km.unwrap() < 5.0);
    assert!(values.failures.is_empty());

    let rows = values.data.rows();
    let observed: Vec<_> = rows.iter().map(|r| (r.date.to_string(), r.value)).collect();
    assert_eq!(
        observed,
        vec![
            ("2023-12-31 23:00:00".to_string(), Some(2.5)),
            ("2024-01-01 00:00:00".to_string(), None),
            ("2024-01-01 01:00:00".to_string(), Some(3.0)),
        ]
    );
    assert!(rows
        .iter()
        .all(|r| r.parameter == "temperature_air_mean_2m" && r.station_id == "00433"));
    assert_eq!(rows[0].quality.as_deref(), Some("1"));

    let df = values.data.to_dataframe().unwrap();
    assert_eq!(df.height(), 3);
    assert_eq!(df.width(), 6);

    // A second run is served from the content cache and the session memo.
    let again: Vec<_> = wetter.query(&request).collect().await;
    assert_eq!(again[0].as_ref().unwrap().data, values.data);
}
