use crate::tidy::error::TidyError;
use crate::tidy::normalizer::TidyRow;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::task;

/// Tidy rows of one query, convertible to a polars [`DataFrame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TidyFrame {
    rows: Vec<TidyRow>,
}

impl TidyFrame {
    pub fn new(rows: Vec<TidyRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TidyRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<TidyRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn parameters(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.parameter.as_str()).collect()
    }

    /// Keeps rows whose date lies within `from..=to`. Open ends are unbounded.
    pub fn filter_dates(mut self, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Self {
        self.rows.retain(|r| {
            from.map_or(true, |from| r.date >= from) && to.map_or(true, |to| r.date <= to)
        });
        self
    }

    pub fn drop_missing(mut self) -> Self {
        self.rows.retain(|r| r.value.is_some());
        self
    }

    /// Builds the output frame with columns `station_id`, `dataset`,
    /// `parameter`, `date`, `value` and `quality`, plus `timezone` when any
    /// row carries a local-time tag.
    pub fn to_dataframe(&self) -> Result<DataFrame, TidyError> {
        let rows = &self.rows;
        let mut columns = vec![
            Column::new(
                "station_id".into(),
                rows.iter().map(|r| r.station_id.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "dataset".into(),
                rows.iter().map(|r| r.dataset.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "parameter".into(),
                rows.iter().map(|r| r.parameter.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "date".into(),
                rows.iter().map(|r| r.date).collect::<Vec<NaiveDateTime>>(),
            ),
            Column::new(
                "value".into(),
                rows.iter().map(|r| r.value).collect::<Vec<Option<f64>>>(),
            ),
            Column::new(
                "quality".into(),
                rows.iter()
                    .map(|r| r.quality.clone())
                    .collect::<Vec<Option<String>>>(),
            ),
        ];
        if rows.iter().any(|r| r.timezone.is_some()) {
            columns.push(Column::new(
                "timezone".into(),
                rows.iter()
                    .map(|r| r.timezone.clone())
                    .collect::<Vec<Option<String>>>(),
            ));
        }
        DataFrame::new(columns).map_err(TidyError::Frame)
    }

    pub fn lazy(&self) -> Result<LazyFrame, TidyError> {
        Ok(self.to_dataframe()?.lazy())
    }

    /// Writes the frame to a Snappy-compressed parquet file.
    pub async fn write_parquet(&self, path: &Path) -> Result<(), TidyError> {
        let mut df = self.to_dataframe()?;
        let path_buf = path.to_path_buf();
        task::spawn_blocking(move || {
            let file = std::fs::File::create(&path_buf)
                .map_err(|e| TidyError::ParquetWriteIo(path_buf.clone(), e))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)
                .map_err(|e| TidyError::ParquetWritePolars(path_buf, e))?;
            Ok::<(), TidyError>(())
        })
        .await??;
        Ok(())
    }
}

impl From<Vec<TidyRow>> for TidyFrame {
    fn from(rows: Vec<TidyRow>) -> Self {
        Self::new(rows)
    }
}
