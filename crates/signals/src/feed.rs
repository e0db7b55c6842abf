use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::{debug, info};

use common::collab::DataFeed;
use common::{Error, IndicatorRow, Result, SymbolWindow};

/// File-backed data feed reading pre-computed OHLCV + indicator rows.
///
/// Rows that fail to parse are skipped rather than aborting the load; an
/// empty or missing source is `DataUnavailable`.
pub struct CsvFeed {
    path: PathBuf,
}

/// On-disk column layout. Headers match the upstream export.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
    gauss: f64,
    kijun: f64,
    adx: f64,
    smma: f64,
    atr: f64,
}

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl CsvFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_rows(&self) -> Result<Vec<IndicatorRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| {
                Error::DataUnavailable(format!("cannot open {}: {e}", self.path.display()))
            })?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for record in reader.deserialize::<RawRow>() {
            let raw = match record {
                Ok(r) => r,
                Err(e) => {
                    debug!(error = %e, "Skipping malformed CSV record");
                    skipped += 1;
                    continue;
                }
            };
            let ts = match NaiveDateTime::parse_from_str(&raw.date, DATE_FORMAT) {
                Ok(naive) => naive.and_utc(),
                Err(e) => {
                    debug!(date = %raw.date, error = %e, "Skipping row with unparseable date");
                    skipped += 1;
                    continue;
                }
            };
            rows.push(IndicatorRow {
                ts,
                open: raw.open,
                high: raw.high,
                low: raw.low,
                close: raw.close,
                volume: raw.volume,
                gauss: raw.gauss,
                kijun: raw.kijun,
                adx: raw.adx,
                smma: raw.smma,
                atr: raw.atr,
            });
        }

        if skipped > 0 {
            debug!(skipped, "Malformed rows skipped during load");
        }
        rows.sort_by_key(|r| r.ts);
        Ok(rows)
    }
}

#[async_trait]
impl DataFeed for CsvFeed {
    async fn load(&self, window: &SymbolWindow) -> Result<Vec<IndicatorRow>> {
        let mut rows = self.read_rows()?;
        if rows.is_empty() {
            return Err(Error::DataUnavailable(format!(
                "{} contains no usable rows",
                self.path.display()
            )));
        }

        let total = rows.len();
        if total > window.max_rows {
            rows.drain(..total - window.max_rows);
        }
        info!(
            symbol = %window.symbol,
            total_rows = total,
            window_rows = rows.len(),
            "Data window loaded"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date,Open,High,Low,Close,Volume,gauss,kijun,adx,smma,atr";

    fn write_csv(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("csv_feed_{name}_{}.csv", std::process::id()));
        std::fs::write(&path, format!("{HEADER}\n{body}")).unwrap();
        path
    }

    fn window(max_rows: usize) -> SymbolWindow {
        SymbolWindow {
            symbol: "KC=F".to_string(),
            max_rows,
        }
    }

    #[tokio::test]
    async fn loads_and_truncates_to_window() {
        let body = (0..5)
            .map(|i| {
                format!(
                    "2025-06-02 0{i}:00:00,380,382,379,381,100,380.5,379.0,21.0,375.0,3.0"
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let path = write_csv("truncate", &body);

        let feed = CsvFeed::new(&path);
        let rows = feed.load(&window(3)).await.unwrap();
        assert_eq!(rows.len(), 3);
        // Oldest of the kept tail is hour 02.
        assert_eq!(rows[0].ts.format("%H").to_string(), "02");
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let body = "2025-06-02 01:00:00,380,382,379,381,100,380.5,379.0,21.0,375.0,3.0\n\
                    not-a-date,1,2,3,4,5,6,7,8,9,10\n\
                    2025-06-02 02:00:00,381,383,380,382,100,380.9,379.2,22.0,375.1,3.1";
        let path = write_csv("skip", body);

        let feed = CsvFeed::new(&path);
        let rows = feed.load(&window(10)).await.unwrap();
        assert_eq!(rows.len(), 2);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_data_unavailable() {
        let feed = CsvFeed::new("/nonexistent/nowhere.csv");
        let err = feed.load(&window(10)).await.unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn header_only_file_is_data_unavailable() {
        let path = write_csv("empty", "");
        let feed = CsvFeed::new(&path);
        let err = feed.load(&window(10)).await.unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
        std::fs::remove_file(path).ok();
    }
}
