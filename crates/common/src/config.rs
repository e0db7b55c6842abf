/// Process-level configuration loaded from environment variables at startup.
/// Every variable has a default; only the data CSV has to exist on disk.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the persisted parameter record (TOML).
    pub params_path: String,
    /// Path to the pre-computed OHLCV + indicator CSV.
    pub data_csv_path: String,
    /// Symbol label carried through logs and the run report.
    pub symbol: String,
    /// Upper bound on rows loaded from the data source.
    pub max_rows: usize,
}

impl Config {
    /// Load configuration from environment variables, reading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Config {
            params_path: optional_env("RETUNER_PARAMS")
                .unwrap_or_else(|| "config/params.toml".to_string()),
            data_csv_path: optional_env("RETUNER_DATA_CSV")
                .unwrap_or_else(|| "data/backtest_input.csv".to_string()),
            symbol: optional_env("RETUNER_SYMBOL").unwrap_or_else(|| "KC=F".to_string()),
            max_rows: optional_env("RETUNER_MAX_ROWS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
