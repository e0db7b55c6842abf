use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backtest::{ChannelBacktester, MockSimulator};
use common::{Config, ConfigStore, RunOutcome, SymbolWindow};
use optimize::CoordinateSearch;
use pipeline::PipelineOrchestrator;
use review::ConsoleReviewer;
use signals::{ChannelAnalyzer, CsvFeed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(symbol = %cfg.symbol, params = %cfg.params_path, "Retuner starting");

    let mut store = ConfigStore::load(&cfg.params_path)
        .with_context(|| format!("loading parameter record from '{}'", cfg.params_path))?;

    // ── Collaborators ─────────────────────────────────────────────────────────
    let feed = Arc::new(CsvFeed::new(&cfg.data_csv_path));
    let analyzer = Arc::new(ChannelAnalyzer::default());
    let simulator = Arc::new(MockSimulator::default());
    let backtester = Arc::new(ChannelBacktester);
    let optimizer = Arc::new(CoordinateSearch::default());
    let reviewer = Arc::new(ConsoleReviewer);

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let window = SymbolWindow {
        symbol: cfg.symbol.clone(),
        max_rows: cfg.max_rows,
    };
    let optimization = store.optimization().clone();
    let approval_timeout = Duration::from_secs(store.approval().timeout_secs);

    let orchestrator = PipelineOrchestrator::standard(
        feed,
        analyzer,
        simulator,
        backtester,
        optimizer,
        reviewer,
        window,
        optimization,
        approval_timeout,
    );

    let report = orchestrator.run(&mut store).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.outcome == RunOutcome::Failed {
        std::process::exit(1);
    }
    Ok(())
}
