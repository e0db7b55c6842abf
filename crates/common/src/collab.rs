use async_trait::async_trait;

use crate::store::ConfigSnapshot;
use crate::types::{
    IndicatorRow, MockTrade, ReviewPayload, ReviewReply, SignalSummary, SymbolWindow, TradeReport,
    ValidationMetrics,
};
use crate::Result;

/// Source of pre-computed OHLCV + indicator rows.
///
/// `CsvFeed` in `crates/signals` implements this for file-backed data.
/// Fails with `Error::DataUnavailable` when the source is empty or
/// malformed; returns at most `window.max_rows` rows, oldest first.
#[async_trait]
pub trait DataFeed: Send + Sync {
    async fn load(&self, window: &SymbolWindow) -> Result<Vec<IndicatorRow>>;
}

/// Turns a row window into a signal summary.
///
/// Implementations may generate free-text commentary, but every field that
/// downstream stages branch on must be derived numerically from the rows.
#[async_trait]
pub trait SignalAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        rows: &[IndicatorRow],
        config: &ConfigSnapshot,
    ) -> Result<SignalSummary>;
}

/// Fast mock trading pass over a small sample for quick iteration.
#[async_trait]
pub trait TradeSimulator: Send + Sync {
    async fn simulate(
        &self,
        rows: &[IndicatorRow],
        config: &ConfigSnapshot,
        signals: &SignalSummary,
    ) -> Result<TradeReport>;
}

/// Full validation backtest.
///
/// `overrides` switches the engine into override mode: the supplied trade
/// events are scored instead of entries generated from the strategy rules.
/// Used when indicator confidence is low.
#[async_trait]
pub trait Backtester: Send + Sync {
    async fn run(
        &self,
        config: &ConfigSnapshot,
        history: &[IndicatorRow],
        overrides: Option<&[MockTrade]>,
    ) -> Result<ValidationMetrics>;
}

/// Human reviewer channel. The approval gate bounds the wait; an
/// implementation only has to present the payload and return one reply.
#[async_trait]
pub trait ReviewChannel: Send + Sync {
    async fn prompt(&self, payload: &ReviewPayload) -> Result<ReviewReply>;
}
