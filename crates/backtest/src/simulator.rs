use async_trait::async_trait;
use tracing::info;

use common::collab::TradeSimulator;
use common::{ConfigSnapshot, IndicatorRow, Result, SignalSummary, TradeReport};

use crate::engine::{metrics_from_trades, walk_channel};

/// Fast mock trading pass over a short sample window.
///
/// Runs the same channel walk as the full backtest but only over the most
/// recent bars and without the warmup requirement, so a handful of trades
/// come back quickly for the validation stage to sanity-check against.
#[derive(Debug, Clone)]
pub struct MockSimulator {
    /// Bars taken from the end of the window for the mock pass.
    pub sample_window: usize,
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self { sample_window: 60 }
    }
}

#[async_trait]
impl TradeSimulator for MockSimulator {
    async fn simulate(
        &self,
        rows: &[IndicatorRow],
        config: &ConfigSnapshot,
        signals: &SignalSummary,
    ) -> Result<TradeReport> {
        let start = rows.len().saturating_sub(self.sample_window);
        let sample = &rows[start..];

        let trades = walk_channel(sample, config.params(), 1);
        let metrics = metrics_from_trades(&trades);

        let commentary = format!(
            "Mock pass over {} bars produced {} trades (winrate {:.2}) \
             against {} potential entries flagged by the signal summary.",
            sample.len(),
            trades.len(),
            metrics.winrate,
            signals.potential_entries,
        );
        info!(
            trades = trades.len(),
            winrate = metrics.winrate,
            pnl = metrics.total_pnl,
            "Mock trading pass complete"
        );

        Ok(TradeReport {
            winrate: metrics.winrate,
            total_pnl: metrics.total_pnl,
            trades,
            commentary,
        })
    }
}
