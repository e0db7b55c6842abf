use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use common::collab::{DataFeed, ReviewChannel, SignalAnalyzer, TradeSimulator};
use common::{ConfigSnapshot, DataSummary, Error, Result, ReviewPayload, SymbolWindow};

use crate::context::StageContext;
use crate::gate::ApprovalGate;
use crate::stage::PipelineStage;

/// Rows used for the headline mean statistics in the data summary.
const STATS_WINDOW: usize = 10;

/// Loads the bounded row window and records headline statistics.
pub struct DataStage {
    feed: Arc<dyn DataFeed>,
    window: SymbolWindow,
}

impl DataStage {
    pub fn new(feed: Arc<dyn DataFeed>, window: SymbolWindow) -> Self {
        Self { feed, window }
    }
}

#[async_trait]
impl PipelineStage for DataStage {
    fn name(&self) -> &'static str {
        "data"
    }

    async fn run(&self, _config: &ConfigSnapshot, mut ctx: StageContext) -> Result<StageContext> {
        let rows = self.feed.load(&self.window).await?;
        if rows.is_empty() {
            return Err(Error::DataUnavailable(
                "data feed returned no rows".to_string(),
            ));
        }

        let tail = &rows[rows.len().saturating_sub(STATS_WINDOW)..];
        let mean_close = tail.iter().map(|r| r.close).sum::<f64>() / tail.len() as f64;
        let mean_adx = tail.iter().map(|r| r.adx).sum::<f64>() / tail.len() as f64;

        info!(
            symbol = %self.window.symbol,
            rows = rows.len(),
            mean_close,
            mean_adx,
            "Data stage complete"
        );
        ctx.put_data(DataSummary {
            total_rows: rows.len(),
            rows,
            mean_close,
            mean_adx,
        })?;
        Ok(ctx)
    }
}

/// Turns the row window into a signal summary.
pub struct IndicatorStage {
    analyzer: Arc<dyn SignalAnalyzer>,
}

impl IndicatorStage {
    pub fn new(analyzer: Arc<dyn SignalAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl PipelineStage for IndicatorStage {
    fn name(&self) -> &'static str {
        "indicator"
    }

    async fn run(&self, config: &ConfigSnapshot, mut ctx: StageContext) -> Result<StageContext> {
        let data = ctx.data(self.name())?;
        let summary = self.analyzer.analyze(&data.rows, config).await?;
        // Commentary is for the logs only; nothing downstream parses it.
        info!(commentary = %summary.commentary, "Indicator stage complete");
        ctx.put_signals(summary)?;
        Ok(ctx)
    }
}

/// Runs the fast mock trading pass.
pub struct TradeStage {
    simulator: Arc<dyn TradeSimulator>,
}

impl TradeStage {
    pub fn new(simulator: Arc<dyn TradeSimulator>) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl PipelineStage for TradeStage {
    fn name(&self) -> &'static str {
        "trade"
    }

    async fn run(&self, config: &ConfigSnapshot, mut ctx: StageContext) -> Result<StageContext> {
        let data = ctx.data(self.name())?;
        let signals = ctx.signals(self.name())?;
        let report = self.simulator.simulate(&data.rows, config, signals).await?;
        info!(
            trades = report.trades.len(),
            winrate = report.winrate,
            commentary = %report.commentary,
            "Trade stage complete"
        );
        ctx.put_trades(report)?;
        Ok(ctx)
    }
}

/// Presents the validation outcome to the reviewer through the bounded
/// approval gate and records the resolved decision.
pub struct ApprovalStage {
    gate: ApprovalGate,
    channel: Arc<dyn ReviewChannel>,
}

impl ApprovalStage {
    pub fn new(gate: ApprovalGate, channel: Arc<dyn ReviewChannel>) -> Self {
        Self { gate, channel }
    }
}

#[async_trait]
impl PipelineStage for ApprovalStage {
    fn name(&self) -> &'static str {
        "approval"
    }

    async fn run(&self, _config: &ConfigSnapshot, mut ctx: StageContext) -> Result<StageContext> {
        let validation = ctx.validation(self.name())?;
        let payload = ReviewPayload {
            delta: validation.delta.clone(),
            metrics: validation.metrics.clone(),
        };
        let decision = self.gate.resolve(&payload, self.channel.as_ref()).await;
        ctx.put_decision(decision)?;
        Ok(ctx)
    }
}
