use async_trait::async_trait;
use tracing::info;

use common::collab::SignalAnalyzer;
use common::{ConfigSnapshot, Error, IndicatorRow, Result, SignalSummary};

/// Deterministic signal analysis over the most recent bars.
///
/// Counts gaussian-midline rises, the fraction of bars with ADX above the
/// configured threshold, and closes above the long SMMA. The commentary is
/// generated from those numbers and is for the logs only.
#[derive(Debug, Clone)]
pub struct ChannelAnalyzer {
    /// Bars considered "recent".
    pub recent_window: usize,
}

impl Default for ChannelAnalyzer {
    fn default() -> Self {
        Self { recent_window: 20 }
    }
}

#[async_trait]
impl SignalAnalyzer for ChannelAnalyzer {
    async fn analyze(
        &self,
        rows: &[IndicatorRow],
        config: &ConfigSnapshot,
    ) -> Result<SignalSummary> {
        if rows.is_empty() {
            return Err(Error::DataUnavailable(
                "no rows to analyze for signals".to_string(),
            ));
        }

        let start = rows.len().saturating_sub(self.recent_window);
        let recent = &rows[start..];
        let threshold = config.params().adx_threshold;

        let gauss_up_count = recent
            .windows(2)
            .filter(|w| w[1].gauss > w[0].gauss)
            .count() as u32;
        let adx_above = recent.iter().filter(|r| r.adx > threshold).count();
        let adx_above_threshold = adx_above as f64 / recent.len() as f64;
        let potential_entries = recent.iter().filter(|r| r.close > r.smma).count() as u32;

        let commentary = format!(
            "Gaussian midline rose on {gauss_up_count} of the last {} bars; \
             ADX held above {threshold} on {:.0}% of them; \
             {potential_entries} closes sat above the long SMMA.",
            recent.len(),
            adx_above_threshold * 100.0,
        );
        info!(
            gauss_up_count,
            adx_above_threshold, potential_entries, "Signal summary computed"
        );

        Ok(SignalSummary {
            gauss_up_count,
            adx_above_threshold,
            potential_entries,
            commentary,
        })
    }
}
