use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info};

use common::collab::Backtester;
use common::{
    ConfigSnapshot, ExitReason, IndicatorRow, MockTrade, Result, StrategyParams, ValidationMetrics,
};

/// Trades required before a sharpe ratio is reported at all.
const MIN_TRADES_FOR_SHARPE: usize = 5;

/// Deterministic validation backtest for the channel-following strategy.
///
/// Entry: gaussian midline rising, close above the long SMMA, ADX above the
/// configured threshold, at most `max_trades_per_day` entries per session.
/// Exit: stop at one ATR below entry, target at `tp_r_multiple` R, or a
/// close below the kijun baseline. One position at a time, long only.
///
/// The same inputs always produce the same trades, which is what makes the
/// optimization loop's idempotence guarantee hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelBacktester;

#[async_trait]
impl Backtester for ChannelBacktester {
    async fn run(
        &self,
        config: &ConfigSnapshot,
        history: &[IndicatorRow],
        overrides: Option<&[MockTrade]>,
    ) -> Result<ValidationMetrics> {
        let params = config.params();
        let metrics = match overrides {
            Some(trades) => {
                info!(
                    injected = trades.len(),
                    "Override mode: scoring externally supplied trades"
                );
                metrics_from_trades(trades)
            }
            None => {
                let trades = walk_channel(history, params, params.min_bars as usize);
                debug!(trades = trades.len(), rows = history.len(), "Channel walk complete");
                metrics_from_trades(&trades)
            }
        };
        info!(
            winrate = metrics.winrate,
            trade_count = metrics.trade_count,
            total_pnl = metrics.total_pnl,
            "Validation backtest complete"
        );
        Ok(metrics)
    }
}

/// Walk the rows with the channel rules and return the closed trades.
///
/// `warmup` is the number of leading bars skipped before entries are
/// considered; the full validation pass uses `min_bars`, the mock pass
/// starts almost immediately.
pub fn walk_channel(rows: &[IndicatorRow], params: &StrategyParams, warmup: usize) -> Vec<MockTrade> {
    let mut trades = Vec::new();
    let mut entries_per_day: HashMap<NaiveDate, u32> = HashMap::new();

    let mut i = warmup.max(1);
    while i < rows.len() {
        let prev = &rows[i - 1];
        let bar = &rows[i];
        let day = bar.ts.date_naive();
        let today = entries_per_day.get(&day).copied().unwrap_or(0);

        let entry_signal = bar.gauss > prev.gauss
            && bar.close > bar.smma
            && bar.adx > params.adx_threshold
            && today < params.max_trades_per_day;

        if !entry_signal {
            i += 1;
            continue;
        }

        *entries_per_day.entry(day).or_insert(0) += 1;
        let entry = bar.close;
        let stop = entry - bar.atr;
        let target = entry + params.tp_r_multiple * bar.atr;

        let (exit, exit_reason, next) = scan_exit(rows, i + 1, stop, target);
        trades.push(MockTrade {
            entry,
            stop,
            target,
            exit,
            exit_reason,
            pnl: (exit - entry) * params.contract_multiplier,
        });
        i = next;
    }
    trades
}

/// Find where an open position closes, scanning from `start`.
/// Returns (exit price, reason, index to resume from).
fn scan_exit(rows: &[IndicatorRow], start: usize, stop: f64, target: f64) -> (f64, ExitReason, usize) {
    for (j, bar) in rows.iter().enumerate().skip(start) {
        if bar.low <= stop {
            return (stop, ExitReason::Stop, j + 1);
        }
        if bar.high >= target {
            return (target, ExitReason::Target, j + 1);
        }
        if bar.close < bar.kijun {
            return (bar.close, ExitReason::ChannelBreak, j + 1);
        }
    }
    // Data ran out with the position open.
    let last = rows.last().map(|r| r.close).unwrap_or(stop);
    (last, ExitReason::EndOfData, rows.len())
}

/// Winrate, PnL and sharpe from a set of closed trades.
pub fn metrics_from_trades(trades: &[MockTrade]) -> ValidationMetrics {
    let n = trades.len();
    if n == 0 {
        return ValidationMetrics {
            winrate: 0.0,
            trade_count: 0,
            total_pnl: 0.0,
            sharpe: None,
        };
    }

    let wins = trades.iter().filter(|t| t.is_win()).count();
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let mean = total_pnl / n as f64;

    let sharpe = if n >= MIN_TRADES_FOR_SHARPE {
        let variance = trades
            .iter()
            .map(|t| (t.pnl - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        let std = variance.sqrt();
        (std > 0.0).then(|| mean / std)
    } else {
        None
    };

    ValidationMetrics {
        winrate: wins as f64 / n as f64,
        trade_count: n as u32,
        total_pnl,
        sharpe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::store::{ConfigStore, ParamsFile, StrategyParams};

    /// Rows forming a clean uptrend: every bar is an entry candidate and the
    /// next bar's high always clears a 2R target.
    fn uptrend(n: usize) -> Vec<IndicatorRow> {
        (0..n)
            .map(|i| {
                let close = 380.0 + i as f64;
                IndicatorRow {
                    ts: Utc.timestamp_opt(1_750_000_000 + i as i64 * 1800, 0).unwrap(),
                    open: close,
                    high: close + 10.0,
                    low: close - 0.5,
                    close,
                    volume: 100.0,
                    gauss: 100.0 + i as f64,
                    kijun: close - 20.0,
                    adx: 25.0,
                    smma: close - 30.0,
                    atr: 2.0,
                }
            })
            .collect()
    }

    fn params() -> StrategyParams {
        StrategyParams {
            min_bars: 1,
            ..StrategyParams::default()
        }
    }

    fn snapshot(p: StrategyParams) -> ConfigSnapshot {
        ConfigStore::in_memory(ParamsFile {
            strategy: p,
            ..ParamsFile::default()
        })
        .snapshot()
    }

    #[test]
    fn uptrend_hits_targets() {
        let rows = uptrend(20);
        let trades = walk_channel(&rows, &params(), 1);
        assert!(!trades.is_empty());
        assert!(trades.iter().all(|t| t.exit_reason == ExitReason::Target));
        assert!(trades.iter().all(|t| t.is_win()));
    }

    #[test]
    fn daily_cap_limits_entries() {
        // All 20 bars fall on the same trading day (30-minute bars).
        let rows = uptrend(20);
        let p = StrategyParams {
            max_trades_per_day: 2,
            min_bars: 1,
            ..StrategyParams::default()
        };
        let trades = walk_channel(&rows, &p, 1);
        assert!(trades.len() <= 2, "daily cap breached: {}", trades.len());
    }

    #[test]
    fn warmup_suppresses_early_entries() {
        let rows = uptrend(20);
        let trades = walk_channel(&rows, &params(), 50);
        assert!(trades.is_empty());
    }

    #[test]
    fn stop_is_taken_before_target_on_the_same_bar() {
        let mut rows = uptrend(3);
        // Entry lands on bar 1; bar 2 spikes through both the stop and the
        // target, and the stop must win.
        rows[2].low = 0.0;
        rows[2].high = 10_000.0;
        let trades = walk_channel(&rows, &params(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::Stop);
        assert!(!trades[0].is_win());
    }

    #[test]
    fn metrics_sharpe_requires_a_sample() {
        let rows = uptrend(8);
        let p = StrategyParams {
            max_trades_per_day: 2,
            min_bars: 1,
            ..StrategyParams::default()
        };
        let trades = walk_channel(&rows, &p, 1);
        let metrics = metrics_from_trades(&trades);
        assert!(metrics.trade_count < MIN_TRADES_FOR_SHARPE as u32);
        assert!(metrics.sharpe.is_none());
    }

    #[test]
    fn empty_trades_give_zero_metrics() {
        let metrics = metrics_from_trades(&[]);
        assert_eq!(metrics.trade_count, 0);
        assert_eq!(metrics.winrate, 0.0);
        assert!(metrics.sharpe.is_none());
    }

    #[tokio::test]
    async fn override_mode_scores_injected_trades() {
        let backtester = ChannelBacktester;
        let injected: Vec<MockTrade> = (0..4)
            .map(|i| MockTrade {
                entry: 380.0,
                stop: 377.0,
                target: 386.0,
                exit: if i < 3 { 386.0 } else { 377.0 },
                exit_reason: if i < 3 { ExitReason::Target } else { ExitReason::Stop },
                pnl: if i < 3 { 22.6 } else { -11.3 },
            })
            .collect();

        let metrics = backtester
            .run(&snapshot(params()), &[], Some(&injected))
            .await
            .unwrap();
        assert_eq!(metrics.trade_count, 4);
        assert!((metrics.winrate - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn same_inputs_same_metrics() {
        let backtester = ChannelBacktester;
        let rows = uptrend(30);
        let snap = snapshot(params());
        let a = backtester.run(&snap, &rows, None).await.unwrap();
        let b = backtester.run(&snap, &rows, None).await.unwrap();
        assert_eq!(a, b);
    }
}
