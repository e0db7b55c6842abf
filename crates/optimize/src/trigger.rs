use common::ValidationMetrics;

/// Decide whether the parameter search should run at all.
///
/// Fires iff the winrate is below target AND the sample is large enough to
/// trust — optimizing on a handful of trades just chases noise. Pure and
/// side-effect free so it can be tested standalone.
pub fn should_optimize(metrics: &ValidationMetrics, target_winrate: f64, min_samples: u32) -> bool {
    metrics.winrate < target_winrate && metrics.trade_count >= min_samples
}
