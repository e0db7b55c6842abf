use tracing::warn;

use crate::search::{Minimum, Objective};

/// Candidate count for the fallback grid.
const GRID_POINTS: usize = 5;

/// Evenly spaced integer candidates across the bounds, deduplicated.
/// For the default 20..=40 range this yields 20, 25, 30, 35, 40.
pub fn grid_candidates(bounds: (f64, f64)) -> Vec<f64> {
    let (lo, hi) = bounds;
    let mut candidates = Vec::with_capacity(GRID_POINTS);
    for i in 0..GRID_POINTS {
        let t = i as f64 / (GRID_POINTS - 1) as f64;
        let x = (lo + t * (hi - lo)).round();
        if candidates.last() != Some(&x) {
            candidates.push(x);
        }
    }
    candidates
}

/// Deterministic fallback used when the primary optimizer errors or does
/// not converge: evaluate the fixed grid, keep the best by loss, skip
/// candidates whose evaluation fails. Returns `None` only if nothing could
/// be evaluated at all.
pub async fn grid_search(objective: &dyn Objective, bounds: (f64, f64)) -> Option<Minimum> {
    let mut best: Option<(f64, f64)> = None;

    for candidate in grid_candidates(bounds) {
        match objective.eval(candidate).await {
            Ok(loss) => {
                // Strict improvement keeps the earliest (smallest) candidate
                // on ties, so the pick is stable.
                if best.map_or(true, |(_, b)| loss < b) {
                    best = Some((candidate, loss));
                }
            }
            Err(e) => {
                warn!(candidate, error = %e, "Grid candidate evaluation failed; skipping");
            }
        }
    }

    best.map(|(value, loss)| Minimum {
        value,
        loss,
        converged: false,
    })
}
