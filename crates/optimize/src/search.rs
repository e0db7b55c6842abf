use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Failures internal to the parameter search. Never crosses the stage
/// boundary — the validate stage recovers with the grid fallback.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("objective evaluation failed at x={x}: {reason}")]
    Objective { x: f64, reason: String },

    #[error("optimizer setup failed: {0}")]
    Failed(String),
}

/// Loss function handed to an optimizer. For the re-tuning pipeline this
/// wraps the backtester and returns negative winrate, so minimizing the
/// loss maximizes the winrate.
#[async_trait]
pub trait Objective: Send + Sync {
    async fn eval(&self, x: f64) -> Result<f64, OptimizerError>;
}

/// Best point found by a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub value: f64,
    pub loss: f64,
    pub converged: bool,
}

/// Bounded single-parameter minimizer.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn minimize(
        &self,
        objective: &dyn Objective,
        bounds: (f64, f64),
        initial: f64,
    ) -> Result<Minimum, OptimizerError>;
}

/// Deterministic bounded descent: probe one step either side of the
/// current point, move to the best, halve the step when the center wins.
/// Stops when the step drops below `tolerance` (converged) or the
/// evaluation budget runs out (not converged). No randomness anywhere, so
/// identical inputs always yield the identical minimum.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateSearch {
    pub max_evals: usize,
    /// Step size below which the search is considered converged. The
    /// default of 0.5 matches integer-valued period parameters.
    pub tolerance: f64,
}

impl Default for CoordinateSearch {
    fn default() -> Self {
        Self {
            max_evals: 24,
            tolerance: 0.5,
        }
    }
}

#[async_trait]
impl Optimizer for CoordinateSearch {
    async fn minimize(
        &self,
        objective: &dyn Objective,
        bounds: (f64, f64),
        initial: f64,
    ) -> Result<Minimum, OptimizerError> {
        let (lo, hi) = bounds;
        if !(lo < hi) {
            return Err(OptimizerError::Failed(format!(
                "invalid bounds: [{lo}, {hi}]"
            )));
        }

        let mut x = initial.clamp(lo, hi);
        let mut fx = objective.eval(x).await?;
        let mut evals = 1usize;
        let mut step = (hi - lo) / 4.0;

        while step >= self.tolerance && evals < self.max_evals {
            let mut best = (x, fx);

            for probe in [x - step, x + step] {
                let probe = probe.clamp(lo, hi);
                if (probe - x).abs() < f64::EPSILON || evals >= self.max_evals {
                    continue;
                }
                let loss = objective.eval(probe).await?;
                evals += 1;
                // Strict improvement; ties keep the incumbent, so the
                // search cannot oscillate.
                if loss < best.1 {
                    best = (probe, loss);
                }
            }

            if (best.0 - x).abs() < f64::EPSILON {
                step /= 2.0;
            } else {
                (x, fx) = best;
            }
            debug!(x, loss = fx, step, evals, "Search step");
        }

        Ok(Minimum {
            value: x,
            loss: fx,
            converged: step < self.tolerance,
        })
    }
}
