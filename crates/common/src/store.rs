use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::ConfigDelta;

/// The tunable strategy parameter set, persisted as the `[strategy]` table
/// of the parameter record.
///
/// Example `config/params.toml`:
/// ```toml
/// [strategy]
/// gaussian_period = 26
/// kijun_period = 100
/// adx_threshold = 19.0
///
/// [optimization]
/// target_winrate = 0.71
/// parameter = "gaussian_period"
///
/// [approval]
/// timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Gaussian channel smoothing period.
    pub gaussian_period: u32,
    /// Kijun baseline period (exit channel).
    pub kijun_period: u32,
    /// Minimum ADX for an entry to count as trending.
    pub adx_threshold: f64,
    /// Take-profit distance in R multiples of the initial stop.
    pub tp_r_multiple: f64,
    /// ATR multiple for the trailing exit.
    pub trailing_atr_mult: f64,
    /// Fraction of equity risked per trade.
    pub risk_pct: f64,
    pub max_trades_per_day: u32,
    /// Bars required before the simulation starts trading.
    pub min_bars: u32,
    /// Account currency value per price point per contract.
    pub contract_multiplier: f64,
    pub starting_equity: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            gaussian_period: 26,
            kijun_period: 100,
            adx_threshold: 19.0,
            tp_r_multiple: 2.0,
            trailing_atr_mult: 4.0,
            risk_pct: 0.01,
            max_trades_per_day: 5,
            min_bars: 200,
            contract_multiplier: 3.768,
            starting_equity: 100_000.0,
        }
    }
}

/// Parameter names addressable by a `ConfigDelta`.
const TUNABLE: &[&str] = &[
    "gaussian_period",
    "kijun_period",
    "adx_threshold",
    "tp_r_multiple",
    "trailing_atr_mult",
    "risk_pct",
    "max_trades_per_day",
];

impl StrategyParams {
    /// Read a tunable parameter by name.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        match name {
            "gaussian_period" => Some(f64::from(self.gaussian_period)),
            "kijun_period" => Some(f64::from(self.kijun_period)),
            "adx_threshold" => Some(self.adx_threshold),
            "tp_r_multiple" => Some(self.tp_r_multiple),
            "trailing_atr_mult" => Some(self.trailing_atr_mult),
            "risk_pct" => Some(self.risk_pct),
            "max_trades_per_day" => Some(f64::from(self.max_trades_per_day)),
            _ => None,
        }
    }

    /// Produce a copy with one tunable parameter replaced. Integer-valued
    /// parameters are rounded to the nearest whole number.
    pub fn with_value(&self, name: &str, value: f64) -> Result<Self> {
        let mut next = self.clone();
        match name {
            "gaussian_period" => next.gaussian_period = round_u32(value)?,
            "kijun_period" => next.kijun_period = round_u32(value)?,
            "adx_threshold" => next.adx_threshold = value,
            "tp_r_multiple" => next.tp_r_multiple = value,
            "trailing_atr_mult" => next.trailing_atr_mult = value,
            "risk_pct" => next.risk_pct = value,
            "max_trades_per_day" => next.max_trades_per_day = round_u32(value)?,
            other => {
                return Err(Error::Config(format!(
                    "unknown tunable parameter '{other}' (known: {})",
                    TUNABLE.join(", ")
                )))
            }
        }
        Ok(next)
    }
}

fn round_u32(value: f64) -> Result<u32> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(Error::Config(format!(
            "value {value} is out of range for an integer parameter"
        )));
    }
    Ok(value.round() as u32)
}

/// Settings for the conditional parameter search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Winrate below which the trigger fires.
    pub target_winrate: f64,
    /// Trades required before a winrate is trusted.
    pub min_sample_trades: u32,
    /// The single parameter the search may move.
    pub parameter: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Recent rows used for the search-time mini backtests.
    pub recent_window: usize,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            target_winrate: 0.71,
            min_sample_trades: 5,
            parameter: "gaussian_period".to_string(),
            lower_bound: 20.0,
            upper_bound: 40.0,
            recent_window: 200,
        }
    }
}

/// Settings for the human approval gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    pub timeout_secs: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// On-disk shape of the parameter record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsFile {
    pub strategy: StrategyParams,
    pub optimization: OptimizationSettings,
    pub approval: ApprovalSettings,
}

/// An immutable view of the strategy parameters at a point in time.
///
/// Snapshots are values: deriving a trial configuration produces a new
/// snapshot and leaves the original untouched. The revision ties a snapshot
/// to the canonical state it was taken from, so a stale commit is detectable.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    params: StrategyParams,
    revision: u64,
}

impl ConfigSnapshot {
    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Derive a snapshot with one parameter replaced, keeping the revision.
    /// Used for trial configurations during optimization and for candidate
    /// snapshots built from an approved delta.
    pub fn with_param(&self, name: &str, value: f64) -> Result<ConfigSnapshot> {
        Ok(ConfigSnapshot {
            params: self.params.with_value(name, value)?,
            revision: self.revision,
        })
    }
}

/// Holds the canonical parameter set for the process.
///
/// Reads go through `snapshot()` (independent copies, never live
/// references). `commit` is the only mutator: it accepts a candidate
/// derived from the current canonical revision, replaces the canonical
/// state, and rewrites the persisted record. Failed and discarded runs
/// never reach `commit`, so they leave both untouched.
#[derive(Debug)]
pub struct ConfigStore {
    file: ParamsFile,
    revision: u64,
    path: Option<PathBuf>,
    run_active: bool,
    committed_this_run: bool,
}

impl ConfigStore {
    /// Load the persisted parameter record.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: ParamsFile = toml::from_str(&content)?;
        info!(path = %path.display(), "Parameter record loaded");
        Ok(Self {
            file,
            revision: 0,
            path: Some(path.to_path_buf()),
            run_active: false,
            committed_this_run: false,
        })
    }

    /// Build a store that never touches disk. Used by tests.
    pub fn in_memory(file: ParamsFile) -> Self {
        Self {
            file,
            revision: 0,
            path: None,
            run_active: false,
            committed_this_run: false,
        }
    }

    pub fn optimization(&self) -> &OptimizationSettings {
        &self.file.optimization
    }

    pub fn approval(&self) -> &ApprovalSettings {
        &self.file.approval
    }

    /// An independent copy of the canonical parameters.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            params: self.file.strategy.clone(),
            revision: self.revision,
        }
    }

    /// Build a candidate snapshot from a delta without committing it.
    /// Fails if the delta is stale (its `old_value` no longer matches the
    /// canonical value) or names an unknown parameter.
    pub fn propose(&self, delta: &ConfigDelta) -> Result<ConfigSnapshot> {
        let current = self.file.strategy.value_of(&delta.parameter).ok_or_else(|| {
            Error::Config(format!("unknown tunable parameter '{}'", delta.parameter))
        })?;
        if (current - delta.old_value).abs() > 1e-9 {
            return Err(Error::Conflict(format!(
                "delta for '{}' is stale: expected old value {}, canonical is {}",
                delta.parameter, delta.old_value, current
            )));
        }
        self.snapshot().with_param(&delta.parameter, delta.new_value)
    }

    /// Mark the start of a pipeline run. A second run against an active
    /// store is a conflict — the design assumes one run at a time, so this
    /// guards against reentrancy rather than true concurrent writers.
    pub fn begin_run(&mut self) -> Result<()> {
        if self.run_active {
            return Err(Error::Conflict(
                "a pipeline run is already active against this store".to_string(),
            ));
        }
        self.run_active = true;
        self.committed_this_run = false;
        Ok(())
    }

    pub fn end_run(&mut self) {
        self.run_active = false;
    }

    /// The single mutator. Replaces the canonical parameters with an
    /// approved candidate and rewrites the persisted record. Callable at
    /// most once per run, and only with a snapshot derived from the
    /// current canonical revision.
    pub fn commit(&mut self, snapshot: ConfigSnapshot) -> Result<()> {
        if !self.run_active {
            return Err(Error::Conflict(
                "commit outside an active pipeline run".to_string(),
            ));
        }
        if self.committed_this_run {
            return Err(Error::Conflict(
                "second commit within one pipeline run".to_string(),
            ));
        }
        if snapshot.revision != self.revision {
            return Err(Error::Conflict(format!(
                "stale snapshot: revision {} does not match canonical revision {}",
                snapshot.revision, self.revision
            )));
        }

        self.file.strategy = snapshot.params;
        self.revision += 1;
        self.committed_this_run = true;

        if let Some(path) = &self.path {
            let rendered = toml::to_string_pretty(&self.file)?;
            std::fs::write(path, rendered)?;
            info!(path = %path.display(), revision = self.revision, "Parameter record rewritten");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        ConfigStore::in_memory(ParamsFile::default())
    }

    fn delta(new_value: f64) -> ConfigDelta {
        ConfigDelta {
            parameter: "gaussian_period".to_string(),
            old_value: 26.0,
            new_value,
        }
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let mut s = store();
        let snap = s.snapshot();

        s.begin_run().unwrap();
        let candidate = s.propose(&delta(28.0)).unwrap();
        s.commit(candidate).unwrap();

        // The earlier snapshot still shows the old value.
        assert_eq!(snap.params().gaussian_period, 26);
        assert_eq!(s.snapshot().params().gaussian_period, 28);
    }

    #[test]
    fn propose_does_not_mutate_canonical() {
        let s = store();
        let _candidate = s.propose(&delta(32.0)).unwrap();
        assert_eq!(s.snapshot().params().gaussian_period, 26);
        assert_eq!(s.snapshot().revision(), 0);
    }

    #[test]
    fn propose_rejects_stale_delta() {
        let s = store();
        let stale = ConfigDelta {
            parameter: "gaussian_period".to_string(),
            old_value: 30.0, // canonical is 26
            new_value: 28.0,
        };
        assert!(matches!(s.propose(&stale), Err(Error::Conflict(_))));
    }

    #[test]
    fn commit_rejects_stale_snapshot() {
        let mut s = store();
        let old_candidate = s.propose(&delta(28.0)).unwrap();

        s.begin_run().unwrap();
        let fresh = s.propose(&delta(30.0)).unwrap();
        s.commit(fresh).unwrap();
        s.end_run();

        // A candidate derived from revision 0 can no longer land.
        s.begin_run().unwrap();
        assert!(matches!(s.commit(old_candidate), Err(Error::Conflict(_))));
    }

    #[test]
    fn commit_twice_in_one_run_is_a_conflict() {
        let mut s = store();
        s.begin_run().unwrap();
        let c1 = s.propose(&delta(28.0)).unwrap();
        s.commit(c1).unwrap();
        let c2 = s.snapshot();
        assert!(matches!(s.commit(c2), Err(Error::Conflict(_))));
    }

    #[test]
    fn commit_outside_a_run_is_a_conflict() {
        let mut s = store();
        let candidate = s.propose(&delta(28.0)).unwrap();
        assert!(matches!(s.commit(candidate), Err(Error::Conflict(_))));
    }

    #[test]
    fn nested_begin_run_is_a_conflict() {
        let mut s = store();
        s.begin_run().unwrap();
        assert!(matches!(s.begin_run(), Err(Error::Conflict(_))));
        s.end_run();
        assert!(s.begin_run().is_ok());
    }

    #[test]
    fn integer_parameters_round_on_write() {
        let params = StrategyParams::default();
        let next = params.with_value("gaussian_period", 27.6).unwrap();
        assert_eq!(next.gaussian_period, 28);
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let params = StrategyParams::default();
        assert!(params.with_value("no_such_param", 1.0).is_err());
        assert!(params.value_of("no_such_param").is_none());
    }
}
