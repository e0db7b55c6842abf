use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLCV bar with its pre-computed indicator columns.
/// Rows arrive oldest-first from the data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Gaussian channel midline.
    pub gauss: f64,
    /// Kijun baseline (exit channel).
    pub kijun: f64,
    pub adx: f64,
    /// Long smoothed moving average (trend filter).
    pub smma: f64,
    pub atr: f64,
}

/// Request handed to the data feed: which symbol, and how many rows at most.
#[derive(Debug, Clone)]
pub struct SymbolWindow {
    pub symbol: String,
    pub max_rows: usize,
}

/// Output of the Data stage: the bounded row window plus headline stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSummary {
    /// Rows in the loaded window.
    pub total_rows: usize,
    /// The window actually carried forward (oldest first).
    pub rows: Vec<IndicatorRow>,
    /// Mean close over the most recent rows.
    pub mean_close: f64,
    /// Mean ADX over the most recent rows.
    pub mean_adx: f64,
}

/// Output of the Indicator stage.
///
/// The numeric fields drive downstream decisions; `commentary` is opaque
/// free text for the logs and must never influence control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    /// Bars in the recent window where the gaussian midline rose.
    pub gauss_up_count: u32,
    /// Fraction of recent bars with ADX above the configured threshold.
    pub adx_above_threshold: f64,
    /// Recent bars closing above the long SMMA.
    pub potential_entries: u32,
    pub commentary: String,
}

/// Why a simulated trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Target,
    Stop,
    ChannelBreak,
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Target => write!(f, "target"),
            ExitReason::Stop => write!(f, "stop"),
            ExitReason::ChannelBreak => write!(f, "channel_break"),
            ExitReason::EndOfData => write!(f, "end_of_data"),
        }
    }
}

/// A single simulated long trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockTrade {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub exit: f64,
    pub exit_reason: ExitReason,
    /// Signed PnL in account currency (contract multiplier applied).
    pub pnl: f64,
}

impl MockTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Output of the Trade stage: the fast mock pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    pub trades: Vec<MockTrade>,
    pub winrate: f64,
    pub total_pnl: f64,
    pub commentary: String,
}

/// Metrics from a full validation pass over the history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Fraction of winning trades in [0, 1].
    pub winrate: f64,
    pub trade_count: u32,
    pub total_pnl: f64,
    /// `None` when the sample is too small to annualize meaningfully.
    pub sharpe: Option<f64>,
}

/// Result of a parameter search, present only when the trigger fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub parameter: String,
    pub value: f64,
    /// Metrics achieved with the candidate value on the search window.
    pub achieved: ValidationMetrics,
    /// Whether the primary optimizer converged (false on the grid fallback).
    pub converged: bool,
}

/// A proposed single-parameter change, applied only after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDelta {
    pub parameter: String,
    pub old_value: f64,
    pub new_value: f64,
}

impl std::fmt::Display for ConfigDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.parameter, self.old_value, self.new_value
        )
    }
}

/// Output of the Validate-and-Optimize stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Final metrics: post-optimization when a candidate was adopted.
    pub metrics: ValidationMetrics,
    pub delta: Option<ConfigDelta>,
    pub optimization: Option<OptimizationResult>,
    pub optimization_ran: bool,
}

/// How the approval gate resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalVerdict {
    Approved,
    Rejected,
    /// No reviewer response within the deadline; treated as approval.
    TimedOut,
}

/// The reviewer's decision plus optional free-text rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub verdict: ApprovalVerdict,
    pub rationale: Option<String>,
}

impl ApprovalDecision {
    /// Timed-out gates resolve to an effective approval; an explicit
    /// rejection is always honored.
    pub fn is_approved(&self) -> bool {
        matches!(
            self.verdict,
            ApprovalVerdict::Approved | ApprovalVerdict::TimedOut
        )
    }
}

/// What the gate presents to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPayload {
    /// `None` means "no change" is up for confirmation.
    pub delta: Option<ConfigDelta>,
    pub metrics: ValidationMetrics,
}

/// The reviewer's raw reply before the gate maps it to a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewReply {
    pub approved: bool,
    pub rationale: Option<String>,
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Committed,
    Discarded,
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Committed => write!(f, "committed"),
            RunOutcome::Discarded => write!(f, "discarded"),
            RunOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of one pipeline run, emitted by the binary as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub metrics: Option<ValidationMetrics>,
    pub delta: Option<ConfigDelta>,
    pub decision: Option<ApprovalDecision>,
    /// Cause of a failed run; `None` otherwise.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
