use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use common::collab::{Backtester, DataFeed, ReviewChannel, SignalAnalyzer, TradeSimulator};
use common::store::OptimizationSettings;
use common::{ConfigSnapshot, ConfigStore, Result, RunOutcome, RunReport, SymbolWindow};
use optimize::Optimizer;

use crate::context::StageContext;
use crate::gate::ApprovalGate;
use crate::stage::PipelineStage;
use crate::stages::{ApprovalStage, DataStage, IndicatorStage, TradeStage};
use crate::validate::ValidateOptimizeStage;

/// States of one pipeline run. The three terminal states carry the run's
/// fate: only COMMITTED may mutate the config store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Data,
    Indicator,
    Trade,
    ValidateOptimize,
    Approval,
    Committed,
    Discarded,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::Data => "data",
            RunState::Indicator => "indicator",
            RunState::Trade => "trade",
            RunState::ValidateOptimize => "validate_optimize",
            RunState::Approval => "approval",
            RunState::Committed => "committed",
            RunState::Discarded => "discarded",
            RunState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

fn state_for(stage_name: &str) -> RunState {
    match stage_name {
        "data" => RunState::Data,
        "indicator" => RunState::Indicator,
        "trade" => RunState::Trade,
        "validate_optimize" => RunState::ValidateOptimize,
        "approval" => RunState::Approval,
        _ => RunState::Init,
    }
}

/// Sequences the stages, owns the StageContext for the run, and applies
/// the single permitted state transition on the store: one commit after
/// an approved delta. Everything else leaves the store untouched.
///
/// Dropping the returned future cancels the run; because stages never
/// write to the store and the gate is side-effect free, cancellation
/// between stages or during the approval wait cannot corrupt state.
pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl PipelineOrchestrator {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// Assemble the standard five-stage pipeline from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn standard(
        feed: Arc<dyn DataFeed>,
        analyzer: Arc<dyn SignalAnalyzer>,
        simulator: Arc<dyn TradeSimulator>,
        backtester: Arc<dyn Backtester>,
        optimizer: Arc<dyn Optimizer>,
        reviewer: Arc<dyn ReviewChannel>,
        window: SymbolWindow,
        optimization: OptimizationSettings,
        approval_timeout: Duration,
    ) -> Self {
        Self::new(vec![
            Box::new(DataStage::new(feed, window)),
            Box::new(IndicatorStage::new(analyzer)),
            Box::new(TradeStage::new(simulator)),
            Box::new(ValidateOptimizeStage::new(backtester, optimizer, optimization)),
            Box::new(ApprovalStage::new(
                ApprovalGate::new(approval_timeout),
                reviewer,
            )),
        ])
    }

    /// Execute one run against the store and report the terminal outcome.
    pub async fn run(&self, store: &mut ConfigStore) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "Pipeline run starting");

        if let Err(e) = store.begin_run() {
            error!(%run_id, error = %e, "Run refused");
            return RunReport {
                run_id,
                outcome: RunOutcome::Failed,
                metrics: None,
                delta: None,
                decision: None,
                error: Some(e.to_string()),
                started_at,
                finished_at: Utc::now(),
            };
        }

        let driven = self.drive_stages(store.snapshot()).await;
        let report = self.finalize(run_id, started_at, driven, store);
        store.end_run();

        info!(%run_id, outcome = %report.outcome, "Pipeline run finished");
        report
    }

    /// Run every stage in order over one immutable snapshot.
    async fn drive_stages(&self, snapshot: ConfigSnapshot) -> Result<StageContext> {
        let mut state = RunState::Init;
        let mut ctx = StageContext::new();

        for stage in &self.stages {
            let next = state_for(stage.name());
            info!(from = %state, to = %next, "State transition");
            state = next;
            ctx = stage.run(&snapshot, ctx).await?;
        }
        Ok(ctx)
    }

    /// Map the driven context to a terminal state, committing if and only
    /// if an approved delta is present.
    fn finalize(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        driven: Result<StageContext>,
        store: &mut ConfigStore,
    ) -> RunReport {
        let mut report = RunReport {
            run_id,
            outcome: RunOutcome::Failed,
            metrics: None,
            delta: None,
            decision: None,
            error: None,
            started_at,
            finished_at: Utc::now(),
        };

        let ctx = match driven {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(%run_id, error = %e, "Run failed; store untouched");
                report.error = Some(e.to_string());
                report.finished_at = Utc::now();
                return report;
            }
        };

        let finished = (|| -> Result<RunOutcome> {
            let validation = ctx.validation("orchestrator")?;
            let decision = ctx.decision("orchestrator")?;
            report.metrics = Some(validation.metrics.clone());
            report.delta = validation.delta.clone();
            report.decision = Some(decision.clone());

            if !decision.is_approved() {
                info!(%run_id, "Reviewer rejected; proposed change discarded");
                return Ok(RunOutcome::Discarded);
            }

            match &validation.delta {
                Some(delta) => {
                    let candidate = store.propose(delta)?;
                    store.commit(candidate)?;
                    info!(%run_id, %delta, "Approved delta committed");
                }
                None => {
                    info!(%run_id, "No delta proposed; store left unchanged");
                }
            }
            Ok(RunOutcome::Committed)
        })();

        match finished {
            Ok(outcome) => report.outcome = outcome,
            Err(e) => {
                error!(%run_id, error = %e, "Run failed at finalization; store untouched");
                report.outcome = RunOutcome::Failed;
                report.error = Some(e.to_string());
            }
        }
        report.finished_at = Utc::now();
        report
    }
}
