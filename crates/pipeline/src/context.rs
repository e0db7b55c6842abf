use common::{
    ApprovalDecision, DataSummary, Error, Result, SignalSummary, TradeReport, ValidationOutcome,
};

/// The accumulating payload chained through the pipeline.
///
/// One named slot per stage. A stage may only fill its own slot, once;
/// earlier slots are read-only after being written. Reading a slot that
/// has not been filled yet fails with a `StageError` naming the requesting
/// stage and the missing field, which is how a mis-ordered pipeline
/// surfaces immediately instead of producing partial results.
#[derive(Debug, Default)]
pub struct StageContext {
    data: Option<DataSummary>,
    signals: Option<SignalSummary>,
    trades: Option<TradeReport>,
    validation: Option<ValidationOutcome>,
    decision: Option<ApprovalDecision>,
}

impl StageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_data(&mut self, summary: DataSummary) -> Result<()> {
        put(&mut self.data, summary, "data")
    }

    pub fn put_signals(&mut self, summary: SignalSummary) -> Result<()> {
        put(&mut self.signals, summary, "indicator")
    }

    pub fn put_trades(&mut self, report: TradeReport) -> Result<()> {
        put(&mut self.trades, report, "trade")
    }

    pub fn put_validation(&mut self, outcome: ValidationOutcome) -> Result<()> {
        put(&mut self.validation, outcome, "validate_optimize")
    }

    pub fn put_decision(&mut self, decision: ApprovalDecision) -> Result<()> {
        put(&mut self.decision, decision, "approval")
    }

    /// The data slot, or a StageError naming the requesting stage.
    pub fn data(&self, requester: &'static str) -> Result<&DataSummary> {
        require(self.data.as_ref(), requester, "data")
    }

    pub fn signals(&self, requester: &'static str) -> Result<&SignalSummary> {
        require(self.signals.as_ref(), requester, "signals")
    }

    pub fn trades(&self, requester: &'static str) -> Result<&TradeReport> {
        require(self.trades.as_ref(), requester, "trades")
    }

    pub fn validation(&self, requester: &'static str) -> Result<&ValidationOutcome> {
        require(self.validation.as_ref(), requester, "validation")
    }

    pub fn decision(&self, requester: &'static str) -> Result<&ApprovalDecision> {
        require(self.decision.as_ref(), requester, "decision")
    }
}

fn put<T>(slot: &mut Option<T>, value: T, owner: &'static str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::stage(owner, "slot already written; slots are write-once"));
    }
    *slot = Some(value);
    Ok(())
}

fn require<'a, T>(slot: Option<&'a T>, requester: &'static str, field: &str) -> Result<&'a T> {
    slot.ok_or_else(|| Error::stage(requester, format!("missing upstream slot '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> SignalSummary {
        SignalSummary {
            gauss_up_count: 1,
            adx_above_threshold: 0.5,
            potential_entries: 2,
            commentary: String::new(),
        }
    }

    #[test]
    fn slots_are_write_once() {
        let mut ctx = StageContext::new();
        ctx.put_signals(summary()).unwrap();
        let err = ctx.put_signals(summary()).unwrap_err();
        assert!(matches!(err, Error::Stage { stage: "indicator", .. }));
    }

    #[test]
    fn missing_slot_names_the_requester() {
        let ctx = StageContext::new();
        match ctx.trades("validate_optimize") {
            Err(Error::Stage { stage, reason }) => {
                assert_eq!(stage, "validate_optimize");
                assert!(reason.contains("trades"));
            }
            other => panic!("expected a stage error, got {other:?}"),
        }
    }

    #[test]
    fn filled_slot_reads_back() {
        let mut ctx = StageContext::new();
        ctx.put_signals(summary()).unwrap();
        assert_eq!(ctx.signals("trade").unwrap().potential_entries, 2);
    }
}
