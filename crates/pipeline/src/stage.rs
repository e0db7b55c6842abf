use async_trait::async_trait;

use common::{ConfigSnapshot, Result};

use crate::context::StageContext;

/// The uniform unit of work in the pipeline.
///
/// A stage is a pure function of (config snapshot, context) → context′.
/// External calls — data loads, simulation, the parameter search, the
/// human prompt — are injected capabilities, so the stage itself carries
/// no hidden state. The snapshot is borrowed for the call only; a stage
/// cannot retain a handle to the store.
///
/// A stage that cannot produce valid output fails with a `StageError`
/// carrying its name; the orchestrator treats that as fatal for the run.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, config: &ConfigSnapshot, ctx: StageContext) -> Result<StageContext>;
}
