pub mod context;
pub mod gate;
pub mod orchestrator;
pub mod stage;
pub mod stages;
pub mod validate;

pub use context::StageContext;
pub use gate::ApprovalGate;
pub use orchestrator::{PipelineOrchestrator, RunState};
pub use stage::PipelineStage;
pub use stages::{ApprovalStage, DataStage, IndicatorStage, TradeStage};
pub use validate::ValidateOptimizeStage;
