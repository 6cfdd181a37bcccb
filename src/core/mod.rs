//! 核心编排层：会话状态、阶段输出合并、计划校验、阶段图与守卫、主控循环、运行监管、并发调度

pub mod coordinator;
pub mod error;
pub mod graph;
pub mod guards;
pub mod plan_check;
pub mod run_supervisor;
pub mod state;
pub mod task_scheduler;
pub mod update;

pub use coordinator::{Coordinator, RunOutcome, RunStatus};
pub use error::PipelineError;
pub use graph::StageId;
pub use guards::{Awaiting, Transition};
pub use plan_check::{validate_plan, PlanIssue, PlanValidationError};
pub use run_supervisor::RunSupervisor;
pub use state::{
    DesignSystemOptions, Flow, FontOption, GenerateRequest, GeneratedScreen, PlannedScreen,
    Question, ScreenId, SelectedDesignSystem, SessionState, Turn, VibeOption, AUTO_VIBE_ID,
};
pub use task_scheduler::TaskScheduler;
pub use update::{StageUpdate, SynthesizedScreen};
