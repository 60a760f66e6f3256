mod context;
mod execution;
mod history;
mod options;
mod state;
mod workflow_engine;

pub use context::{Workflow, WorkflowContext};
pub use history::{resolve_call, ActivityInvocation, ActivityOutcome, WorkflowInstance};
pub use options::{ActivityOptions, EngineOptions, DEFAULT_TASK_QUEUE};
pub use state::WorkflowState;
pub use workflow_engine::{Disposition, WorkflowEngine};
