//! # Workflow Gateway
//!
//! An authenticated, rate-limited HTTP gateway in front of a durable,
//! replay-safe workflow engine.
//!
//! ## Features
//!
//! - API key authentication and a token-bucket rate limit on submission
//! - Deterministic orchestration functions replayed from recorded history
//! - Activities executed by a pool of workers pulling from a task queue
//! - Per-activity timeouts and retry policies with exponential backoff
//! - At-least-once task delivery with visibility timeouts
//! - Workflow state and history persisted in SQLite, recovered on restart
//! - Cancellation and inspection of running instances
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workflow_gateway::activity::ActivityExecutor;
//! use workflow_gateway::greeting::{GreetingActivity, GreetingWorkflow};
//! use workflow_gateway::storage::implementations::MemoryStorage;
//! use workflow_gateway::{MemoryTaskQueue, WorkerPool, WorkflowEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = Arc::new(MemoryTaskQueue::new());
//!     let engine = WorkflowEngine::new(Arc::new(MemoryStorage::new()), queue.clone())
//!         .register_workflow(GreetingWorkflow::default());
//!     let workers = WorkerPool::new(
//!         queue,
//!         ActivityExecutor::new().register(GreetingActivity),
//!         engine.clone(),
//!     )
//!     .start();
//!
//!     let run_id = engine
//!         .start_workflow("greeting-1".into(), "greeting", "BAPE".into())
//!         .await
//!         .unwrap();
//!     let instance = engine
//!         .wait_for_completion("greeting-1", Duration::from_millis(50))
//!         .await
//!         .unwrap();
//!     println!("{} -> {:?}", run_id, instance.output);
//!
//!     workers.shutdown().await;
//! }
//! ```
//!
//! ## License
//!
//! Licensed under the MIT license. See the [LICENSE](LICENSE) file for details.

pub mod activity;
pub mod api;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod greeting;
pub mod queue;
pub mod storage;
pub mod worker;

pub use activity::{Activity, ActivityContext, ActivityExecutor, RetryPolicy};
pub use config::GatewayConfig;
pub use dispatcher::{WorkflowDispatcher, WorkflowHandle};
pub use engine::{
    ActivityOptions, ActivityOutcome, Workflow, WorkflowContext, WorkflowEngine, WorkflowInstance,
    WorkflowState,
};
pub use error::{ActivityError, AdmissionError, BoxError, EngineError, WorkflowError};
pub use gateway::AdmissionGateway;
pub use queue::{MemoryTaskQueue, TaskQueue};
pub use storage::WorkflowStorage;
pub use worker::{WorkerOptions, WorkerPool};
