//! The external collaborator invoked by the task loop (spec.md §4.6 step 6: "Invoke
//! `Executor(task)` under a deadline. The Executor is the external collaborator.").
use fabric_context::Context;
use fabric_queue::Task;

use crate::error::ExecutorError;

/// Whatever the Executor produces on success; the fabric does not interpret it further (spec.md
/// §4.6 step 7: "write result sink (out of core scope)").
#[derive(Clone, Debug)]
pub struct ExecutorOutcome {
    pub result: serde_json::Value,
}

/// The pluggable unit of actual work: an LLM call, a build step, whatever `task.payload.request`
/// asks for. The runtime only knows how to schedule, retry, and rate-limit calls to it.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, ctx: &Context, task: &Task) -> Result<ExecutorOutcome, ExecutorError>;
}
