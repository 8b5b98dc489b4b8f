//! Dependency-aware task scheduler
//!
//! Single-threaded cooperative execution: each task is awaited to completion
//! before the next is dequeued. Passes run over an explicit worklist; a task
//! whose parent ended FAILED or CANCELLED is cancelled and never dequeued
//! again, and a pass without progress ends the run.

use crate::agents::AgentRegistry;
use crate::audit::AuditRecorder;
use crate::error::OrchestrationError;
use crate::models::{AgentResults, RequestContext, Task, TaskError, TaskStatus};
use crate::Result;
use serde_json::json;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "scheduler";

/// Outcome of one `execute_detailed` call
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub results: AgentResults,
    pub passes: usize,
}

enum Readiness {
    Ready,
    Waiting,
    Blocked(String),
}

/// Executes a request's task tree against registered agents
pub struct Scheduler {
    audit: Arc<AuditRecorder>,
}

impl Scheduler {
    pub fn new(audit: Arc<AuditRecorder>) -> Self {
        Self { audit }
    }

    /// Run every pending task and return completed results by agent type.
    /// Failed or skipped tasks are absent from the mapping.
    pub async fn execute(
        &self,
        tasks: &mut [Task],
        registry: &AgentRegistry,
        context: &RequestContext,
    ) -> Result<AgentResults> {
        Ok(self.execute_detailed(tasks, registry, context).await?.results)
    }

    pub async fn execute_detailed(
        &self,
        tasks: &mut [Task],
        registry: &AgentRegistry,
        context: &RequestContext,
    ) -> Result<ExecutionOutcome> {
        if let Some(foreign) = tasks.iter().find(|t| t.request_id != context.request_id) {
            return Err(OrchestrationError::ValidationError(format!(
                "task {} belongs to request {}, not {}",
                foreign.task_id, foreign.request_id, context.request_id
            )));
        }

        let index: HashMap<Uuid, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.task_id, i))
            .collect();

        let mut pending: Vec<usize> = (0..tasks.len())
            .filter(|&i| tasks[i].status == TaskStatus::Pending)
            .collect();

        let mut outcome = ExecutionOutcome::default();

        while !pending.is_empty() {
            outcome.passes += 1;

            // Stable: ties keep insertion order
            pending.sort_by_key(|&i| Reverse(tasks[i].priority));

            debug!(
                request_id = %context.request_id,
                pass = outcome.passes,
                pending = pending.len(),
                "Starting scheduling pass"
            );

            let mut deferred = Vec::new();
            let mut progressed = false;

            for i in pending {
                match readiness(tasks, &index, i) {
                    Readiness::Ready => {
                        self.run_task(&mut tasks[i], registry, context, &mut outcome.results)
                            .await?;
                        progressed = true;
                    }
                    Readiness::Waiting => {
                        debug!(task_id = %tasks[i].task_id, "Deferring task until parent completes");
                        deferred.push(i);
                    }
                    Readiness::Blocked(reason) => {
                        self.skip_task(&mut tasks[i], context, reason);
                        progressed = true;
                    }
                }
            }

            if !progressed {
                // Every remaining task waits on a parent that can never finish
                for i in deferred {
                    self.skip_task(
                        &mut tasks[i],
                        context,
                        "parent task can never complete".to_string(),
                    );
                }
                break;
            }

            pending = deferred;
        }

        info!(
            request_id = %context.request_id,
            passes = outcome.passes,
            completed = outcome.results.len(),
            total = tasks.len(),
            "Task execution finished"
        );

        Ok(outcome)
    }

    async fn run_task(
        &self,
        task: &mut Task,
        registry: &AgentRegistry,
        context: &RequestContext,
        results: &mut AgentResults,
    ) -> Result<()> {
        task.start();

        info!(
            request_id = %context.request_id,
            task_id = %task.task_id,
            agent_type = %task.agent_type,
            priority = ?task.priority,
            "Executing task"
        );

        let agent = match registry.get(task.agent_type) {
            Ok(agent) => agent,
            Err(e) => {
                task.fail(TaskError::from(&e));
                return Err(e);
            }
        };

        match agent.process(task, context).await {
            Ok(result) => {
                results.insert(task.agent_type, result.clone());
                task.complete(result);
            }
            Err(e) => {
                warn!(
                    task_id = %task.task_id,
                    agent_type = %task.agent_type,
                    error = %e,
                    "Task failed"
                );
                task.fail(TaskError::from(&e));
                let entry = self.audit.record(
                    "TASK_FAILED",
                    COMPONENT,
                    context,
                    json!({
                        "task_id": task.task_id,
                        "agent_type": task.agent_type,
                        "error": e.to_string(),
                    }),
                );
                task.audit_trail.push(entry);
            }
        }

        Ok(())
    }

    fn skip_task(&self, task: &mut Task, context: &RequestContext, reason: String) {
        warn!(
            task_id = %task.task_id,
            agent_type = %task.agent_type,
            reason = %reason,
            "Task permanently blocked, skipping"
        );

        let entry = self.audit.record(
            "TASK_SKIPPED",
            COMPONENT,
            context,
            json!({
                "task_id": task.task_id,
                "agent_type": task.agent_type,
                "parent_task_id": task.parent_task_id,
                "reason": reason,
            }),
        );
        task.audit_trail.push(entry);
        task.cancel(reason);
    }
}

fn readiness(tasks: &[Task], index: &HashMap<Uuid, usize>, i: usize) -> Readiness {
    let Some(parent_id) = tasks[i].parent_task_id else {
        return Readiness::Ready;
    };

    let Some(&parent) = index.get(&parent_id) else {
        return Readiness::Blocked(format!("parent task {} is not part of this request", parent_id));
    };

    match tasks[parent].status {
        TaskStatus::Completed => Readiness::Ready,
        TaskStatus::Failed | TaskStatus::Cancelled => Readiness::Blocked(format!(
            "parent task {} ended {:?}",
            parent_id, tasks[parent].status
        )),
        TaskStatus::Pending | TaskStatus::InProgress => Readiness::Waiting,
    }
}
