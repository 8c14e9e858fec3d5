// =============================================================================
// WorkflowScheduler — cron-driven workflow execution
// =============================================================================
//
// Single-process cron evaluator backed by `tokio_cron_scheduler::JobScheduler`.
// Each job is tagged with the workflow id in `scheduled` so at-most-one
// scheduled run per workflow is enforced (§4.6).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::repository::Repository;
use crate::workflow::engine::WorkflowEngine;

pub struct WorkflowScheduler {
    scheduler: JobScheduler,
    scheduled: Mutex<HashMap<Uuid, Uuid>>,
    engine: Arc<WorkflowEngine>,
    repo: Arc<dyn Repository>,
}

impl WorkflowScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, repo: Arc<dyn Repository>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        scheduler.start().await?;
        Ok(Self { scheduler, scheduled: Mutex::new(HashMap::new()), engine, repo })
    }

    /// Registers a cron trigger for `workflow_id`. Replaces any existing
    /// schedule for the same workflow (at-most-one run per workflow).
    pub async fn schedule_workflow(
        &self,
        workflow_id: Uuid,
        cron_expr: &str,
        context: Value,
    ) -> anyhow::Result<()> {
        self.cancel_workflow(workflow_id).await;

        let engine = self.engine.clone();
        let repo = self.repo.clone();
        let job = Job::new_async(cron_expr, move |_uuid, _locked| {
            let engine = engine.clone();
            let repo = repo.clone();
            let context = context.clone();
            Box::pin(async move {
                match repo.get_workflow(workflow_id).await {
                    Some(workflow) if workflow.is_active => {
                        info!(%workflow_id, "scheduled workflow firing");
                        engine.execute(&workflow, context).await;
                    }
                    Some(_) => warn!(%workflow_id, "scheduled workflow is inactive, skipping"),
                    None => error!(%workflow_id, "scheduled workflow no longer exists"),
                }
            })
        })?;

        let job_id = job.guid();
        self.scheduler.add(job).await?;
        self.scheduled.lock().insert(workflow_id, job_id);
        Ok(())
    }

    pub async fn cancel_workflow(&self, workflow_id: Uuid) {
        let job_id = self.scheduled.lock().remove(&workflow_id);
        if let Some(job_id) = job_id {
            if let Err(e) = self.scheduler.remove(&job_id).await {
                warn!(%workflow_id, error = %e, "failed to remove scheduled job");
            }
        }
    }
}
