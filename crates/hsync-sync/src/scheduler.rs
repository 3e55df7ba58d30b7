use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::pipeline::SyncPipeline;

/// Scheduler that runs the pipeline on `cron` (six fields, seconds first).
/// A tick that arrives while a run is still going is skipped.
pub async fn build_scheduler(pipeline: Arc<SyncPipeline>, cron: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            match pipeline.try_run_once().await {
                None => warn!("previous sync run still in progress; skipping tick"),
                Some(Ok(summary)) => info!(
                    run_id = %summary.run_id,
                    failed_containers = summary.schema_failures(),
                    failed_dates = summary.date_failures(),
                    "scheduled sync run complete"
                ),
                Some(Err(err)) => error!(error = %err, "scheduled sync run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}
