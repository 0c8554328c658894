//! Cron registration of the periodic jobs

use shorthub_common::{
    jobs::{JobKind, JobRunner},
    AppServices,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

/// Register every job on its configured schedule
pub async fn build(services: &AppServices) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    for kind in JobKind::ALL {
        let schedule = kind.schedule(&services.config.jobs);
        let job = cron_job(kind, schedule, services.jobs.clone())?;
        scheduler.add(job).await?;
        info!(job = %kind, schedule = %schedule, "Job scheduled");
    }

    Ok(scheduler)
}

fn cron_job(kind: JobKind, schedule: &str, runner: Arc<JobRunner>) -> anyhow::Result<Job> {
    // A run still in progress makes the next tick a no-op
    let running = Arc::new(Mutex::new(()));

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let runner = runner.clone();
        let running = running.clone();
        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                warn!(job = %kind, "Previous run still in progress, skipping tick");
                return;
            };
            // Failures are logged and counted by the runner
            let _ = runner.run(kind).await;
        })
    })
    .map_err(|e| anyhow::anyhow!("invalid schedule {:?} for {}: {}", schedule, kind, e))?;

    Ok(job)
}
