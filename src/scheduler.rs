use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::digest;
use crate::llm::TextGenerator;
use crate::whatsapp::MessageSender;

/// Wrapper around tokio-cron-scheduler for background tasks. Runs on
/// the tokio runtime alongside the webhook server and shares nothing
/// with it beyond read-only configuration.
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Add a job firing once per day at the given local wall-clock
    /// time. The cron shape rules out duplicate fires within a day.
    pub async fn add_daily_job<F>(&self, hour: u32, minute: u32, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            + Send
            + Sync
            + 'static,
    {
        let cron_expr = daily_cron_expr(hour, minute);
        let job_name = name.to_string();
        let job = Job::new_async_tz(cron_expr.as_str(), chrono::Local, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                info!("Running scheduled task: {}", name);
                fut.await;
            })
        })
        .with_context(|| format!("Failed to create daily job: {}", name))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled task '{}' daily at {:02}:{:02}", name, hour, minute);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }
}

fn daily_cron_expr(hour: u32, minute: u32) -> String {
    format!("0 {} {} * * *", minute, hour)
}

/// Register the daily digest. Without a target group the job is
/// skipped entirely rather than firing into nowhere.
pub async fn schedule_daily_digest(
    scheduler: &Scheduler,
    config: Arc<Config>,
    generator: Arc<dyn TextGenerator>,
    sender: Arc<dyn MessageSender>,
) -> Result<()> {
    let Some(group_jid) = config.digest.group_jid.clone() else {
        warn!("GROUP_JID not set; daily digest disabled");
        return Ok(());
    };

    let (hour, minute) = (config.digest.hour, config.digest.minute);
    scheduler
        .add_daily_job(hour, minute, "daily-digest", move || {
            let config = config.clone();
            let generator = generator.clone();
            let sender = sender.clone();
            let group_jid = group_jid.clone();
            Box::pin(async move {
                // A failed run must not take the schedule down with it.
                if let Err(e) =
                    digest::run(&config.digest, &group_jid, generator.as_ref(), sender.as_ref())
                        .await
                {
                    error!("Daily digest failed: {:#}", e);
                }
            })
        })
        .await
}
