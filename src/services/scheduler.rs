use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::db::repositories::{CacheRepository, PatCommandRepository};
use crate::state::SharedState;

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub cache_entries: u64,
    pub throttle_entries: usize,
    pub expired_tokens: u64,
}

/// Drops expired CAPTCHA records, revocation markers, idle throttle
/// counters and personal access tokens past their expiry.
pub async fn cleanup(state: &SharedState) -> Result<CleanupReport> {
    let cache_entries = state.repos.cache.purge_expired().await?;
    let throttle_entries = state.throttle.purge();
    let expired_tokens = state.repos.pats.delete_expired(Utc::now()).await?;

    Ok(CleanupReport {
        cache_entries,
        throttle_entries,
        expired_tokens,
    })
}

pub struct Scheduler {
    state: Arc<SharedState>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(state: Arc<SharedState>, config: SchedulerConfig) -> Self {
        Self {
            state,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        let mut sched = JobScheduler::new().await?;

        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let job = Job::new_async(self.config.cleanup_cron.as_str(), move |_uuid, _lock| {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_cleanup_job(&state).await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Cleanup scheduled with cron: {}", self.config.cleanup_cron);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn run_once(&self) -> Result<CleanupReport> {
        info!("Running manual cleanup...");
        cleanup(&self.state).await
    }
}

async fn run_cleanup_job(state: &SharedState) {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "cleanup", "Starting scheduled cleanup");

    match cleanup(state).await {
        Ok(report) => info!(
            event = "job_finished",
            job_name = "cleanup",
            cache_entries = report.cache_entries,
            throttle_entries = report.throttle_entries,
            expired_tokens = report.expired_tokens,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Scheduled cleanup finished"
        ),
        Err(e) => {
            error!(event = "job_failed", job_name = "cleanup", error = %e, "Scheduled cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_disabled_scheduler_still_cleans_on_demand() {
        let mut config = Config::default();
        config.general.database_url = "sqlite::memory:".to_string();
        config.security.argon2_memory_cost_kib = 1024;
        config.security.argon2_time_cost = 1;
        let state = Arc::new(SharedState::new(config).await.unwrap());

        let scheduler = Scheduler::new(
            state,
            SchedulerConfig {
                enabled: false,
                ..SchedulerConfig::default()
            },
        );

        scheduler.start().await.unwrap();
        assert!(!scheduler.is_running().await);

        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report, CleanupReport::default());
    }
}
