use std::sync::Arc;

use crate::config::Config;
use crate::services::Scheduler;
use crate::state::SharedState;

pub async fn cmd_cleanup(config: Config) -> anyhow::Result<()> {
    let scheduler_config = config.scheduler.clone();
    let state = Arc::new(SharedState::new(config).await?);
    let scheduler = Scheduler::new(Arc::clone(&state), scheduler_config);

    let report = scheduler.run_once().await?;
    state.audit.flush().await;

    println!("Cleanup finished:");
    println!("  Expired cache entries:   {}", report.cache_entries);
    println!("  Idle throttle counters:  {}", report.throttle_entries);
    println!("  Expired access tokens:   {}", report.expired_tokens);

    Ok(())
}
