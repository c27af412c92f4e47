// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Dukapo Background Worker
//!
//! Runs the daily subscription expiry pass:
//! - 7/3/1-day expiry warnings (deduplicated per tenant and threshold)
//! - expired-tenant transitions and branch entitlement deactivation
//! - notification queueing for the delivery collaborators
//!
//! Auto-renewal charges are the gateway's job (its recurring-charge
//! webhook lands on the API); this process only reconciles state.

mod expiry;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use dukapo_billing::NotificationQueue;
use dukapo_shared::Config;

async fn create_db_pool(database_url: &str) -> anyhow::Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Dukapo Worker");

    let config = Config::from_env()?;
    let pool = create_db_pool(&config.database_url).await?;
    dukapo_shared::run_migrations(&pool).await?;

    // Catch-up: a missed day runs now, and a second replica loses the
    // day-claim harmlessly.
    run_pass(&pool, &config).await;

    let scheduler = JobScheduler::new().await?;

    // Job 1: daily expiry pass at the configured HH:MM UTC
    let cron = config.scheduler_cron()?;
    let pass_pool = pool.clone();
    let pass_config = config.clone();
    scheduler
        .add(Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pool = pass_pool.clone();
            let config = pass_config.clone();
            Box::pin(async move {
                run_pass(&pool, &config).await;
            })
        })?)
        .await?;
    info!(
        daily_time = %config.scheduler_daily_time,
        "Scheduled: subscription expiry pass"
    );

    // Job 2: heartbeat (hourly)
    scheduler
        .add(Job::new_async("0 0 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: heartbeat (hourly)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    // Keep the main task running; jobs run in background tasks.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

async fn run_pass(pool: &sqlx::PgPool, config: &Config) {
    info!("Running subscription expiry pass");
    let notifications = NotificationQueue::new(pool.clone());
    match expiry::run_daily_pass(pool, &notifications, config.grace_period_days).await {
        Ok(Some(outcome)) => info!(
            warnings_sent = outcome.warnings_sent,
            tenants_expired = outcome.tenants_expired,
            "Expiry pass finished"
        ),
        Ok(None) => {}
        Err(e) => error!(error = %e, "Expiry pass failed"),
    }
}
