use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use eneo::audit::AuditLogger;
use eneo::core::config::AppConfig;
use eneo::core::shared::state::AppState;
use eneo::core::shared::{create_conn, run_migrations};
use eneo::jobs::{JobQueue, Scheduler, Worker};
use eneo::main_module::{cancel_on_signal, run_axum_server};
use eneo::security::JwtManager;
use eneo::sharepoint::{subscription_manager, GraphClient};
use eneo::RunMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let mode = match std::env::args().nth(1) {
        Some(cmd) => cmd.parse::<RunMode>().map_err(|e| anyhow!(e))?,
        None => RunMode::All,
    };
    info!("Starting eneo ({mode:?})");

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let pool = create_conn(&config.database.url, config.database.max_connections)
        .context("Failed to connect to database")?;
    run_migrations(&pool).map_err(|e| anyhow!("Failed to run migrations: {e}"))?;
    info!("Database ready");

    let cache = match redis::Client::open(config.cache.url.as_str()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Invalid Redis URL, async processing disabled: {e}");
            None
        }
    };

    let job_queue = match &cache {
        Some(client) => {
            let queue = JobQueue::new(Arc::clone(client), &config.jobs.queue_name);
            match queue.ping().await {
                Ok(()) => {
                    info!("Job queue connected on {}", queue.queue_key());
                    Some(queue)
                }
                Err(e) => {
                    warn!("Redis unreachable, jobs will run inline: {e}");
                    None
                }
            }
        }
        None => None,
    };

    let jwt = Arc::new(JwtManager::from_settings(&config.jwt)?);
    let audit = Arc::new(AuditLogger::new(
        pool.clone(),
        job_queue.clone(),
        config.audit.mode,
    ));
    let graph = Arc::new(GraphClient::new(config.graph.clone()));
    if !graph.is_configured() {
        warn!("Microsoft Graph credentials not set, SharePoint subscriptions are disabled");
    }

    let app_state = Arc::new(AppState {
        config: config.clone(),
        conn: pool.clone(),
        cache,
        jwt,
        audit,
        job_queue,
        graph,
    });

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let mut background = JoinSet::new();
    if mode.runs_jobs() {
        let subscriptions = Arc::new(subscription_manager(&app_state));

        match &app_state.job_queue {
            Some(queue) => {
                let worker = Worker::new(
                    queue.clone(),
                    Arc::clone(&app_state.audit),
                    Arc::clone(&subscriptions),
                );
                let token = shutdown.clone();
                background.spawn(async move { worker.run(token).await });
            }
            None => warn!("No job queue available, worker not started"),
        }

        let scheduler = Scheduler::new(
            subscriptions,
            pool,
            config.audit.default_retention_days,
            &config.jobs,
        )?;
        let token = shutdown.clone();
        background.spawn(async move { scheduler.run(token).await });
    }

    if mode.serves_http() {
        let served = run_axum_server(Arc::clone(&app_state), shutdown.clone()).await;
        shutdown.cancel();
        if let Err(e) = served {
            error!("HTTP server failed: {e}");
            return Err(e.into());
        }
    } else {
        shutdown.cancelled().await;
    }

    while let Some(joined) = background.join_next().await {
        if let Err(e) = joined {
            error!("Background task panicked: {e}");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
