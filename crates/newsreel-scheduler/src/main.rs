//! Scheduler binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsreel_queue::DispatchQueue;
use newsreel_scheduler::{Scheduler, SchedulerConfig};
use newsreel_store::FirestoreJobStore;

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting newsreel-scheduler");

    let config = SchedulerConfig::from_env();
    info!("Scheduler config: {:?}", config);

    let store = match FirestoreJobStore::from_env().await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match DispatchQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create dispatch queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize dispatch queue: {}", e);
        std::process::exit(1);
    }

    let poll_interval = config.poll_interval;
    let scheduler = Scheduler::new(store, Arc::new(queue), config);

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scheduler.run_pass().await {
                    Ok(report) => {
                        info!(
                            evaluated = report.evaluated,
                            dispatched = report.dispatched,
                            "Pass finished"
                        );
                    }
                    Err(e) => {
                        error!("Scheduling pass failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Scheduler stopped");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newsreel=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
