use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use feedwatch::{Config, LogNotifier, Scheduler};

/// How long running polls may take to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedwatch::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        feedwatch::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("feedwatch starting");
    info!(
        "Store: {}, max {} fetch(es)/minute, {} worker(s)",
        config.store.directory,
        config.scheduler.max_fetches_per_minute,
        config.scheduler.worker_pool_size
    );

    let scheduler = match Scheduler::from_config(&config, Arc::new(LogNotifier)) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Failed to initialize scheduler: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = scheduler.start().await {
        error!("Failed to load subscriptions: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.shutdown())
        .await
        .is_err()
    {
        error!(
            "Polls still running after {:?}, exiting anyway",
            SHUTDOWN_GRACE
        );
    }
}
