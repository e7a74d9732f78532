//! Bulsho sync service entry point.
//!
//! Wires the relation stores, the optimistic reconciler and the change-feed
//! orchestrator, optionally opens one question thread, then follows the
//! realtime feed until shutdown.

use bulsho::{AppError, Dependencies, Settings};
use dotenv::dotenv;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("bulsho=info,bulsho_sync=info,bulsho_repository=info")
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();

        info!(
            service_name = "bulsho",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();

        info!(
            service_name = "bulsho",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    init_tracing();

    info!("Starting Bulsho sync service");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    let deps = match Dependencies::new(&settings).await {
        Ok(deps) => {
            info!(backend = ?settings.backend, "Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    if let Some(question_id) = settings.question_id {
        if let Err(e) = deps.load_question(question_id).await {
            error!(error = %e, %question_id, "Failed to load question");
            return Err(e);
        }
    }

    match deps.orchestrator.run().await {
        Ok(()) => {
            info!("Sync service stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Sync service failed");
            Err(e.into())
        }
    }
}
