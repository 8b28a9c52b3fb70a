use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_config::Config;
use relay_db::PgMessageStore;
use relay_server_shared::drift::TracingDriftSink;
use relay_server_shared::kafka::{EventPublisher, KafkaEventPublisher};
use relay_server_shared::messaging_service::{DualWriteCoordinator, MessagingServiceContext};
use relay_server_shared::routes::create_router;
use relay_types::UlidGenerator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    relay_server_shared::init_tracing(&config.logging)?;

    info!("=== Messaging Service Starting ===");
    info!("Port: {}", config.port);

    // Initialize database
    info!(database = %config.db.redacted_target(), "Connecting to database...");
    let db_pool = relay_db::create_pool(&config.db).await?;
    info!("Connected to database");

    info!("Applying database migrations...");
    relay_db::run_migrations(&db_pool).await?;
    info!("Database migrations applied successfully");

    // Initialize Kafka publisher
    let publisher = Arc::new(KafkaEventPublisher::new(&config.kafka));
    publisher
        .connect()
        .await
        .context("Failed to create Kafka producer")?;

    let coordinator = DualWriteCoordinator::new(
        Arc::new(UlidGenerator::new()),
        Arc::new(PgMessageStore::new(db_pool.clone())),
        publisher.clone(),
        Arc::new(TracingDriftSink::new(config.logging.log_payloads)),
    );
    let context = Arc::new(MessagingServiceContext::new(coordinator.clone()));
    let app = create_router(context);

    // Start server
    info!("Messaging Service listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(relay_server_shared::shutdown_signal())
        .await
        .context("Failed to start server")?;

    // Stop accepting, drain, disconnect, close
    info!("HTTP server stopped; draining in-flight operations");
    let drained = coordinator
        .drain(Duration::from_secs(config.shutdown_drain_timeout_secs))
        .await;
    if !drained {
        tracing::warn!(
            remaining = coordinator.in_flight(),
            "Shutting down with operations still in flight"
        );
    }

    if let Err(e) = publisher.disconnect().await {
        tracing::error!(error = %e, "Kafka publisher did not disconnect cleanly");
    }
    db_pool.close().await;

    info!("=== Messaging Service Stopped ===");
    Ok(())
}
