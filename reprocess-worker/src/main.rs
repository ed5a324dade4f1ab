// ============================================================================
// Cache Reprocess Worker
// ============================================================================
//
// Consumes object store notifications for manifest files, validates every
// record id in them against the cache, and republishes the cached records
// to the outbound queue.
//
// Any fatal error ends the process with a non-zero exit; the supervisor
// restarts it and unfinished notifications are delivered again.
//
// ============================================================================

use anyhow::{Context, Result, anyhow};
use reprocess_config::Config;
use reprocess_error::ReprocessError;
use reprocess_shared::queue::{PayloadOffloader, RedisInboundQueue, RedisOutboundQueue};
use reprocess_shared::{
    ManifestDownloader, ObjectStoreFactory, Orchestrator, Pipeline, S3ObjectStoreFactory,
    connect_cache_proxy, health, telemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long the pools get to flush their last batches on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing first so configuration errors are logged
    telemetry::init_tracing();

    info!("=== Cache Reprocess Worker Starting ===");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration is incomplete");
            return Err(e).context("Failed to load configuration");
        }
    };
    config.log_summary();

    // Cache backend, one pooled connection per cache worker
    let cache = connect_cache_proxy(&config.cache, config.worker.cache_workers)
        .await
        .map_err(fatal)
        .context("Failed to connect to cache")?;

    // Queue transport. The inbound poll blocks its connection for up to the
    // poll timeout, so each queue opens a connection of its own.
    let inbound = RedisInboundQueue::connect(
        config.queue.url.expose(),
        config.in_queue_name.clone(),
        config.queue.consumer_group.clone(),
        config.queue.consumer_name.clone(),
    )
    .await
    .map_err(fatal)
    .context("Failed to open inbound queue")?;

    // Object storage: manifest downloads and oversize payloads
    let buckets: Arc<dyn ObjectStoreFactory> = Arc::new(S3ObjectStoreFactory);
    let message_bucket = buckets
        .create_object_store(&config.message_bucket_name)
        .await
        .context("Failed to open message bucket")?;

    let outbound =
        RedisOutboundQueue::connect(config.queue.url.expose(), config.out_queue_name.clone())
            .await
            .map_err(fatal)
            .context("Failed to open outbound queue")?
            .with_offloader(PayloadOffloader::new(
                message_bucket,
                config.message_bucket_name.clone(),
            ));

    let pipeline = Pipeline::start(&config.worker, cache.clone(), Arc::new(outbound));
    let (feeder, mut workers) = pipeline.into_parts();

    let orchestrator = Orchestrator::new(
        Arc::new(inbound),
        ManifestDownloader::new(buckets, config.download_dir.clone()),
        cache,
        feeder,
        config.poll_timeout,
    );

    if let Some(port) = config.health_port {
        tokio::spawn(async move {
            if let Err(e) = health::serve(port).await {
                error!(port = port, error = %e, "Health endpoint stopped");
            }
        });
    }

    info!("=== Cache Reprocess Worker Running ===");

    let outcome = tokio::select! {
        result = orchestrator.run() => {
            result.map_err(fatal).context("Orchestrator stopped")
        }
        result = workers.wait() => match result {
            Ok(()) => Err(anyhow!("Worker pools exited unexpectedly")),
            Err(e) => Err(fatal(e)).context("Worker pool failed"),
        },
        _ = shutdown_signal() => Ok(()),
    };

    if let Err(e) = outcome {
        error!(error = %format!("{e:#}"), "Fatal error, exiting");
        return Err(e);
    }

    // Closing the feeder lets both pools flush and stop
    drop(orchestrator);
    match tokio::time::timeout(SHUTDOWN_GRACE, workers.wait()).await {
        Ok(Ok(())) => info!("Worker pools drained"),
        Ok(Err(e)) => {
            return Err(fatal(e)).context("Worker pool failed during shutdown");
        }
        Err(_) => {
            warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Worker pools did not drain in time, aborting"
            );
            workers.shutdown().await;
        }
    }

    info!("=== Cache Reprocess Worker Stopped ===");
    Ok(())
}

/// Log an error with its category before it ends the process
fn fatal(e: ReprocessError) -> ReprocessError {
    e.log();
    e
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown..."),
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown..."),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
}
