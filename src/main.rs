use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_sink::config::{SinkConfig, StoreBackend};
use telemetry_sink::pipeline::spawn_pipeline;
use telemetry_sink::store::{ComposeStore, InMemoryComposeStore, LocalFsComposeStore};
use telemetry_sink::{broker, health};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SinkConfig::load()?;
    let store = build_store(&config)?;

    let (handle, pipeline_task) = spawn_pipeline(store, config.batch.clone());

    let health_handle = handle.clone();
    let health_addr = config.health_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = health::serve(&health_addr, health_handle).await {
            error!(error = %err, "health endpoint failed");
        }
    });

    #[cfg(feature = "mqtt")]
    let (mut feed, _source_task) = broker::mqtt::spawn_mqtt_source(&config.broker).await?;

    #[cfg(not(feature = "mqtt"))]
    let (_publisher, mut feed) = {
        warn!(
            host = %config.broker.host,
            "built without the `mqtt` feature; no broker source will connect"
        );
        broker::feed(64)
    };

    info!(
        batch_max = config.batch.batch_max,
        health_addr = %config.health_addr,
        "telemetry sink running"
    );

    loop {
        tokio::select! {
            message = feed.recv() => match message {
                Some(message) => handle.ingest(message),
                None => {
                    warn!("broker feed closed, shutting down");
                    break;
                }
            },
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    handle.shutdown().await;
    pipeline_task.await?;
    info!("telemetry sink stopped");
    Ok(())
}

fn build_store(config: &SinkConfig) -> Result<Arc<dyn ComposeStore>, Box<dyn std::error::Error>> {
    match config.store.backend {
        StoreBackend::InMemory => {
            warn!("using in-memory store; data will not survive restarts");
            Ok(Arc::new(InMemoryComposeStore::new()))
        }
        StoreBackend::LocalFs => {
            let path = config
                .store
                .local_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("./telemetry-data"));
            info!(path = %path.display(), "using local filesystem store");
            Ok(Arc::new(LocalFsComposeStore::new(path)))
        }
        StoreBackend::S3 => {
            #[cfg(feature = "s3")]
            {
                let s3 = config
                    .store
                    .s3
                    .as_ref()
                    .ok_or("s3 backend selected but [store.s3] is missing")?;
                info!(bucket = %s3.bucket, "using s3 store");
                Ok(Arc::new(telemetry_sink::store::CloudComposeStore::new(s3)?))
            }
            #[cfg(not(feature = "s3"))]
            {
                Err("s3 backend requires building with the `s3` feature".into())
            }
        }
    }
}
