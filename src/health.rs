//! Health Introspection Endpoint
//!
//! Read-only TCP endpoint reporting, per partition, the count of lines
//! buffered and not yet flushed. A stuck or growing depth is the
//! operational symptom of sustained flush failure.

use crate::pipeline::PipelineHandle;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Serve buffer-depth snapshots on the given address until the process
/// exits. Every connection gets one JSON response.
pub async fn serve(addr: &str, handle: PipelineHandle) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, handle).await
}

/// Serve on an already-bound listener (lets tests pick port 0)
pub async fn serve_on(listener: TcpListener, handle: PipelineHandle) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "health endpoint listening");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = respond(stream, handle).await {
                        warn!(error = %e, "health check error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "health accept error");
            }
        }
    }
}

async fn respond(mut stream: TcpStream, handle: PipelineHandle) -> std::io::Result<()> {
    // Read the request; the content does not matter
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let depths = handle.depths().await;
    let total: usize = depths.iter().map(|(_, d)| d).sum();
    let body = json!({
        "partitions": depths
            .iter()
            .map(|(key, depth)| json!({
                "identity": key.identity,
                "day": key.day.to_string(),
                "pending": depth,
            }))
            .collect::<Vec<_>>(),
        "total_pending": total,
    })
    .to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
