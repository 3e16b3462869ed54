//! Flush Engine: append-via-compose
//!
//! Converts a partition's pending lines into a durable write against a
//! store that has no append primitive. One flush cycle:
//!
//! ```text
//! drain → put part → stat daily ──exists──► compose(daily, part) → tmp
//!                        │                  copy tmp → daily
//!                        │                  remove tmp, remove part
//!                        └──absent───────► copy part → daily
//!                                           remove part
//! ```
//!
//! The daily object is only ever (over)written by a copy whose source
//! already holds the complete new content, so a failure at any earlier
//! step leaves it untouched; the drained lines are restored to the
//! buffer front and ride the next flush trigger. Cleanup failures
//! *after* the daily copy succeeded are logged and tolerated; the
//! leftover part/compose objects are orphans for an external sweep,
//! and restoring the lines at that point would duplicate them.
//!
//! Flushes for the same key are serialized through the buffer store's
//! per-key token; flushes for different keys run concurrently.

use crate::pipeline::buffer::BufferStore;
use crate::pipeline::router::PartitionKey;
use crate::store::ComposeStore;
use std::io::Error as IoError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error from one flush attempt. The variant names the protocol step
/// that failed; in every case the drained lines were restored.
#[derive(Debug)]
pub enum FlushError {
    /// Writing the part object failed
    Part(IoError),
    /// Probing for the daily object failed (other than NotFound)
    Probe(IoError),
    /// Compose or the copy into the daily object failed
    Merge(IoError),
    /// The pipeline driving the flush is gone (shutdown or crashed)
    Unavailable,
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushError::Part(e) => write!(f, "part write failed: {}", e),
            FlushError::Probe(e) => write!(f, "daily object probe failed: {}", e),
            FlushError::Merge(e) => write!(f, "merge into daily object failed: {}", e),
            FlushError::Unavailable => write!(f, "pipeline unavailable"),
        }
    }
}

impl std::error::Error for FlushError {}

/// Executes the append-via-compose protocol for one partition at a time
#[derive(Clone)]
pub struct FlushEngine {
    store: Arc<dyn ComposeStore>,
    buffers: Arc<BufferStore>,
    part_seq: Arc<AtomicU64>,
}

impl FlushEngine {
    pub fn new(store: Arc<dyn ComposeStore>, buffers: Arc<BufferStore>) -> Self {
        FlushEngine {
            store,
            buffers,
            part_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The shared buffer store this engine drains
    pub fn buffers(&self) -> &Arc<BufferStore> {
        &self.buffers
    }

    /// Flush the partition's pending lines. Returns the number of
    /// lines written, 0 for a no-op on an empty buffer.
    pub async fn flush(&self, key: &PartitionKey) -> Result<usize, FlushError> {
        self.buffers.clear_timer(key);

        let token = self.buffers.flush_token(key);
        let _guard = token.lock().await;

        let lines = self.buffers.drain(key);
        if lines.is_empty() {
            return Ok(0);
        }
        let count = lines.len();

        match self.merge(key, &lines).await {
            Ok(()) => {
                info!(partition = %key, lines = count, "flushed partition");
                Ok(count)
            }
            Err(e) => {
                error!(partition = %key, lines = count, error = %e, "flush failed, lines restored");
                self.buffers.restore(key, lines);
                Err(e)
            }
        }
    }

    async fn merge(&self, key: &PartitionKey, lines: &[String]) -> Result<(), FlushError> {
        let mut payload = lines.join("\n");
        payload.push('\n');

        let token = self.part_token();
        let part = key.part_object(&token);
        self.store
            .put(&part, payload.as_bytes())
            .await
            .map_err(FlushError::Part)?;

        let daily = key.daily_object();
        let exists = match self.store.stat(&daily).await {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(FlushError::Probe(e)),
        };

        if exists {
            // Daily content first, part content second: global append order
            let tmp = key.compose_object(&token);
            self.store
                .compose(&[daily.clone(), part.clone()], &tmp)
                .await
                .map_err(FlushError::Merge)?;
            self.store.copy(&tmp, &daily).await.map_err(FlushError::Merge)?;

            // The daily object now holds the merged content; cleanup
            // failures leave orphans but the flush has succeeded.
            if let Err(e) = self.store.remove(&tmp).await {
                warn!(object = %tmp, error = %e, "orphaned compose object");
            }
            if let Err(e) = self.store.remove(&part).await {
                warn!(object = %part, error = %e, "orphaned part object");
            }
        } else {
            self.store.copy(&part, &daily).await.map_err(FlushError::Merge)?;
            if let Err(e) = self.store.remove(&part).await {
                warn!(object = %part, error = %e, "orphaned part object");
            }
        }

        Ok(())
    }

    /// Unique per flush attempt: epoch millis plus a monotonic counter
    fn part_token(&self) -> String {
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64;
        let seq = self.part_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:06}", now_ms, seq)
    }
}
