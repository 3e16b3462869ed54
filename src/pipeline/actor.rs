//! Pipeline Actor
//!
//! One task owns every ingest and scheduling decision: decode →
//! validate → route → buffer → evaluate. Flush I/O runs in spawned
//! tasks so slow store calls never stall ingestion; the buffer store's
//! per-key token keeps same-key flushes strictly serialized while
//! different keys proceed concurrently.
//!
//! Timers are sleep tasks that post a sequence-numbered `FlushDue`
//! back to the mailbox. The buffer store validates the sequence, so a
//! timer cleared by an earlier flush can never double-fire.

use crate::broker::InboundMessage;
use crate::config::BatchConfig;
use crate::pipeline::buffer::BufferStore;
use crate::pipeline::flusher::{FlushEngine, FlushError};
use crate::pipeline::record;
use crate::pipeline::router::{self, PartitionKey};
use crate::pipeline::scheduler::{self, FlushDecision};
use crate::store::ComposeStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// Messages for the pipeline actor
pub enum PipelineMessage {
    /// An inbound broker message to validate, route, and buffer
    Ingest { message: InboundMessage },
    /// A deferred-flush timer fired; `seq` guards against stale timers
    FlushDue { key: PartitionKey, seq: u64 },
    /// Explicitly flush one partition, with optional completion reply
    Flush {
        key: PartitionKey,
        reply: Option<oneshot::Sender<Result<usize, FlushError>>>,
    },
    /// Snapshot of per-partition pending depths
    Depths {
        reply: oneshot::Sender<Vec<(PartitionKey, usize)>>,
    },
    /// Graceful shutdown: drain every partition, then stop
    Shutdown { reply: oneshot::Sender<()> },
}

/// Pipeline actor owning ingest and scheduling
pub struct PipelineActor {
    engine: FlushEngine,
    batch: BatchConfig,
    rx: mpsc::UnboundedReceiver<PipelineMessage>,
    /// Own mailbox sender, for timer tasks to post back into
    tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl PipelineActor {
    fn new(
        engine: FlushEngine,
        batch: BatchConfig,
        rx: mpsc::UnboundedReceiver<PipelineMessage>,
        tx: mpsc::UnboundedSender<PipelineMessage>,
    ) -> Self {
        PipelineActor {
            engine,
            batch,
            rx,
            tx,
        }
    }

    /// Run the actor loop
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                PipelineMessage::Ingest { message } => self.handle_ingest(message),
                PipelineMessage::FlushDue { key, seq } => {
                    if self.engine.buffers().timer_due(&key, seq) {
                        self.spawn_flush(key, None);
                    }
                }
                PipelineMessage::Flush { key, reply } => self.spawn_flush(key, reply),
                PipelineMessage::Depths { reply } => {
                    let _ = reply.send(self.engine.buffers().depths());
                }
                PipelineMessage::Shutdown { reply } => {
                    self.drain_all().await;
                    info!("pipeline actor shutting down");
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    /// Decode, validate, route, buffer, and evaluate flush triggers
    fn handle_ingest(&mut self, message: InboundMessage) {
        let value: serde_json::Value = match serde_json::from_slice(&message.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropping unparseable payload");
                return;
            }
        };

        let parsed = match record::validate(&value) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(topic = %message.topic, reason = %reason, "rejecting record");
                return;
            }
        };

        let key = router::partition_key(&parsed);
        let depth = self.engine.buffers().append(&key, value.to_string());

        match scheduler::evaluate(depth, self.batch.batch_max) {
            FlushDecision::Immediate => self.spawn_flush(key, None),
            FlushDecision::Defer => {
                if let Some(seq) = self.engine.buffers().arm_timer(&key) {
                    let tx = self.tx.clone();
                    let interval = self.batch.batch_max_interval;
                    tokio::spawn(async move {
                        tokio::time::sleep(interval).await;
                        let _ = tx.send(PipelineMessage::FlushDue { key, seq });
                    });
                }
            }
        }
    }

    /// Run one flush off the actor task. Same-key ordering is enforced
    /// by the engine's per-key token, not by the spawn order here.
    fn spawn_flush(
        &self,
        key: PartitionKey,
        reply: Option<oneshot::Sender<Result<usize, FlushError>>>,
    ) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result = engine.flush(&key).await;
            if let Some(tx) = reply {
                let _ = tx.send(result);
            }
        });
    }

    /// Flush every known partition, one at a time. Failures are logged
    /// and tolerated: their lines stay re-buffered and are lost only if
    /// the process exits anyway.
    async fn drain_all(&self) {
        let keys = self.engine.buffers().keys();
        info!(partitions = keys.len(), "draining all partitions");
        for key in keys {
            if let Err(e) = self.engine.flush(&key).await {
                error!(partition = %key, error = %e, "drain flush failed");
            }
        }
    }
}

// ============================================================================
// PipelineHandle - public interface for interacting with the actor
// ============================================================================

/// Handle for sending messages to the pipeline actor
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl PipelineHandle {
    /// Feed one broker message into the pipeline (fire-and-forget)
    pub fn ingest(&self, message: InboundMessage) {
        let _ = self.tx.send(PipelineMessage::Ingest { message });
    }

    /// Flush one partition and wait for the result
    pub async fn flush(&self, key: PartitionKey) -> Result<usize, FlushError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(PipelineMessage::Flush {
                key,
                reply: Some(reply),
            })
            .is_err()
        {
            return Err(FlushError::Unavailable);
        }
        rx.await.unwrap_or(Err(FlushError::Unavailable))
    }

    /// Per-partition pending depths (empty if the actor is gone)
    pub async fn depths(&self) -> Vec<(PartitionKey, usize)> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(PipelineMessage::Depths { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Graceful shutdown, drains every partition before returning
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(PipelineMessage::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Spawn a pipeline actor over the given store and return its handle +
/// join handle
pub fn spawn_pipeline(
    store: Arc<dyn ComposeStore>,
    batch: BatchConfig,
) -> (PipelineHandle, tokio::task::JoinHandle<()>) {
    let buffers = Arc::new(BufferStore::new());
    let engine = FlushEngine::new(store, buffers);
    let (tx, rx) = mpsc::unbounded_channel();

    let actor = PipelineActor::new(engine, batch, rx, tx.clone());
    let task = tokio::spawn(actor.run());

    (PipelineHandle { tx }, task)
}
