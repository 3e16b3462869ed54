//! Telemetry Ingest Pipeline
//!
//! Record validation, partition routing, buffering, flush scheduling,
//! and the append-via-compose flush engine, driven by a single actor.
//!
//! ## Architecture
//!
//! ```text
//! InboundMessage → validate → route → BufferStore.append
//!                                          ↓
//!                      size threshold ── evaluate ── timer
//!                                          ↓
//!                              FlushEngine.flush(key)
//!                                          ↓
//!                        put part → stat → compose/copy → remove
//! ```

pub mod actor;
pub mod buffer;
pub mod flusher;
pub mod record;
pub mod router;
pub mod scheduler;

pub use actor::{spawn_pipeline, PipelineActor, PipelineHandle, PipelineMessage};
pub use buffer::BufferStore;
pub use flusher::{FlushEngine, FlushError};
pub use record::{validate, ParsedRecord, RejectReason, REQUIRED_MEASUREMENTS};
pub use router::{partition_key, PartitionKey};
pub use scheduler::{evaluate, FlushDecision};
