pub mod broker;
pub mod config;
pub mod health;
pub mod pipeline;
pub mod store;

pub use broker::{BrokerFeed, BrokerPublisher, InboundMessage};
pub use config::{BatchConfig, BrokerConfig, SinkConfig, StoreBackend, StoreConfig};
pub use pipeline::{spawn_pipeline, FlushEngine, FlushError, PartitionKey, PipelineHandle};
pub use store::{ComposeStore, InMemoryComposeStore, LocalFsComposeStore};
