//! Object store backends for the flush pipeline.
//!
//! The flush engine sees only the `ComposeStore` trait; backends are
//! selected at startup from configuration.

pub mod object;
pub mod simulated;
#[cfg(feature = "s3")]
pub mod s3;

pub use object::{ComposeStore, InMemoryComposeStore, LocalFsComposeStore, ObjectMeta};
pub use simulated::{SimulatedComposeStore, SimulatedStoreConfig, SimulatedStoreStats};
#[cfg(feature = "s3")]
pub use s3::CloudComposeStore;
