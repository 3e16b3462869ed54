//! Simulated Object Store with Fault Injection
//!
//! Wraps another store and injects deterministic, seed-reproducible
//! failures per operation. Used by the fault-injection tests to verify
//! the flush protocol's restore-and-converge behavior, and to count
//! store calls (the empty-flush and rejected-record properties assert
//! zero attempts).

use crate::store::object::{ComposeStore, ObjectMeta};
use rand::{Rng as _, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Per-operation failure probabilities
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of PUT failure
    pub put_fail_prob: f64,
    /// Probability of STAT failure (other than NotFound)
    pub stat_fail_prob: f64,
    /// Probability of COMPOSE failure
    pub compose_fail_prob: f64,
    /// Probability of COPY failure
    pub copy_fail_prob: f64,
    /// Probability of REMOVE failure
    pub remove_fail_prob: f64,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.01,
            stat_fail_prob: 0.01,
            compose_fail_prob: 0.01,
            copy_fail_prob: 0.01,
            remove_fail_prob: 0.01,
        }
    }
}

impl SimulatedStoreConfig {
    /// No faults - for baseline runs and call counting
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.0,
            stat_fail_prob: 0.0,
            compose_fail_prob: 0.0,
            copy_fail_prob: 0.0,
            remove_fail_prob: 0.0,
        }
    }

    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.2,
            stat_fail_prob: 0.1,
            compose_fail_prob: 0.2,
            copy_fail_prob: 0.2,
            remove_fail_prob: 0.1,
        }
    }
}

/// Attempt/failure counters per operation
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub stat_attempts: u64,
    pub stat_failures: u64,
    pub compose_attempts: u64,
    pub compose_failures: u64,
    pub copy_attempts: u64,
    pub copy_failures: u64,
    pub remove_attempts: u64,
    pub remove_failures: u64,
}

impl SimulatedStoreStats {
    /// Total store calls across all operations
    pub fn total_attempts(&self) -> u64 {
        self.put_attempts
            + self.stat_attempts
            + self.compose_attempts
            + self.copy_attempts
            + self.remove_attempts
    }
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
}

/// Fault-injecting wrapper around any `ComposeStore`
pub struct SimulatedComposeStore<S: ComposeStore + Clone> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

impl<S: ComposeStore + Clone> SimulatedComposeStore<S> {
    /// Create a new simulated store with the given seed
    pub fn new(inner_store: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedComposeStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: SimulatedStoreStats::default(),
            })),
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state
            .lock()
            .expect("simulated store mutex poisoned")
            .stats
            .clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.state
            .lock()
            .expect("simulated store mutex poisoned")
            .stats = SimulatedStoreStats::default();
    }

    /// Roll against a failure probability; records attempt and,
    /// on a hit, the failure, via the given counter accessors.
    fn roll(
        &self,
        prob: f64,
        count: impl FnOnce(&mut SimulatedStoreStats),
        fail: impl FnOnce(&mut SimulatedStoreStats),
        op: &'static str,
    ) -> IoResult<()> {
        let mut state = self.state.lock().expect("simulated store mutex poisoned");
        count(&mut state.stats);
        if prob > 0.0 && state.rng.gen_bool(prob.clamp(0.0, 1.0)) {
            fail(&mut state.stats);
            return Err(IoError::new(
                ErrorKind::Other,
                format!("simulated {} failure", op),
            ));
        }
        Ok(())
    }
}

impl<S: ComposeStore + Clone> Clone for SimulatedComposeStore<S> {
    fn clone(&self) -> Self {
        SimulatedComposeStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: ComposeStore + Clone> ComposeStore for SimulatedComposeStore<S> {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.roll(
                self.config.put_fail_prob,
                |s| s.put_attempts += 1,
                |s| s.put_failures += 1,
                "put",
            )?;
            self.inner_store.put(key, data).await
        })
    }

    fn stat<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            self.roll(
                self.config.stat_fail_prob,
                |s| s.stat_attempts += 1,
                |s| s.stat_failures += 1,
                "stat",
            )?;
            self.inner_store.stat(key).await
        })
    }

    fn compose<'a>(
        &'a self,
        sources: &'a [String],
        dest: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.roll(
                self.config.compose_fail_prob,
                |s| s.compose_attempts += 1,
                |s| s.compose_failures += 1,
                "compose",
            )?;
            self.inner_store.compose(sources, dest).await
        })
    }

    fn copy<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.roll(
                self.config.copy_fail_prob,
                |s| s.copy_attempts += 1,
                |s| s.copy_failures += 1,
                "copy",
            )?;
            self.inner_store.copy(from, to).await
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.roll(
                self.config.remove_fail_prob,
                |s| s.remove_attempts += 1,
                |s| s.remove_failures += 1,
                "remove",
            )?;
            self.inner_store.remove(key).await
        })
    }
}
