//! Buffer Store
//!
//! Per-partition in-memory state: the pending line queue, the timer
//! bookkeeping, and the per-key flush serialization token. Shared
//! between the pipeline actor (appends, timer arming) and spawned
//! flush tasks (drain/restore) behind one short-hold lock.
//!
//! `drain` hands ownership of the pending lines to the caller; on a
//! failed flush `restore` splices them back to the *front*, ahead of
//! anything appended since, so a failure is equivalent to never having
//! drained and arrival order is preserved.

use crate::pipeline::router::PartitionKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// State for one partition. Created lazily, lives for the process.
struct PartitionState {
    /// Pending serialized lines, arrival order
    pending: Vec<String>,
    /// Sequence of the currently armed timer, if any
    armed_timer: Option<u64>,
    /// Monotonic timer sequence counter
    timer_seq: u64,
    /// Flush serialization token: at most one flush in flight per key
    token: Arc<tokio::sync::Mutex<()>>,
}

impl PartitionState {
    fn new() -> Self {
        PartitionState {
            pending: Vec::new(),
            armed_timer: None,
            timer_seq: 0,
            token: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Map of partition key to buffered state
pub struct BufferStore {
    inner: Mutex<HashMap<PartitionKey, PartitionState>>,
}

impl BufferStore {
    pub fn new() -> Self {
        BufferStore {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Append a serialized line to the partition's pending queue.
    /// Returns the new pending depth.
    pub fn append(&self, key: &PartitionKey, line: String) -> usize {
        let mut inner = self.inner.lock();
        let state = inner
            .entry(key.clone())
            .or_insert_with(PartitionState::new);
        state.pending.push(line);
        state.pending.len()
    }

    /// Atomically empty and return the partition's pending lines.
    /// Called only by the flush engine while holding the key's token.
    pub fn drain(&self, key: &PartitionKey) -> Vec<String> {
        let mut inner = self.inner.lock();
        match inner.get_mut(key) {
            Some(state) => std::mem::take(&mut state.pending),
            None => Vec::new(),
        }
    }

    /// Return drained lines to the front of the pending queue,
    /// preserving their order ahead of lines appended since the drain.
    pub fn restore(&self, key: &PartitionKey, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        let state = inner
            .entry(key.clone())
            .or_insert_with(PartitionState::new);
        state.pending.splice(0..0, lines);
    }

    /// Pending depth for one partition
    pub fn depth_of(&self, key: &PartitionKey) -> usize {
        self.inner
            .lock()
            .get(key)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    /// All partitions with their pending depths, sorted by key
    pub fn depths(&self) -> Vec<(PartitionKey, usize)> {
        let inner = self.inner.lock();
        let mut depths: Vec<(PartitionKey, usize)> = inner
            .iter()
            .map(|(k, s)| (k.clone(), s.pending.len()))
            .collect();
        depths.sort_by(|a, b| a.0.cmp(&b.0));
        depths
    }

    /// All known partition keys, sorted
    pub fn keys(&self) -> Vec<PartitionKey> {
        let inner = self.inner.lock();
        let mut keys: Vec<PartitionKey> = inner.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Arm the partition's deferred-flush timer. Returns the timer
    /// sequence to fire with, or None if one is already armed.
    pub fn arm_timer(&self, key: &PartitionKey) -> Option<u64> {
        let mut inner = self.inner.lock();
        let state = inner
            .entry(key.clone())
            .or_insert_with(PartitionState::new);
        if state.armed_timer.is_some() {
            return None;
        }
        state.timer_seq += 1;
        state.armed_timer = Some(state.timer_seq);
        Some(state.timer_seq)
    }

    /// Consume a timer firing. True exactly once per armed sequence;
    /// a stale or cleared sequence returns false and must not trigger.
    pub fn timer_due(&self, key: &PartitionKey, seq: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(key) {
            Some(state) if state.armed_timer == Some(seq) => {
                state.armed_timer = None;
                true
            }
            _ => false,
        }
    }

    /// Clear any armed timer for the key. Idempotent.
    pub fn clear_timer(&self, key: &PartitionKey) {
        if let Some(state) = self.inner.lock().get_mut(key) {
            state.armed_timer = None;
        }
    }

    /// The partition's flush serialization token (created lazily)
    pub fn flush_token(&self, key: &PartitionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut inner = self.inner.lock();
        inner
            .entry(key.clone())
            .or_insert_with(PartitionState::new)
            .token
            .clone()
    }
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(identity: &str) -> PartitionKey {
        PartitionKey::new(
            identity,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        )
    }

    #[test]
    fn test_append_drain_order() {
        let store = BufferStore::new();
        let k = key("T1");

        assert_eq!(store.append(&k, "a".to_string()), 1);
        assert_eq!(store.append(&k, "b".to_string()), 2);

        let drained = store.drain(&k);
        assert_eq!(drained, vec!["a", "b"]);
        assert_eq!(store.depth_of(&k), 0);
    }

    #[test]
    fn test_drain_unknown_key_is_empty() {
        let store = BufferStore::new();
        assert!(store.drain(&key("nobody")).is_empty());
    }

    #[test]
    fn test_restore_goes_to_front() {
        let store = BufferStore::new();
        let k = key("T1");

        store.append(&k, "a".to_string());
        store.append(&k, "b".to_string());
        let drained = store.drain(&k);

        // Lines arriving while the flush was in flight
        store.append(&k, "c".to_string());

        store.restore(&k, drained);
        assert_eq!(store.drain(&k), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = BufferStore::new();
        store.append(&key("T1"), "x".to_string());
        store.append(&key("T2"), "y".to_string());

        assert_eq!(store.drain(&key("T1")), vec!["x"]);
        assert_eq!(store.depth_of(&key("T2")), 1);
    }

    #[test]
    fn test_depths_snapshot() {
        let store = BufferStore::new();
        store.append(&key("T2"), "x".to_string());
        store.append(&key("T1"), "y".to_string());
        store.append(&key("T1"), "z".to_string());

        let depths = store.depths();
        assert_eq!(depths.len(), 2);
        assert_eq!(depths[0].0.identity, "T1");
        assert_eq!(depths[0].1, 2);
        assert_eq!(depths[1].0.identity, "T2");
        assert_eq!(depths[1].1, 1);
    }

    #[test]
    fn test_at_most_one_timer() {
        let store = BufferStore::new();
        let k = key("T1");

        let seq = store.arm_timer(&k).unwrap();
        assert!(store.arm_timer(&k).is_none());

        assert!(store.timer_due(&k, seq));
        // Fires exactly once
        assert!(!store.timer_due(&k, seq));

        // Re-arming after firing works and gets a fresh sequence
        let seq2 = store.arm_timer(&k).unwrap();
        assert_ne!(seq, seq2);
    }

    #[test]
    fn test_cleared_timer_never_fires() {
        let store = BufferStore::new();
        let k = key("T1");

        let seq = store.arm_timer(&k).unwrap();
        store.clear_timer(&k);
        assert!(!store.timer_due(&k, seq));

        // A timer armed after the clear is unaffected by the stale seq
        let seq2 = store.arm_timer(&k).unwrap();
        assert!(!store.timer_due(&k, seq));
        assert!(store.timer_due(&k, seq2));
    }
}
