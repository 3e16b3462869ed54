//! Flush Scheduling
//!
//! Decides, after every append, how a partition's pending lines get
//! written out: hitting the size threshold flushes immediately;
//! otherwise a single deferred timer (at most one per partition,
//! tracked in the buffer store) bounds how long lines can sit.

/// What to do after an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Depth reached the size threshold: flush now, skip the timer
    Immediate,
    /// Under threshold: ensure a deferred-flush timer is armed
    Defer,
}

/// Evaluate a partition after an append
pub fn evaluate(depth: usize, batch_max: usize) -> FlushDecision {
    if depth >= batch_max {
        FlushDecision::Immediate
    } else {
        FlushDecision::Defer
    }
}
