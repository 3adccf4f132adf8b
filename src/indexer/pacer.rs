//! Inter-batch pacing.

use std::time::Duration;

use crate::signal::KeepGoing;

const SLICE: Duration = Duration::from_millis(25);

/// Decides how long the indexer rests between batches.
pub trait Pacer: Send + Sync {
    /// Rest for up to `duration`, returning early once `signal` is cancelled.
    fn pause(&self, duration: Duration, signal: &KeepGoing);
}

/// Sleeps in short slices so cancellation is noticed promptly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&self, duration: Duration, signal: &KeepGoing) {
        let mut remaining = duration;
        while !remaining.is_zero() && signal.should_continue() {
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }
}

/// Never pauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacer;

impl Pacer for NoPacer {
    fn pause(&self, _duration: Duration, _signal: &KeepGoing) {}
}
