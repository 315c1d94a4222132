//! Lock-free coefficient mailbox
//!
//! Bounded crossbeam queue of `Copy` coefficient sets plus a few
//! cache-padded counters. Both sides only touch atomics:
//! - push never blocks (a full queue drops its oldest entry)
//! - pop never blocks and never allocates
//! - counters sit on separate cache lines to avoid false sharing

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use paraeq_core::ChainCoefficients;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sample rate value meaning "not prepared"
const NO_SAMPLE_RATE: u64 = 0;

/// Counters describing traffic through the handoff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandoffStats {
    /// Coefficient sets pushed by the controller
    pub published: u64,
    /// Pending sets replaced before the audio thread saw them
    pub replaced: u64,
    /// Sets installed by the audio thread
    pub installed: u64,
    /// Sets dropped because they were designed for another sample rate
    pub stale: u64,
}

pub(crate) struct Handoff {
    queue: ArrayQueue<ChainCoefficients>,

    /// Prepared sample rate as f64 bits, written by the audio side
    sample_rate: CachePadded<AtomicU64>,

    published: CachePadded<AtomicU64>,
    replaced: CachePadded<AtomicU64>,
    installed: CachePadded<AtomicU64>,
    stale: CachePadded<AtomicU64>,
}

impl Handoff {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            sample_rate: CachePadded::new(AtomicU64::new(NO_SAMPLE_RATE)),
            published: CachePadded::new(AtomicU64::new(0)),
            replaced: CachePadded::new(AtomicU64::new(0)),
            installed: CachePadded::new(AtomicU64::new(0)),
            stale: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Publish a set, replacing the oldest pending one if the queue is full
    pub(crate) fn publish(&self, coefficients: ChainCoefficients) {
        if self.queue.force_push(coefficients).is_some() {
            self.replaced.fetch_add(1, Ordering::Relaxed);
        }
        self.published.fetch_add(1, Ordering::Release);
    }

    /// Drain the queue, returning the newest set designed for `sample_rate`
    ///
    /// Wait-free apart from the bounded drain loop; called once per block.
    pub(crate) fn take_latest(&self, sample_rate: f64) -> Option<ChainCoefficients> {
        let mut latest = None;
        while let Some(coefficients) = self.queue.pop() {
            if coefficients.sample_rate() == sample_rate {
                if latest.replace(coefficients).is_some() {
                    self.replaced.fetch_add(1, Ordering::Relaxed);
                }
            } else {
                self.stale.fetch_add(1, Ordering::Relaxed);
            }
        }
        if latest.is_some() {
            self.installed.fetch_add(1, Ordering::Relaxed);
        }
        latest
    }

    /// Throw away everything pending
    pub(crate) fn clear(&self) {
        while self.queue.pop().is_some() {
            self.stale.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_sample_rate(&self, sample_rate: Option<f64>) {
        let bits = sample_rate.map_or(NO_SAMPLE_RATE, f64::to_bits);
        self.sample_rate.store(bits, Ordering::Release);
    }

    pub(crate) fn sample_rate(&self) -> Option<f64> {
        match self.sample_rate.load(Ordering::Acquire) {
            NO_SAMPLE_RATE => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn stats(&self) -> HandoffStats {
        HandoffStats {
            published: self.published.load(Ordering::Acquire),
            replaced: self.replaced.load(Ordering::Relaxed),
            installed: self.installed.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}
