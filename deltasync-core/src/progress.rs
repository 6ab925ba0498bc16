//! Progress reporting shared by fetch workers, the puller, and the delta
//! generator.
//!
//! Two independent counters live here:
//! - [`ProgressTracker`] counts discrete work units (one per materialized
//!   endpoint, generated delta, or publish);
//! - [`ByteProgress`] tracks bytes streamed across all concurrent archive
//!   downloads and announces every 5% threshold once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Percentage step between byte-progress announcements.
pub const PERCENT_STEP: u64 = 5;

// ---------------------------------------------------------------------------
// Unit progress
// ---------------------------------------------------------------------------

/// Thread-safe count of completed work units out of a fixed total.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    completed: AtomicU64,
}

impl ProgressTracker {
    pub fn new(total_units: u64) -> Self {
        Self {
            total: total_units,
            completed: AtomicU64::new(0),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Mark one unit done and emit a status line. Returns the new count.
    ///
    /// The count saturates at the total; an extra tick is logged and ignored.
    pub fn tick(&self, label: impl fmt::Display) -> u64 {
        let bumped = self
            .completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| {
                (done < self.total).then_some(done + 1)
            });

        match bumped {
            Ok(previous) => {
                let done = previous + 1;
                tracing::info!(
                    completed = done,
                    total = self.total,
                    "[{done}/{}] {label}",
                    self.total
                );
                done
            }
            Err(done) => {
                tracing::warn!(
                    completed = done,
                    total = self.total,
                    "progress tick past total ignored: {label}"
                );
                done
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Byte progress
// ---------------------------------------------------------------------------

/// Cumulative byte counter with a monotonically increasing percent watermark.
#[derive(Debug)]
pub struct ByteProgress {
    total: u64,
    received: AtomicU64,
    next_percent: Mutex<u64>,
}

impl ByteProgress {
    /// `total_bytes` is the sum of every stream's announced length.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total: total_bytes,
            received: AtomicU64::new(0),
            next_percent: Mutex::new(PERCENT_STEP),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    /// Current completion, capped at 100. Zero when no total is known.
    pub fn percent(&self) -> u64 {
        percent_of(self.received(), self.total)
    }

    /// Highest threshold announced so far.
    pub fn last_announced(&self) -> Option<u64> {
        let next = *self
            .next_percent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (next > PERCENT_STEP).then(|| next - PERCENT_STEP)
    }

    /// Account for `bytes` more and announce every threshold now crossed.
    ///
    /// A chunk large enough to cross several thresholds announces each of
    /// them in order. Returns the thresholds announced by this call.
    pub fn advance(&self, bytes: u64) -> Vec<u64> {
        let received = self.received.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if self.total == 0 {
            return Vec::new();
        }
        let percent = percent_of(received, self.total);

        let mut next = self
            .next_percent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut announced = Vec::new();
        while *next <= percent && *next <= 100 {
            tracing::info!(
                percent = *next,
                received,
                total = self.total,
                "downloaded {}% of archives",
                *next
            );
            announced.push(*next);
            *next += PERCENT_STEP;
        }
        announced
    }
}

fn percent_of(received: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let received = received.min(total) as u128;
    (received * 100 / total as u128) as u64
}
