//! Run counters shared by both workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters updated by the producer and the consumer.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_acquired: AtomicU64,
    frames_saved: AtomicU64,
    bytes_written: AtomicU64,
    write_time_us: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_acquired: u64,
    pub frames_saved: u64,
    pub bytes_written: u64,
    pub write_time_us: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_acquired(&self) {
        self.frames_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_saved(&self, bytes: usize, elapsed: Duration) {
        self.frames_saved.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        self.write_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_acquired: self.frames_acquired.load(Ordering::Relaxed),
            frames_saved: self.frames_saved.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_time_us: self.write_time_us.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Counts accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            frames_acquired: self.frames_acquired.saturating_sub(earlier.frames_acquired),
            frames_saved: self.frames_saved.saturating_sub(earlier.frames_saved),
            bytes_written: self.bytes_written.saturating_sub(earlier.bytes_written),
            write_time_us: self.write_time_us.saturating_sub(earlier.write_time_us),
        }
    }

    /// Mean time spent in the writer per saved frame.
    pub fn mean_write_time(&self) -> Option<Duration> {
        (self.frames_saved > 0)
            .then(|| Duration::from_micros(self.write_time_us / self.frames_saved))
    }
}
