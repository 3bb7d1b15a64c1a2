//! Progress accounting for a single file transfer
//!
//! A [`TransferSession`] tracks how far a copy has advanced since it was resumed and produces a
//! [`Snapshot`] once per report interval. All methods take the current [`Instant`] explicitly so
//! the math does not depend on the wall clock.

use std::time::{Duration, Instant};

/// Bytes per "MB" in all human-readable output.
pub const MIB: u64 = 1024 * 1024;

fn megabytes(bytes: u64) -> u64 {
    bytes / MIB
}

fn megabytes_per_sec(bytes_per_sec: f64) -> f64 {
    bytes_per_sec / MIB as f64
}

fn whole_seconds(duration: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(Duration::from_secs(duration.as_secs()))
}

fn whole_millis(duration: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(Duration::from_millis(
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    ))
}

/// Progress derived at a reporting tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Time since the session started
    pub elapsed: Duration,
    /// Bytes present at the destination
    pub position: u64,
    /// Source length
    pub total: u64,
    /// Throughput over the last window
    pub bytes_per_sec: f64,
    /// Time left at the current throughput, `None` if nothing moved during the window
    pub remaining: Option<Duration>,
}

impl Snapshot {
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.position as f64 * 100.0 / self.total as f64
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Elapsed: {}, Completed {}MB/{}MB ({:.2}%), {:.3} MB/s, ",
            whole_seconds(self.elapsed),
            megabytes(self.position),
            megabytes(self.total),
            self.percent(),
            megabytes_per_sec(self.bytes_per_sec),
        )?;
        match self.remaining {
            Some(remaining) => write!(f, "{} left", whole_seconds(remaining)),
            None => write!(f, "unknown left"),
        }
    }
}

/// Outcome of a finished session. Bytes that were already at the destination when the session
/// started are not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub transferred: u64,
    pub elapsed: Duration,
}

impl Completion {
    #[must_use]
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.transferred as f64 / secs
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Done. Completed {}MB in {}, average speed: {:.3} MB/s",
            megabytes(self.transferred),
            whole_millis(self.elapsed),
            megabytes_per_sec(self.bytes_per_sec()),
        )
    }
}

#[derive(Debug)]
pub struct TransferSession {
    total: u64,
    initial: u64,
    position: u64,
    started: Instant,
    window_started: Instant,
    window_position: u64,
    interval: Duration,
}

impl TransferSession {
    /// Starts a session resuming at `resume_offset`. Returns `None` when the offset lies past the
    /// end of the source.
    #[must_use]
    pub fn new(total: u64, resume_offset: u64, interval: Duration, now: Instant) -> Option<Self> {
        if resume_offset > total {
            return None;
        }
        Some(Self {
            total,
            initial: resume_offset,
            position: resume_offset,
            started: now,
            window_started: now,
            window_position: resume_offset,
            interval,
        })
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn resume_offset(&self) -> u64 {
        self.initial
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total - self.position
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.position == self.total
    }

    /// Length of the next read: a full chunk, or whatever is left of the source.
    #[must_use]
    pub fn next_chunk(&self, chunk_len: usize) -> usize {
        usize::try_from(self.remaining()).map_or(chunk_len, |remaining| remaining.min(chunk_len))
    }

    /// Records `bytes` written and flushed at the destination.
    pub fn advance(&mut self, bytes: u64) {
        debug_assert!(bytes <= self.remaining(), "advanced past the end of the source");
        self.position = std::cmp::min(self.position + bytes, self.total);
    }

    /// Returns a snapshot and starts a new window if at least one report interval elapsed since
    /// the window started.
    pub fn poll_report(&mut self, now: Instant) -> Option<Snapshot> {
        let window = now.saturating_duration_since(self.window_started);
        if window < self.interval {
            return None;
        }
        let window_secs = window.as_secs_f64();
        let window_bytes = self.position - self.window_position;
        let bytes_per_sec = if window_secs > 0.0 {
            window_bytes as f64 / window_secs
        } else {
            0.0
        };
        let remaining = if bytes_per_sec > 0.0 {
            Duration::try_from_secs_f64(self.remaining() as f64 / bytes_per_sec).ok()
        } else {
            None
        };
        self.window_started = now;
        self.window_position = self.position;
        Some(Snapshot {
            elapsed: now.saturating_duration_since(self.started),
            position: self.position,
            total: self.total,
            bytes_per_sec,
            remaining,
        })
    }

    #[must_use]
    pub fn finish(&self, now: Instant) -> Completion {
        Completion {
            transferred: self.position - self.initial,
            elapsed: now.saturating_duration_since(self.started),
        }
    }
}
