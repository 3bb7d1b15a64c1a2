//! Rate limiting for resumable copies
//!
//! Two independent token buckets are provided:
//!
//! 1. **Entry throttle** - limits the number of filesystem entries (files and directories)
//!    processed per second
//! 2. **Chunk throttle** - limits the number of transfer chunks read per second; together with
//!    the chunk size this caps bandwidth
//!
//! Both are disabled by default and never block until initialized with a non-zero value.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! # async fn example() {
//! // at most 4 chunks every 100ms, with 16MiB chunks this is ~640 MiB/s
//! throttle::init_chunk_tokens(4);
//! tokio::spawn(throttle::run_chunk_replenish_thread(4, Duration::from_millis(100)));
//!
//! throttle::get_chunk_token().await;
//! // read and write one chunk here
//! # }
//! ```
//!
//! # Replenishment
//!
//! Rates are expressed per second on the command line and converted with
//! [`replenish_schedule`] into a number of tokens added every interval, so that small rates do
//! not result in bursts.

mod semaphore;

static ENTRY_THROTTLE: semaphore::TokenBucket = semaphore::TokenBucket::new();
static CHUNK_THROTTLE: semaphore::TokenBucket = semaphore::TokenBucket::new();

pub fn init_entry_tokens(tokens: usize) {
    ENTRY_THROTTLE.setup(tokens);
}

pub fn init_chunk_tokens(tokens: usize) {
    CHUNK_THROTTLE.setup(tokens);
}

pub async fn get_entry_token() {
    ENTRY_THROTTLE.consume(1).await;
}

pub async fn get_chunk_token() {
    CHUNK_THROTTLE.consume(1).await;
}

pub async fn run_entry_replenish_thread(replenish: usize, interval: std::time::Duration) {
    ENTRY_THROTTLE.run_replenish(replenish, interval).await;
}

pub async fn run_chunk_replenish_thread(replenish: usize, interval: std::time::Duration) {
    CHUNK_THROTTLE.run_replenish(replenish, interval).await;
}

/// Splits a per-second rate into `(tokens, interval)` such that `tokens` are added every
/// `interval`. The interval starts at 1s and is shortened by powers of ten while at least 10
/// tokens remain per interval, down to 1ms.
#[must_use]
pub fn replenish_schedule(per_second: usize) -> (usize, std::time::Duration) {
    let mut tokens = per_second;
    let mut interval = std::time::Duration::from_secs(1);
    while tokens >= 100 && tokens % 10 == 0 && interval > std::time::Duration::from_millis(1) {
        tokens /= 10;
        interval /= 10;
    }
    tracing::debug!("throttle schedule: {} tokens every {:?}", tokens, interval);
    (tokens, interval)
}
