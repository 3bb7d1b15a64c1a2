//! Common library for the `rscp` resumable copy tool
//!
//! # Overview
//!
//! Copies files and directory trees so that an interrupted copy can simply be started again: a
//! destination file that already exists is treated as the prefix of its source and only the
//! missing bytes are transferred.
//!
//! # Modules
//!
//! - [`copy`] - resumable copy of a single file, chunked and synced to storage after every chunk
//! - [`mirror`] - recreates a directory tree, resuming every file in it
//! - [`worklist`] - ordered list of top-level (source, destination) pairs
//! - [`progress`] - throughput, percentage and time-left math for one transfer
//! - [`config`] - runtime, throttling and output settings
//!
//! # Progress output
//!
//! While a file is being copied a line like the following is printed to stdout at most every
//! report interval (5s by default):
//!
//! ```text
//! Elapsed: 1m 5s, Completed 1040MB/4096MB (25.39%), 16.012 MB/s, 3m 10s left
//! ```
//!
//! and once the file is done:
//!
//! ```text
//! Done. Completed 4096MB in 4m 16s 12ms, average speed: 16.002 MB/s
//! ```
//!
//! MB means 1024 * 1024 bytes. Bytes present at the destination before the copy started are not
//! included in the completion line.
//!
//! # Error Handling
//!
//! Copy operations return [`copy::Error`] which carries the [`copy::Summary`] of the work done
//! before the failure. Failures with a specific meaning (missing source, destination larger than
//! its source, cancellation) can be inspected with [`copy::Error::kind`].
//!
//! # Entry point
//!
//! [`run`] sets up logging, the tokio runtime, throttling and Ctrl-C handling and then runs the
//! provided async body.

pub mod config;
pub mod copy;
pub mod mirror;
pub mod progress;
pub mod worklist;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};
pub use copy::copy_file;
pub use mirror::copy_directory;
pub use worklist::{Pair, Worklist};

fn init_tracing(output: &OutputConfig) {
    let default_level = if output.quiet {
        tracing_subscriber::filter::LevelFilter::OFF
    } else {
        tracing_subscriber::filter::LevelFilter::from_level(output.log_level())
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    // fails only if a global subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn start_throttles(throttle_config: &ThrottleConfig) {
    if throttle_config.ops_throttle > 0 {
        let (tokens, interval) = throttle::replenish_schedule(throttle_config.ops_throttle);
        throttle::init_entry_tokens(tokens);
        tokio::spawn(throttle::run_entry_replenish_thread(tokens, interval));
    }
    if throttle_config.iops_throttle > 0 {
        let (tokens, interval) = throttle::replenish_schedule(throttle_config.iops_throttle);
        throttle::init_chunk_tokens(tokens);
        tokio::spawn(throttle::run_chunk_replenish_thread(tokens, interval));
    }
}

/// Cancels `cancel` on the first Ctrl-C so the current chunk can finish; a second Ctrl-C exits
/// immediately.
async fn cancel_on_interrupt(cancel: tokio_util::sync::CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install Ctrl-C handler");
        return;
    }
    tracing::warn!("interrupted, stopping after the current chunk (press Ctrl-C again to abort)");
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

/// Runs `func` on a freshly built tokio runtime.
///
/// Returns `None` if `func` failed (the error is printed to stderr unless `output.quiet` is set),
/// otherwise the summary, which is also printed when requested or when running verbose.
pub fn run<Fut, Summary, Error>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle_config: ThrottleConfig,
    func: impl FnOnce(tokio_util::sync::CancellationToken) -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    init_tracing(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start tokio runtime: {error}");
            }
            return None;
        }
    };
    let res = tokio_runtime.block_on(async move {
        start_throttles(&throttle_config);
        let cancel = tokio_util::sync::CancellationToken::new();
        tokio::spawn(cancel_on_interrupt(cancel.clone()));
        func(cancel).await
    });
    // replenish and signal tasks never finish on their own
    tokio_runtime.shutdown_background();
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error}");
            }
            None
        }
    }
}
