use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::instrument;

mod path;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rscp",
    version,
    about = "Resumable copy - copies large files and directory trees, continuing where an interrupted copy stopped",
    long_about = "`rscp` copies files and directory trees over slow or unreliable storage.

A destination file that already exists is treated as an already-copied prefix of its source: the
copy seeks past it and only transfers the missing bytes. Re-running an interrupted command
therefore picks up where it left off, and re-running a finished one transfers nothing. Every
chunk is flushed and synced before the next one is read.

Destinations are NOT verified against their sources: a destination that differs from the start of
its source is left as it is and only appended to.

EXAMPLES:
    # Copy a single file
    rscp /mnt/share/disk.img /data/disk.img

    # Copy several sources INTO a directory (note the trailing slash)
    rscp /mnt/share/photos /mnt/share/db.dump /data/

    # Copy the pairs listed in a JSON worklist
    rscp --worklist pairs.json

EXIT STATUS:
    0 when every source was copied, 1 when at least one copy failed, 2 on invalid arguments."
)]
struct Args {
    // Copy options
    /// Exit on first error
    #[arg(short = 'e', long = "fail-early", help_heading = "Copy options")]
    fail_early: bool,

    /// Size of a single read/write/sync cycle
    ///
    /// Accepts human readable sizes, e.g. "16MiB", "512KiB", "1048576".
    #[arg(
        long,
        default_value = "16MiB",
        value_name = "SIZE",
        help_heading = "Copy options"
    )]
    chunk_size: bytesize::ByteSize,

    /// JSON file with an array of {"src": ..., "dst": ...} pairs to copy
    ///
    /// Pairs from the file are copied after the ones given on the command line.
    #[arg(long, value_name = "PATH", help_heading = "Copy options")]
    worklist: Option<std::path::PathBuf>,

    // Progress & output
    /// Minimum delay between progress lines
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "5s", "1min" etc.
    #[arg(
        long,
        default_value = "5s",
        value_name = "DELAY",
        value_parser = humantime::parse_duration,
        help_heading = "Progress & output"
    )]
    report_interval: std::time::Duration,

    /// Don't print progress and completion lines
    #[arg(long, help_heading = "Progress & output")]
    no_progress: bool,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report progress or errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Throttle the number of files and directories opened per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    /// Throttle the number of chunks read per second, 0 means no throttle
    ///
    /// Together with --chunk-size this caps the read bandwidth at N * chunk size per second.
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    iops_throttle: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source path(s) and destination path
    #[arg(value_name = "SRC... DST")]
    paths: Vec<String>,
}

fn build_worklist(args: &Args) -> Result<common::Worklist> {
    let mut worklist: common::Worklist = path::resolve_pairs(&args.paths)?
        .into_iter()
        .map(|(src, dst)| common::Pair { src, dst })
        .collect();
    if let Some(ref file) = args.worklist {
        worklist.append(common::Worklist::from_json_file(file)?);
    }
    if worklist.is_empty() {
        return Err(anyhow!(
            "Nothing to copy: specify SRC... DST paths or a --worklist file"
        ));
    }
    Ok(worklist)
}

#[instrument(skip(cancel))]
async fn async_main(
    args: Args,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<common::copy::Summary> {
    let worklist = build_worklist(&args)?;
    let settings = common::copy::Settings {
        chunk_size: args.chunk_size.as_u64(),
        report_interval: args.report_interval,
        report_progress: !args.no_progress && !args.quiet,
        fail_early: args.fail_early,
    };
    settings.chunk_len()?;
    tracing::debug!("copy settings: {:?}", &settings);
    tracing::info!("copying {} top-level source(s)", worklist.len());
    match worklist.run(&settings, &cancel).await {
        Ok(summary) => Ok(summary),
        Err(error) => {
            if args.summary {
                return Err(anyhow!("{:#}\n\n{}", error, &error.summary));
            }
            Err(anyhow!("{:#}", error))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle = common::ThrottleConfig {
        ops_throttle: args.ops_throttle,
        iops_throttle: args.iops_throttle,
    };
    let res = common::run(output, runtime, throttle, |cancel| async_main(args, cancel));
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
