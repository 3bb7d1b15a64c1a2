use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::progress;

/// Maximum number of bytes read and written per loop iteration.
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;
/// Minimum time between two progress lines of one transfer.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Failures with a meaning beyond "an I/O call failed". They travel inside [`Error::source`]
/// and can be recovered with [`Error::kind`].
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("source {0:?} does not exist")]
    SourceMissing(std::path::PathBuf),
    #[error(
        "destination {dst:?} ({dst_len} bytes) is larger than source {src:?} ({src_len} bytes), \
        refusing to resume"
    )]
    DestinationLargerThanSource {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
        src_len: u64,
        dst_len: u64,
    },
    #[error("copy into {0:?} was cancelled")]
    Cancelled(std::path::PathBuf),
    #[error("source {0:?} is neither a file nor a directory")]
    UnsupportedFileType(std::path::PathBuf),
}

/// Error type for copy operations that preserves operation summary even on failure.
///
/// # Logging Convention
/// The Display implementation automatically shows the full error chain, so you can log it
/// with any format specifier:
/// ```ignore
/// tracing::error!("operation failed: {}", &error);   // ✅ Shows full chain
/// tracing::error!("operation failed: {:#}", &error); // ✅ Shows full chain
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }

    #[must_use]
    pub fn kind(&self) -> Option<&ErrorKind> {
        self.source.downcast_ref::<ErrorKind>()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), Some(ErrorKind::Cancelled(_)))
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    pub chunk_size: u64,
    pub report_interval: Duration,
    /// Print progress and completion lines to stdout
    pub report_progress: bool,
    pub fail_early: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            report_interval: DEFAULT_REPORT_INTERVAL,
            report_progress: true,
            fail_early: false,
        }
    }
}

impl Settings {
    /// Chunk size as a buffer length.
    pub fn chunk_len(&self) -> anyhow::Result<usize> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk size must be greater than 0"));
        }
        usize::try_from(self.chunk_size)
            .with_context(|| format!("chunk size {} does not fit in memory", self.chunk_size))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Bytes read from sources and written during this run
    pub bytes_copied: u64,
    /// Bytes found at destinations from earlier runs and not copied again
    pub bytes_skipped: u64,
    pub files_copied: usize,
    /// Subset of `files_copied` that continued from a partial destination
    pub files_resumed: usize,
    /// Files whose destination was already complete
    pub files_unchanged: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_copied: self.bytes_copied + other.bytes_copied,
            bytes_skipped: self.bytes_skipped + other.bytes_skipped,
            files_copied: self.files_copied + other.files_copied,
            files_resumed: self.files_resumed + other.files_resumed,
            files_unchanged: self.files_unchanged + other.files_unchanged,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            bytes skipped: {}\n\
            files copied: {}\n\
            files resumed: {}\n\
            files unchanged: {}\n\
            directories created: {}\n\
            directories unchanged: {}",
            bytesize::ByteSize(self.bytes_copied),
            bytesize::ByteSize(self.bytes_skipped),
            self.files_copied,
            self.files_resumed,
            self.files_unchanged,
            self.directories_created,
            self.directories_unchanged,
        )
    }
}

/// Reads until `buf` is full or the reader is exhausted. A single read on a file may return
/// less than requested, so one chunk can take several calls.
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Streams the rest of the source into `writer`, one durable chunk at a time. Both streams must
/// already be positioned at the session's resume offset.
///
/// The session only advances after a chunk is written and synced, so on any error or
/// cancellation the destination length is the resume offset plus a whole number of chunks.
pub(crate) async fn stream<R: AsyncRead + Unpin>(
    session: &mut progress::TransferSession,
    reader: &mut R,
    writer: &mut tokio::fs::File,
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let chunk_len = settings.chunk_len()?;
    let mut buffer = vec![0u8; session.next_chunk(chunk_len)];
    while !session.is_complete() {
        if cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled(dst.to_owned()).into());
        }
        throttle::get_chunk_token().await;
        let want = session.next_chunk(chunk_len);
        let read = fill_chunk(reader, &mut buffer[..want])
            .await
            .with_context(|| format!("failed reading from {src:?}"))?;
        if read < want {
            return Err(anyhow!(
                "source {:?} ended at byte {} before its expected length of {} bytes",
                src,
                session.position() + read as u64,
                session.total()
            ));
        }
        writer
            .write_all(&buffer[..read])
            .await
            .with_context(|| format!("failed writing to {dst:?}"))?;
        writer
            .flush()
            .await
            .with_context(|| format!("failed flushing {dst:?}"))?;
        writer
            .sync_data()
            .await
            .with_context(|| format!("failed syncing {dst:?} to storage"))?;
        session.advance(read as u64);
        tracing::trace!("chunk of {} bytes committed, at {}", read, session.position());
        if let Some(snapshot) = session.poll_report(Instant::now()) {
            tracing::debug!("{}", &snapshot);
            if settings.report_progress {
                println!("{snapshot}");
            }
        }
    }
    Ok(())
}

/// Copies `src` to `dst`, continuing from whatever prefix of `src` is already present at `dst`.
///
/// A missing destination is created (with its parent directories) as an empty file first. The
/// destination is never truncated. Its current length is taken as the resume offset without
/// verifying that those bytes actually came from `src`.
#[instrument(skip(cancel))]
pub async fn copy_file(
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<Summary, Error> {
    settings
        .chunk_len()
        .map_err(|err| Error::new(err, Default::default()))?;
    if cancel.is_cancelled() {
        return Err(Error::new(
            ErrorKind::Cancelled(dst.to_owned()).into(),
            Default::default(),
        ));
    }
    throttle::get_entry_token().await;
    tracing::debug!("opening 'src' for reading");
    let mut reader = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("cannot open {src:?} for reading"))
        .map_err(|err| Error::new(err, Default::default()))?;
    let src_metadata = reader
        .metadata()
        .await
        .with_context(|| format!("failed reading metadata from {src:?}"))
        .map_err(|err| Error::new(err, Default::default()))?;
    if !src_metadata.is_file() {
        return Err(Error::new(
            ErrorKind::UnsupportedFileType(src.to_owned()).into(),
            Default::default(),
        ));
    }
    let dst_existed = tokio::fs::try_exists(dst)
        .await
        .with_context(|| format!("failed checking if {dst:?} exists"))
        .map_err(|err| Error::new(err, Default::default()))?;
    if !dst_existed {
        tracing::info!("creating file {:?}", dst);
        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create directory {parent:?}"))
                .map_err(|err| Error::new(err, Default::default()))?;
        }
    }
    let mut writer = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dst)
        .await
        .with_context(|| format!("cannot open {dst:?} for writing"))
        .map_err(|err| Error::new(err, Default::default()))?;
    let dst_len = writer
        .metadata()
        .await
        .with_context(|| format!("failed reading metadata from {dst:?}"))
        .map_err(|err| Error::new(err, Default::default()))?
        .len();
    let src_len = src_metadata.len();
    tracing::info!(
        "copying file {:?} to {:?}, size: {}",
        src,
        dst,
        bytesize::ByteSize(src_len)
    );
    let Some(mut session) =
        progress::TransferSession::new(src_len, dst_len, settings.report_interval, Instant::now())
    else {
        return Err(Error::new(
            ErrorKind::DestinationLargerThanSource {
                src: src.to_owned(),
                dst: dst.to_owned(),
                src_len,
                dst_len,
            }
            .into(),
            Default::default(),
        ));
    };
    if dst_existed && session.is_complete() {
        tracing::debug!("'dst' already holds all {} bytes, skipping", src_len);
        return Ok(Summary {
            bytes_skipped: src_len,
            files_unchanged: 1,
            ..Default::default()
        });
    }
    let offset = session.resume_offset();
    reader
        .seek(std::io::SeekFrom::Start(offset))
        .await
        .with_context(|| format!("failed seeking {src:?} to byte {offset}"))
        .map_err(|err| Error::new(err, Default::default()))?;
    writer
        .seek(std::io::SeekFrom::Start(offset))
        .await
        .with_context(|| format!("failed seeking {dst:?} to byte {offset}"))
        .map_err(|err| Error::new(err, Default::default()))?;
    tracing::info!("position in source set to byte {}", offset);
    let streamed = stream(
        &mut session,
        &mut reader,
        &mut writer,
        src,
        dst,
        settings,
        cancel,
    )
    .await;
    let completion = session.finish(Instant::now());
    let mut summary = Summary {
        bytes_copied: completion.transferred,
        bytes_skipped: offset,
        ..Default::default()
    };
    streamed.map_err(|err| Error::new(err, summary))?;
    tracing::info!("{}", &completion);
    if settings.report_progress {
        println!("{completion}");
    }
    summary.files_copied = 1;
    if offset > 0 {
        summary.files_resumed = 1;
    }
    Ok(summary)
}
