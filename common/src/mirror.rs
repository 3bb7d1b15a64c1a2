use std::os::unix::fs::MetadataExt;

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::copy::{self, Error, Settings, Summary};

/// (device, inode) of a source directory.
type DirId = (u64, u64);

/// Directory pair waiting to be mirrored.
#[derive(Debug)]
struct PendingDir {
    src: std::path::PathBuf,
    dst: std::path::PathBuf,
    /// Source directories above `src`, used to detect symlinks looping back up the tree
    ancestors: Vec<DirId>,
}

/// Ensures `dst` exists as a directory. Returns the summary entry for it.
async fn ensure_dir(dst: &std::path::Path) -> anyhow::Result<Summary> {
    match tokio::fs::metadata(dst).await {
        Ok(metadata) if metadata.is_dir() => {
            tracing::debug!("'dst' directory {:?} already exists", dst);
            Ok(Summary {
                directories_unchanged: 1,
                ..Default::default()
            })
        }
        Ok(_) => Err(anyhow!(
            "destination {:?} exists and is not a directory",
            dst
        )),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dst)
                .await
                .with_context(|| format!("cannot create directory {dst:?}"))?;
            Ok(Summary {
                directories_created: 1,
                ..Default::default()
            })
        }
        Err(error) => {
            Err(error).with_context(|| format!("failed reading metadata from {dst:?}"))
        }
    }
}

/// Copies the files directly inside `dir.src` into `dir.dst` and queues the subdirectories on
/// `pending`. Subdirectories are queued even if some files failed.
async fn mirror_level(
    dir: PendingDir,
    settings: &Settings,
    cancel: &CancellationToken,
    pending: &mut Vec<PendingDir>,
) -> Result<Summary, Error> {
    let PendingDir {
        src,
        dst,
        mut ancestors,
    } = dir;
    let (src, dst) = (src.as_path(), dst.as_path());
    let src_metadata = match tokio::fs::metadata(src).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            // removed while we were traversing, nothing left to copy
            tracing::warn!("source directory {:?} no longer exists, skipping", src);
            return Ok(Summary::default());
        }
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from {src:?}")),
                Default::default(),
            ));
        }
    };
    let id = (src_metadata.dev(), src_metadata.ino());
    if ancestors.contains(&id) {
        tracing::warn!(
            "skipping {:?}, it links back to a directory that is already being copied",
            src
        );
        return Ok(Summary::default());
    }
    ancestors.push(id);
    let mut summary = ensure_dir(dst)
        .await
        .map_err(|err| Error::new(err, Default::default()))?;
    let mut entries = tokio::fs::read_dir(src)
        .await
        .with_context(|| format!("cannot open directory {src:?} for reading"))
        .map_err(|err| Error::new(err, summary))?;
    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing src directory {src:?}"))
        .map_err(|err| Error::new(err, summary))?
    {
        let entry_path = entry.path();
        // follow symlinks: a link to a file is copied as a file, a link to a directory mirrored
        match tokio::fs::metadata(&entry_path).await {
            Ok(metadata) if metadata.is_file() => files.push(entry.file_name()),
            Ok(metadata) if metadata.is_dir() => subdirs.push(entry.file_name()),
            Ok(metadata) => {
                tracing::warn!(
                    "skipping {:?}, unsupported file type: {:?}",
                    entry_path,
                    metadata.file_type()
                );
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("skipping {:?}, it vanished or is a dangling link", entry_path);
            }
            Err(error) => {
                return Err(Error::new(
                    anyhow::Error::new(error)
                        .context(format!("failed reading metadata from {entry_path:?}")),
                    summary,
                ));
            }
        }
    }
    // ReadDir holds a file descriptor, release it before the (possibly long) copies
    drop(entries);
    files.sort();
    subdirs.sort();
    // pushed in reverse so that they are popped in name order
    for name in subdirs.iter().rev() {
        pending.push(PendingDir {
            src: src.join(name),
            dst: dst.join(name),
            ancestors: ancestors.clone(),
        });
    }
    let mut success = true;
    for name in files {
        let src_path = src.join(&name);
        let dst_path = dst.join(&name);
        match copy::copy_file(&src_path, &dst_path, settings, cancel).await {
            Ok(file_summary) => summary = summary + file_summary,
            Err(error) => {
                summary = summary + error.summary;
                if settings.fail_early || error.is_cancelled() {
                    return Err(Error::new(error.source, summary));
                }
                tracing::error!("copy: {:?} -> {:?} failed with: {:#}", src_path, dst_path, &error);
                success = false;
            }
        }
    }
    if !success {
        return Err(Error::new(
            anyhow!("copy: {:?} -> {:?} failed for some files", src, dst),
            summary,
        ));
    }
    Ok(summary)
}

/// Mirrors the tree rooted at `src` into `dst`, copying every file with
/// [`copy_file`](crate::copy::copy_file) so that partially copied files are resumed.
///
/// A missing `src` is not an error. Failures of individual files or directories are logged and
/// the rest of the tree is still copied (unless `fail_early` is set); the returned error then
/// carries the summary of everything that succeeded.
#[instrument(skip(cancel))]
pub async fn copy_directory(
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<Summary, Error> {
    let mut summary = Summary::default();
    let mut success = true;
    let mut pending = vec![PendingDir {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        ancestors: Vec::new(),
    }];
    while let Some(dir) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(Error::new(
                copy::ErrorKind::Cancelled(dir.dst).into(),
                summary,
            ));
        }
        throttle::get_entry_token().await;
        tracing::debug!("mirroring {:?} -> {:?}", &dir.src, &dir.dst);
        match mirror_level(dir, settings, cancel, &mut pending).await {
            Ok(level_summary) => summary = summary + level_summary,
            Err(error) => {
                summary = summary + error.summary;
                if settings.fail_early || error.is_cancelled() {
                    return Err(Error::new(error.source, summary));
                }
                tracing::error!("{:#}", &error);
                success = false;
            }
        }
    }
    if !success {
        return Err(Error::new(
            anyhow!("copy: {:?} -> {:?} failed!", src, dst),
            summary,
        ));
    }
    Ok(summary)
}
