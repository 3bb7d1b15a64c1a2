//! Top-level list of (source, destination) pairs to copy
//!
//! Pairs are processed one at a time in insertion order. Each source is dispatched by type:
//! files go to [`copy_file`](crate::copy::copy_file), directories to
//! [`copy_directory`](crate::mirror::copy_directory).
//!
//! A worklist can also be loaded from a JSON file holding an array of pairs:
//!
//! ```json
//! [
//!     { "src": "/mnt/share/images", "dst": "/data/images" },
//!     { "src": "/mnt/share/db.dump", "dst": "/data/db.dump" }
//! ]
//! ```

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::copy::{self, Error, ErrorKind, Settings, Summary};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pair {
    pub src: std::path::PathBuf,
    pub dst: std::path::PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Worklist {
    pairs: std::collections::VecDeque<Pair>,
}

impl Worklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, src: impl Into<std::path::PathBuf>, dst: impl Into<std::path::PathBuf>) {
        self.pairs.push_back(Pair {
            src: src.into(),
            dst: dst.into(),
        });
    }

    pub fn append(&mut self, other: Worklist) {
        self.pairs.extend(other.pairs);
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid worklist, expected an array of {\"src\", \"dst\"} objects")
    }

    pub fn from_json_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading worklist {path:?}"))?;
        Self::from_json(&json).with_context(|| format!("failed parsing worklist {path:?}"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.iter()
    }

    /// Copies every pair. A failed pair is logged and the remaining pairs are still processed
    /// unless `fail_early` is set or the copy was cancelled.
    #[instrument(skip(self, cancel))]
    pub async fn run(
        mut self,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Result<Summary, Error> {
        let total = self.pairs.len();
        let mut failed = 0;
        let mut summary = Summary::default();
        while let Some(pair) = self.pairs.pop_front() {
            match copy_entry(&pair.src, &pair.dst, settings, cancel).await {
                Ok(pair_summary) => summary = summary + pair_summary,
                Err(error) => {
                    summary = summary + error.summary;
                    if settings.fail_early || error.is_cancelled() {
                        return Err(Error::new(error.source, summary));
                    }
                    tracing::error!("{:?} -> {:?}: {:#}", &pair.src, &pair.dst, &error);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(Error::new(
                anyhow!("{} of {} copies failed", failed, total),
                summary,
            ));
        }
        Ok(summary)
    }
}

impl FromIterator<Pair> for Worklist {
    fn from_iter<T: IntoIterator<Item = Pair>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Copies a single top-level source, dispatching on whether it is a file or a directory.
#[instrument(skip(cancel))]
pub async fn copy_entry(
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<Summary, Error> {
    let src_metadata = match tokio::fs::metadata(src).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::new(
                ErrorKind::SourceMissing(src.to_owned()).into(),
                Default::default(),
            ));
        }
        Err(error) => {
            return Err(Error::new(
                anyhow::Error::new(error).context(format!("failed reading metadata from {src:?}")),
                Default::default(),
            ));
        }
    };
    if src_metadata.is_file() {
        copy::copy_file(src, dst, settings, cancel).await
    } else if src_metadata.is_dir() {
        crate::mirror::copy_directory(src, dst, settings, cancel).await
    } else {
        Err(Error::new(
            ErrorKind::UnsupportedFileType(src.to_owned()).into(),
            Default::default(),
        ))
    }
}
