//! Transient image hosting.
//!
//! Uploaded images are written to a directory served under `/uploads` and
//! deleted a fixed time later, whether or not anything fetched them. Each
//! deletion is a tracked task; [`UploadRelay::shutdown`] cancels the waits and
//! deletes every pending upload before returning.

use blogpush_core::images::{self, LOCAL_SEGMENT};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// URL prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// An image held by the relay.
#[derive(Debug, Clone, Serialize)]
pub struct StoredUpload {
    /// Generated file name
    pub file_name: String,
    /// Path to fetch the file from, relative to the server root
    pub public_path: String,
    /// When the file is deleted
    pub expires_at: DateTime<Utc>,
}

/// Pending deletions, with a handle to hurry them up on shutdown.
#[derive(Debug, Default)]
pub struct DeletionSchedule {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl DeletionSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete `path` after `delay`, or as soon as the schedule shuts down.
    pub fn schedule(&self, path: PathBuf, delay: Duration) {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    debug!("Shutdown: deleting {} early", path.display());
                }
            }
            delete_upload(&path).await;
        });
    }

    /// Number of deletions not yet carried out.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Run every pending deletion now and wait for all of them.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn delete_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Deleted expired upload {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Upload {} already gone", path.display());
        }
        Err(e) => error!("Failed to delete upload {}: {}", path.display(), e),
    }
}

/// Write `bytes` to the freshly created `path`; a failed write removes the
/// partial file.
async fn write_upload<W: AsyncWrite + Unpin>(
    mut out: W,
    path: &Path,
    bytes: &[u8],
) -> std::io::Result<()> {
    let written = match out.write_all(bytes).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(out);
        warn!("Writing upload {} failed: {}", path.display(), e);
        delete_upload(path).await;
        return Err(e);
    }
    Ok(())
}

/// Replace anything but letters, digits, `.`, `-` and `_` in the last path
/// component of `original`.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Stores uploads and schedules their deletion.
#[derive(Debug)]
pub struct UploadRelay {
    dir: PathBuf,
    ttl: Duration,
    schedule: DeletionSchedule,
}

impl UploadRelay {
    /// Open the relay, creating `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>, ttl: Duration) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            ttl,
            schedule: DeletionSchedule::new(),
        })
    }

    /// Directory holding the uploads.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lifetime of each upload.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Pending deletions.
    pub fn schedule(&self) -> &DeletionSchedule {
        &self.schedule
    }

    /// Write `bytes` under a name derived from the arrival time and
    /// `original_name`, and schedule its deletion.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> std::io::Result<StoredUpload> {
        let now = Utc::now();
        let name = sanitize_file_name(original_name);
        let stamp = now.timestamp_millis();

        let mut attempt = 0u32;
        let (file_name, file) = loop {
            let candidate = if attempt == 0 {
                format!("{stamp}-{name}")
            } else {
                format!("{stamp}-{attempt}-{name}")
            };
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&candidate))
                .await
            {
                Ok(file) => break (candidate, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 100 => attempt += 1,
                Err(e) => return Err(e),
            }
        };
        let path = self.dir.join(&file_name);
        write_upload(file, &path, bytes).await?;
        self.schedule.schedule(path, self.ttl);

        let expires_at = now
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        info!(
            "Stored upload {} ({} bytes, expires {})",
            file_name,
            bytes.len(),
            expires_at
        );
        Ok(StoredUpload {
            public_path: format!("{PUBLIC_PREFIX}/{file_name}"),
            file_name,
            expires_at,
        })
    }

    /// Local file behind a relay URL, if the URL points at one that still
    /// exists.
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        if !url.contains(LOCAL_SEGMENT) {
            return None;
        }
        let name = images::file_name(url);
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        let path = self.dir.join(name);
        path.is_file().then_some(path)
    }

    /// Handle files left behind by a previous process: delete the expired
    /// ones and schedule the rest for their remaining lifetime. Returns the
    /// number deleted.
    pub async fn sweep(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or_default();
            if age >= self.ttl {
                delete_upload(&entry.path()).await;
                removed += 1;
            } else {
                self.schedule.schedule(entry.path(), self.ttl - age);
            }
        }
        Ok(removed)
    }

    /// Delete every pending upload now.
    pub async fn shutdown(&self) {
        info!(
            "Deleting {} pending uploads before shutdown",
            self.schedule.pending()
        );
        self.schedule.shutdown().await;
    }
}
