use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::SpoolSink;
use crate::error::SpoolError;
use crate::record::FileRecord;

/// Writes records as plain files into one directory.
///
/// Each record lands in a hidden staging file with a fixed-length
/// random name first, is synced, and is then renamed into place. The
/// directory is synced after the rename.
#[derive(Debug, Clone)]
pub struct DirSink {
    path: PathBuf,
}

impl DirSink {
    /// Use `path` as the target, creating it when absent.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, SpoolError> {
        let path = path.into();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SpoolError::Config(format!(
                    "target path {} exists and is not a directory",
                    path.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&path)
                    .await
                    .map_err(|e| SpoolError::spool(&path, e))?;
                tracing::info!("created target directory {}", path.display());
            }
            Err(e) => return Err(SpoolError::spool(&path, e)),
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty staging file next to the targets.
    async fn stage(&self) -> Result<tempfile::NamedTempFile, SpoolError> {
        let dir = self.path.clone();
        tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(".")
                .suffix(".tmp")
                .tempfile_in(&dir)
        })
        .await
        .map_err(|e| SpoolError::Other(format!("staging task failed: {e}")))?
        .map_err(|e| SpoolError::spool(&self.path, e))
    }

    /// Flush the directory entry so a completed rename survives a crash.
    #[cfg(unix)]
    async fn sync_dir(&self) -> Result<(), SpoolError> {
        let dir = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| SpoolError::spool(&self.path, e))?;
        dir.sync_all()
            .await
            .map_err(|e| SpoolError::spool(&self.path, e))
    }

    #[cfg(not(unix))]
    async fn sync_dir(&self) -> Result<(), SpoolError> {
        Ok(())
    }
}

#[async_trait]
impl SpoolSink for DirSink {
    async fn write(&self, record: &FileRecord) -> Result<(), SpoolError> {
        record.validate_name()?;
        let target = self.path.join(record.name());

        // Dropping `staging` removes the file on every early return.
        let (file, staging) = self.stage().await?.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let written = match file.write_all(record.content()).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = written {
            return Err(SpoolError::spool(staging.to_path_buf(), e));
        }

        let renamed = target.clone();
        tokio::task::spawn_blocking(move || staging.persist(&renamed))
            .await
            .map_err(|e| SpoolError::Other(format!("rename task failed: {e}")))?
            .map_err(|e| SpoolError::spool(target, e.error))?;

        self.sync_dir().await
    }
}
