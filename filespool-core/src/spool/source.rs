use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::SpoolSource;
use crate::error::SpoolError;
use crate::record::FileRecord;

/// A directory of regular files. Subdirectories, dotfiles and
/// anything that is not a regular file are ignored.
#[derive(Debug, Clone)]
pub struct DirSource {
    path: PathBuf,
}

impl DirSource {
    /// Open an existing directory.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SpoolError> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            SpoolError::Config(format!(
                "could not stat source directory {}: {e}",
                path.display()
            ))
        })?;
        if !meta.is_dir() {
            return Err(SpoolError::Config(format!(
                "source path exists and is not a directory: {}",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the pending files, sorted.
    pub async fn list(&self) -> Result<Vec<String>, SpoolError> {
        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| SpoolError::spool(&self.path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SpoolError::spool(&self.path, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                debug!("skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SpoolError::spool(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl SpoolSource for DirSource {
    async fn scan(&self) -> Result<Vec<FileRecord>, SpoolError> {
        let mut spool = Vec::new();
        for name in self.list().await? {
            spool.push(self.read(&name).await?);
        }
        Ok(spool)
    }

    async fn read(&self, name: &str) -> Result<FileRecord, SpoolError> {
        let path = self.path.join(name);
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| SpoolError::spool(path, e))?;
        Ok(FileRecord::with_content(name, content))
    }

    async fn delete(&self, name: &str) -> Result<(), SpoolError> {
        let path = self.path.join(name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| SpoolError::spool(path, e))
    }
}
