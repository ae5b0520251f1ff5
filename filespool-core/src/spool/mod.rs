//! Spool directories: where the sender reads from and the receiver
//! writes to.

mod sink;
mod source;

use async_trait::async_trait;

use crate::error::SpoolError;
use crate::record::FileRecord;

pub use sink::DirSink;
pub use source::DirSource;

/// Files waiting to be sent.
#[async_trait]
pub trait SpoolSource: Send + Sync {
    /// Every pending file, in listing order.
    async fn scan(&self) -> Result<Vec<FileRecord>, SpoolError>;

    /// Read one file by name.
    async fn read(&self, name: &str) -> Result<FileRecord, SpoolError>;

    /// Remove one file after the peer acknowledged it.
    async fn delete(&self, name: &str) -> Result<(), SpoolError>;
}

/// Destination for received files.
#[async_trait]
pub trait SpoolSink: Send + Sync {
    /// Persist `record`. Returns only once the content is durable.
    async fn write(&self, record: &FileRecord) -> Result<(), SpoolError>;
}
