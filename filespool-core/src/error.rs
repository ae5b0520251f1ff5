//! Domain-specific error types for filespool.
//!
//! All fallible operations return `Result<T, SpoolError>`.
//! Startup code surfaces configuration errors; everything else is
//! contained in the session or engine that produced it.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the filespool transport.
#[derive(Debug, Error)]
pub enum SpoolError {
    // ── Configuration Errors ─────────────────────────────────────
    /// A required setting is missing or a file could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// rustls rejected the configuration or the handshake.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The peer closed the stream while a reply was expected.
    #[error("connection closed by peer")]
    ChannelClosed,

    /// An operation needed a connection but none is established.
    #[error("not connected")]
    NotConnected,

    // ── Authentication Errors ────────────────────────────────────
    /// The client presented no certificate.
    #[error("peer presented no certificate")]
    MissingPeerCertificate,

    /// The client certificate could not be parsed.
    #[error("invalid certificate: {0}")]
    Certificate(String),

    /// None of the certificate names is on the allow-list.
    #[error("peer names {names:?} are not allowed")]
    Unauthorized { names: Vec<String> },

    // ── Protocol Errors ──────────────────────────────────────────
    /// A file record could not be decoded from the stream.
    #[error("decode error: {0}")]
    Decode(String),

    /// A command or ack line could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A line exceeded the codec limit without a newline.
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    /// A record exceeded the configured maximum size.
    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: u64, max: u64 },

    /// The receiver did not acknowledge a record with `OK`.
    #[error("peer did not acknowledge file and returned: {0}")]
    UnexpectedAck(String),

    // ── Persistence Errors ───────────────────────────────────────
    /// The record name would escape the spool directory.
    #[error("invalid record name: {0:?}")]
    InvalidRecordName(String),

    /// A spool directory operation failed.
    #[error("spool error on {}: {source}", path.display())]
    Spool {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl SpoolError {
    /// Wraps an I/O error with the spool path it happened on.
    pub fn spool(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpoolError::Spool {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for read deadline expiries, which callers retry.
    pub fn is_timeout(&self) -> bool {
        match self {
            SpoolError::Timeout(_) => true,
            SpoolError::Connection(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for SpoolError {
    fn from(s: String) -> Self {
        SpoolError::Other(s)
    }
}

impl From<&str> for SpoolError {
    fn from(s: &str) -> Self {
        SpoolError::Other(s.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for SpoolError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SpoolError::Decode(e.to_string())
    }
}
