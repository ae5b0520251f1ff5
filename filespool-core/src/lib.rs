//! # filespool-core
//!
//! Library behind the `filespool` binary: moves files from a spool
//! directory on one host into a target directory on another, over a
//! small line protocol, optionally inside mutual TLS.
//!
//! This crate contains:
//! - **Protocol types**: `Command`, `Ack`, `FileRecord`
//! - **Codec**: `SpoolCodec`, mixing `\n` command lines with
//!   length-prefixed bincode records, for `tokio_util` framing
//! - **TLS**: certificate loading and the client-name allow-list
//! - **Spool**: `SpoolSource` / `SpoolSink` traits and directory impls
//! - **Receiver**: accept loop plus one command loop per connection
//! - **Sender**: reconnecting client that pushes files and deletes them
//!   once acknowledged
//! - **State**: phase enums for both engines
//! - **Task**: `SessionPool` for tracking per-connection tasks
//! - **Error**: `SpoolError`, a `thiserror`-based error type

pub mod codec;
pub mod error;
pub mod message;
pub mod network;
pub mod receiver;
pub mod record;
pub mod sender;
pub mod spool;
pub mod state;
pub mod task;
pub mod tls;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_MAX_RECORD_SIZE, Frame, SpoolCodec};
pub use error::SpoolError;
pub use message::{Ack, Command};
pub use network::DEFAULT_PORT;
pub use receiver::{Receiver, ReceiverTimings, TlsGate};
pub use record::FileRecord;
pub use sender::{Sender, SenderTimings};
pub use spool::{DirSink, DirSource, SpoolSink, SpoolSource};
pub use state::{ConnectionPhase, EnginePhase, SessionEnd, SessionPhase};
pub use task::{SessionId, SessionPool};
pub use tls::{AllowList, PeerIdentity, TlsSettings};
