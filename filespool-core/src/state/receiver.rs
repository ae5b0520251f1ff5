//! Receiver-side phases: the engine as a whole and each session.

use std::fmt;

/// Lifecycle of the receiver engine.
///
/// ```text
///  Idle ──open──► Running ──shutdown──► Draining ──all sessions done──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    /// Not bound yet.
    #[default]
    Idle,
    /// Listening and accepting connections.
    Running,
    /// Listener closed; waiting for live sessions.
    Draining,
    /// Every session has finished.
    Stopped,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Lifecycle of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Handshaking,
    Authorizing,
    CommandLoop,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Authorizing => write!(f, "Authorizing"),
            Self::CommandLoop => write!(f, "CommandLoop"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Why a session's command loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the stream.
    Eof,
    /// No command arrived within the idle window.
    IdleTimeout,
    /// The receiver is shutting down.
    Shutdown,
    /// A read, decode, write or persistence failure.
    Failed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "end of stream"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
