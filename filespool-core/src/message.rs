//! Command and acknowledgement vocabulary of the line protocol.
//!
//! Uses proper enums with `FromStr`: unknown lines are reported as
//! errors, never panics. Matching is exact and case-sensitive.

use std::fmt;
use std::str::FromStr;

use crate::error::SpoolError;

// ── Command ──────────────────────────────────────────────────────

/// Commands sent from sender to receiver, one per `\n`-terminated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// An encoded file record follows immediately.
    SendFile,
    /// Does nothing.
    Noop,
    /// Resets the receiver's idle timer.
    Keepalive,
}

impl Command {
    /// The exact wire spelling, without the trailing newline.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SendFile => "SEND_FILE",
            Command::Noop => "NOOP",
            Command::Keepalive => "KEEPALIVE",
        }
    }
}

impl FromStr for Command {
    type Err = SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEND_FILE" => Ok(Command::SendFile),
            "NOOP" => Ok(Command::Noop),
            "KEEPALIVE" => Ok(Command::Keepalive),
            other => Err(SpoolError::InvalidCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Ack ──────────────────────────────────────────────────────────

/// Receiver reply to a `SEND_FILE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ack {
    /// The record is durably stored.
    Ok,
    /// The record could not be stored.
    Err,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Ok => "OK",
            Ack::Err => "ERR",
        }
    }
}

impl FromStr for Ack {
    type Err = SpoolError;

    fn from_str(s: &str) -> Result<Self, SpoolError> {
        match s {
            "OK" => Ok(Ack::Ok),
            "ERR" => Ok(Ack::Err),
            other => Err(SpoolError::UnexpectedAck(other.to_string())),
        }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
