//! Phases of the sender's single outbound connection.
//!
//! Every transition goes through [`ConnectionPhase::advance`], which
//! checks it against the graph below and reports illegal moves as
//! errors.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::SpoolError;

/// ```text
///  Disconnected ──► Dialing ──► Handshaking ──► Connected
///       ▲              │  └─────────(plain)───────►│
///       │              ▼             ▼             ▼
///       └──────────────┴──── Closing ◄─────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    /// TCP connect in flight.
    Dialing,
    /// TCP is up, TLS handshake in flight.
    Handshaking,
    Connected {
        since: Instant,
        /// Whether the link is wrapped in TLS.
        secure: bool,
    },
    /// Flushing and shutting down the transport.
    Closing,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Dialing => write!(f, "Dialing"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Connected { secure: true, .. } => write!(f, "Connected (TLS)"),
            Self::Connected { secure: false, .. } => write!(f, "Connected"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Time spent connected so far, if connected.
    pub fn uptime(&self) -> Option<Duration> {
        match self {
            Self::Connected { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }

    fn allows(&self, next: &Self) -> bool {
        use ConnectionPhase::*;
        matches!(
            (self, next),
            (Disconnected, Dialing)
                | (Dialing, Handshaking)
                | (Dialing, Connected { secure: false, .. })
                | (Handshaking, Connected { secure: true, .. })
                | (Dialing | Handshaking | Connected { .. }, Closing)
                | (Dialing | Handshaking | Closing, Disconnected)
        )
    }

    /// Move to `next` if the graph permits it.
    pub fn advance(&mut self, next: Self) -> Result<(), SpoolError> {
        if !self.allows(&next) {
            return Err(SpoolError::Other(format!(
                "connection cannot go from {self} to {next}"
            )));
        }
        *self = next;
        Ok(())
    }

    pub fn begin_dial(&mut self) -> Result<(), SpoolError> {
        self.advance(Self::Dialing)
    }

    pub fn begin_handshake(&mut self) -> Result<(), SpoolError> {
        self.advance(Self::Handshaking)
    }

    /// Plain links connect straight from `Dialing`; TLS links from
    /// `Handshaking`.
    pub fn established(&mut self) -> Result<(), SpoolError> {
        let secure = matches!(self, Self::Handshaking);
        self.advance(Self::Connected {
            since: Instant::now(),
            secure,
        })
    }

    pub fn begin_close(&mut self) -> Result<(), SpoolError> {
        self.advance(Self::Closing)
    }

    /// Back to `Disconnected` after a close or a failed attempt.
    pub fn closed(&mut self) -> Result<(), SpoolError> {
        self.advance(Self::Disconnected)
    }

    /// Drop to `Disconnected` unconditionally.
    pub fn reset(&mut self) {
        *self = Self::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(secure: bool) -> ConnectionPhase {
        ConnectionPhase::Connected {
            since: Instant::now(),
            secure,
        }
    }

    #[test]
    fn tls_lifecycle() {
        let mut phase = ConnectionPhase::default();
        phase.begin_dial().unwrap();
        phase.begin_handshake().unwrap();
        phase.established().unwrap();
        assert!(matches!(phase, ConnectionPhase::Connected { secure: true, .. }));
        assert!(phase.uptime().is_some());

        phase.begin_close().unwrap();
        assert_eq!(phase, ConnectionPhase::Closing);
        phase.closed().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn plain_link_connects_from_dialing() {
        let mut phase = ConnectionPhase::default();
        phase.begin_dial().unwrap();
        phase.established().unwrap();
        assert_eq!(phase.to_string(), "Connected");
    }

    #[test]
    fn failed_dial_goes_back_to_disconnected() {
        let mut phase = ConnectionPhase::Dialing;
        phase.closed().unwrap();
        assert!(phase.is_disconnected());
        assert!(phase.uptime().is_none());
    }

    #[test]
    fn illegal_moves_are_errors() {
        let mut phase = connected(true);
        assert!(phase.begin_dial().is_err());
        assert!(phase.closed().is_err());
        assert!(phase.is_connected());

        let mut idle = ConnectionPhase::Disconnected;
        assert!(idle.begin_handshake().is_err());
        assert!(idle.established().is_err());
        assert!(idle.begin_close().is_err());
        assert!(idle.is_disconnected());
    }

    #[test]
    fn reset_from_anywhere() {
        let mut phase = connected(false);
        phase.reset();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn display_marks_tls() {
        assert_eq!(connected(true).to_string(), "Connected (TLS)");
        assert_eq!(ConnectionPhase::Closing.to_string(), "Closing");
    }
}
