//! Transport security: mutual TLS configuration and peer authorization.
//!
//! The receiver always demands a client certificate signed by the
//! configured CA, then checks the certificate names against an
//! [`AllowList`]. The sender presents its own certificate and
//! verifies the receiver against the same CA. Without a CA bundle both
//! sides trust the system store instead.

mod config;
mod identity;

pub use config::{TlsSettings, load_ca, load_certs, load_private_key, load_system_roots};
pub use identity::{AllowList, PeerIdentity};
