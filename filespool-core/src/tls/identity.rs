//! Peer identity extraction and the allow-list gate.

use rustls::ServerConnection;
use x509_parser::extensions::GeneralName;

use crate::error::SpoolError;

/// Names a client certificate claims: common name(s) first, then SAN
/// DNS names, in certificate order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerIdentity {
    names: Vec<String>,
}

impl PeerIdentity {
    /// Parse a DER-encoded leaf certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, SpoolError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| SpoolError::Certificate(e.to_string()))?;

        let mut names = Vec::new();
        for cn in cert.subject().iter_common_name() {
            match cn.as_str() {
                Ok(name) if !name.is_empty() => names.push(name.to_string()),
                Ok(_) => {}
                Err(e) => tracing::debug!("skipping undecodable common name: {e}"),
            }
        }

        let san = cert
            .subject_alternative_name()
            .map_err(|e| SpoolError::Certificate(e.to_string()))?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                if let GeneralName::DNSName(dns) = name {
                    names.push(dns.to_string());
                }
            }
        }

        Ok(Self { names })
    }

    /// Identity of the leaf certificate presented on `conn`.
    pub fn from_connection(conn: &ServerConnection) -> Result<Self, SpoolError> {
        let leaf = conn
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(SpoolError::MissingPeerCertificate)?;
        Self::from_der(leaf.as_ref())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

// ── AllowList ────────────────────────────────────────────────────

/// Peer names permitted to connect. Matching is exact and
/// case-sensitive; there are no wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowList {
    names: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The first allow-list entry that one of the peer's names
    /// matches, if any.
    pub fn authorize(&self, peer: &PeerIdentity) -> Option<&str> {
        self.names
            .iter()
            .find(|allowed| peer.names().iter().any(|name| name == *allowed))
            .map(String::as_str)
    }

    /// Like [`authorize`](Self::authorize) but as a `Result`.
    pub fn check(&self, peer: &PeerIdentity) -> Result<&str, SpoolError> {
        self.authorize(peer).ok_or_else(|| SpoolError::Unauthorized {
            names: peer.names().to_vec(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn cert_der(cn: Option<&str>, sans: &[&str]) -> Vec<u8> {
        let mut params =
            CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.distinguished_name = DistinguishedName::new();
        if let Some(cn) = cn {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    #[test]
    fn names_from_certificate() {
        let der = cert_der(Some("alice"), &["alice.example.com", "alice.internal"]);
        let peer = PeerIdentity::from_der(&der).unwrap();
        assert_eq!(
            peer.names(),
            ["alice", "alice.example.com", "alice.internal"]
        );
    }

    #[test]
    fn certificate_without_common_name() {
        let der = cert_der(None, &["only-san.example.com"]);
        let peer = PeerIdentity::from_der(&der).unwrap();
        assert_eq!(peer.names(), ["only-san.example.com"]);
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        assert!(matches!(
            PeerIdentity::from_der(b"not a certificate"),
            Err(SpoolError::Certificate(_))
        ));
    }

    #[test]
    fn allow_list_matches_san() {
        let peer = PeerIdentity::from_der(&cert_der(Some("alice"), &["alice.example.com"])).unwrap();
        let allow = AllowList::new(["bob", "alice.example.com"]);
        assert_eq!(allow.authorize(&peer), Some("alice.example.com"));
        assert!(allow.check(&peer).is_ok());
    }

    #[test]
    fn allow_list_rejects_unknown_peer() {
        let peer = PeerIdentity::from_der(&cert_der(Some("alice"), &["alice.example.com"])).unwrap();
        let allow = AllowList::new(["bob"]);
        assert_eq!(allow.authorize(&peer), None);
        match allow.check(&peer) {
            Err(SpoolError::Unauthorized { names }) => {
                assert_eq!(names, ["alice", "alice.example.com"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn allow_list_is_exact_and_case_sensitive() {
        let peer = PeerIdentity::from_der(&cert_der(Some("Alice"), &["alice.example.com"])).unwrap();
        assert_eq!(AllowList::new(["alice"]).authorize(&peer), None);
        assert_eq!(AllowList::new(["*.example.com"]).authorize(&peer), None);
        assert_eq!(AllowList::new(["example.com"]).authorize(&peer), None);
        assert_eq!(AllowList::new(["Alice"]).authorize(&peer), Some("Alice"));
    }

    #[test]
    fn allow_list_prefers_its_own_order() {
        let peer = PeerIdentity::from_der(&cert_der(Some("alice"), &["alice.example.com"])).unwrap();
        let allow = AllowList::new(["alice.example.com", "alice"]);
        assert_eq!(allow.authorize(&peer), Some("alice.example.com"));
    }
}
