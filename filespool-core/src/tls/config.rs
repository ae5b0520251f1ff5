//! Building rustls configurations from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::SpoolError;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn open(path: &Path) -> Result<BufReader<File>, SpoolError> {
    File::open(path).map(BufReader::new).map_err(|e| {
        SpoolError::Config(format!(
            "could not open path for reading: {}: {e}",
            path.display()
        ))
    })
}

/// Load every PEM certificate in `path`. An empty file is an error.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, SpoolError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            SpoolError::Config(format!(
                "could not load certificates from: {}: {e}",
                path.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(SpoolError::Config(format!(
            "could not load certificates from: {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) in `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, SpoolError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            SpoolError::Config(format!("could not read key from {}: {e}", path.display()))
        })?
        .ok_or_else(|| SpoolError::Config(format!("no private key found in {}", path.display())))
}

/// Load a CA bundle into a root store.
pub fn load_ca(path: &Path) -> Result<RootCertStore, SpoolError> {
    let certs = load_certs(path)?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(SpoolError::Config(format!(
            "could not load certificates from: {} ({ignored} unparseable)",
            path.display()
        )));
    }
    tracing::debug!("loaded {added} CA certificate(s) from {}", path.display());
    Ok(roots)
}

/// Load the platform's trust anchors. Unreadable entries are logged and
/// skipped; finding none at all is an error.
pub fn load_system_roots() -> Result<RootCertStore, SpoolError> {
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::warn!("system trust store: {e}");
    }
    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(native.certs);
    if added == 0 {
        return Err(SpoolError::Config(
            "no CA bundle given and no system trust anchors found".into(),
        ));
    }
    tracing::debug!("loaded {added} system CA certificate(s)");
    Ok(roots)
}

// ── TlsSettings ──────────────────────────────────────────────────

/// Paths to the PEM files one side of the connection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Certificate chain presented to the peer.
    pub cert: PathBuf,
    /// Private key for `cert`.
    pub key: PathBuf,
    /// CA bundle the peer's certificate must chain to. `None` uses the
    /// system trust store.
    pub ca: Option<PathBuf>,
}

impl TlsSettings {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>, ca: Option<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca,
        }
    }

    fn roots(&self) -> Result<RootCertStore, SpoolError> {
        match self.ca.as_deref() {
            Some(ca) => load_ca(ca),
            None => load_system_roots(),
        }
    }

    fn identity(
        &self,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), SpoolError> {
        Ok((load_certs(&self.cert)?, load_private_key(&self.key)?))
    }

    /// Server configuration that requires and verifies a client
    /// certificate issued by the CA bundle (or a system anchor).
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, SpoolError> {
        let roots = self.roots()?;
        let (certs, key) = self.identity()?;

        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
            .build()
            .map_err(|e| SpoolError::Config(format!("could not build client verifier: {e}")))?;

        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?;
        Ok(Arc::new(config))
    }

    /// Client configuration that presents our certificate and trusts
    /// servers issued by the CA bundle.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, SpoolError> {
        let roots = self.roots()?;
        let (certs, key) = self.identity()?;

        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)?;
        Ok(Arc::new(config))
    }

    pub fn acceptor(&self) -> Result<TlsAcceptor, SpoolError> {
        Ok(TlsAcceptor::from(self.server_config()?))
    }

    pub fn connector(&self) -> Result<TlsConnector, SpoolError> {
        Ok(TlsConnector::from(self.client_config()?))
    }
}
