//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filespool_core::{
    DirSink, DirSource, EnginePhase, FileRecord, Frame, Receiver, ReceiverTimings, SenderTimings,
    SpoolCodec, SpoolError, SpoolSink, SpoolSource, TlsSettings,
};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

// ── Receiver ─────────────────────────────────────────────────────

/// A receiver serving on an OS-assigned port in a background task.
pub struct RunningReceiver {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub phase: watch::Receiver<EnginePhase>,
    pub handle: JoinHandle<Result<(), SpoolError>>,
}

impl RunningReceiver {
    pub async fn start(receiver: Receiver) -> Self {
        let mut receiver = receiver;
        let addr = receiver.open().await.unwrap();
        let shutdown = receiver.shutdown_handle();
        let phase = receiver.subscribe();
        let handle = tokio::spawn(async move { receiver.serve().await });

        // serve() flips to Running before its first accept.
        let mut running = phase.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            running.wait_for(|p| *p == EnginePhase::Running),
        )
        .await
        .expect("receiver did not start")
        .unwrap();

        Self {
            addr,
            shutdown,
            phase,
            handle,
        }
    }

    /// Cancel and wait for the drain to finish.
    pub async fn stop(self) -> EnginePhase {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("receiver did not drain")
            .unwrap()
            .unwrap();
        *self.phase.borrow()
    }
}

pub fn fast_receiver() -> ReceiverTimings {
    ReceiverTimings {
        accept_poll: Duration::from_millis(100),
        handshake_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_millis(200),
        idle_timeout: Duration::from_secs(10),
    }
}

pub fn fast_sender() -> SenderTimings {
    SenderTimings {
        connect_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(2),
        data_timeout: Duration::from_secs(2),
        keepalive_interval: Duration::from_millis(200),
        file_check_interval: Duration::from_millis(100),
    }
}

/// Sink that refuses every write.
pub struct FailingSink;

#[async_trait::async_trait]
impl SpoolSink for FailingSink {
    async fn write(&self, record: &FileRecord) -> Result<(), SpoolError> {
        Err(SpoolError::Other(format!("refusing {}", record.name())))
    }
}

// ── Raw protocol client ──────────────────────────────────────────

pub async fn raw_client(addr: SocketAddr) -> Framed<TcpStream, SpoolCodec> {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, SpoolCodec::new())
}

/// Read the next frame, failing the test after five seconds.
pub async fn next_frame(
    framed: &mut Framed<TcpStream, SpoolCodec>,
) -> Option<Result<Frame, SpoolError>> {
    use futures::StreamExt;
    tokio::time::timeout(Duration::from_secs(5), framed.next())
        .await
        .expect("no frame within 5s")
}

// ── Files ────────────────────────────────────────────────────────

pub fn write_files(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Poll `check` every 50 ms until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

// ── PKI ──────────────────────────────────────────────────────────

/// A throwaway CA that can issue leaf certificates into a directory.
pub struct TestCa {
    dir: PathBuf,
    cert: Certificate,
    key: KeyPair,
}

impl TestCa {
    pub fn new(dir: &Path, name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
        let cert = params.self_signed(&key).unwrap();
        std::fs::write(dir.join(format!("{name}.crt")), cert.pem()).unwrap();
        Self {
            dir: dir.to_path_buf(),
            cert,
            key,
        }
    }

    pub fn ca_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.crt"))
    }

    /// Issue a leaf with the given CN and DNS SANs, usable for both
    /// client and server auth. `bundle` is the CA file peers trust.
    pub fn issue(&self, file: &str, cn: &str, sans: &[&str], bundle: &Path) -> TlsSettings {
        let key = KeyPair::generate().unwrap();
        let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
        let mut params = CertificateParams::new(sans).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let leaf = params.signed_by(&key, &self.cert, &self.key).unwrap();

        let cert_path = self.dir.join(format!("{file}.crt"));
        let key_path = self.dir.join(format!("{file}.key"));
        std::fs::write(&cert_path, leaf.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        TlsSettings::new(cert_path, key_path, Some(bundle.to_path_buf()))
    }
}

pub async fn dir_sink(dir: &Path) -> Arc<dyn SpoolSink> {
    Arc::new(DirSink::create(dir).await.unwrap())
}

pub async fn dir_source(dir: &Path) -> Arc<dyn SpoolSource> {
    Arc::new(DirSource::open(dir).await.unwrap())
}
